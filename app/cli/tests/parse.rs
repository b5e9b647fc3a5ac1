//! Tests for CLI argument parsing.

use clap::Parser;
use turnstile_cli::{Cli, Command, repl::Input};

#[test]
fn cli_parse_chat() {
    let cli = Cli::parse_from(["turnstile", "chat"]);
    assert!(matches!(cli.command, Command::Chat));
    assert_eq!(cli.session, "local");
    assert!(cli.config.is_none());
}

#[test]
fn cli_parse_send() {
    let cli = Cli::parse_from(["turnstile", "send", "hello world"]);
    match cli.command {
        Command::Send { content } => assert_eq!(content, "hello world"),
        _ => panic!("expected Send command"),
    }
}

#[test]
fn cli_parse_session_flag() {
    let cli = Cli::parse_from(["turnstile", "--session", "alice", "chat"]);
    assert_eq!(cli.session, "alice");
}

#[test]
fn cli_parse_config_flag_after_subcommand() {
    let cli = Cli::parse_from(["turnstile", "send", "hi", "--config", "/tmp/t.toml"]);
    assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/tmp/t.toml")));
}

#[test]
fn cli_rejects_missing_subcommand() {
    assert!(Cli::try_parse_from(["turnstile"]).is_err());
}

#[test]
fn repl_input_commands() {
    assert_eq!(Input::parse("/cancel"), Input::Cancel);
    assert_eq!(Input::parse(" /retry "), Input::Retry);
    assert_eq!(Input::parse("/new"), Input::NewDialog);
    assert_eq!(Input::parse("   "), Input::Nothing);
    assert_eq!(Input::parse(" hi there "), Input::Message("hi there".into()));
}
