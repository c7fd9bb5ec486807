//! Tests for updater CLI parsing.

use super::*;
use rstest::rstest;

#[test]
fn cli_parses_check_with_manifest() {
    let cli = Cli::parse_from([
        "selfupdate",
        "check",
        "--current",
        "1.0",
        "--manifest",
        "https://updates.test/app.yaml",
    ]);
    match cli.command {
        Command::Check(args) => {
            assert_eq!(args.current, "1.0");
            assert_eq!(
                args.source.manifest.as_deref(),
                Some("https://updates.test/app.yaml")
            );
            assert!(args.source.query.is_none());
        }
        other => panic!("expected Check command, got {other:?}"),
    }
}

#[test]
fn cli_parses_update_defaults() {
    let cli = Cli::parse_from(["selfupdate", "update", "-c", "1.0", "-t", "/opt/app/bin/app"]);
    match cli.command {
        Command::Update(args) => {
            assert_eq!(args.target, Utf8PathBuf::from("/opt/app/bin/app"));
            assert_eq!(args.source, SourceArgs::default());
            assert!(args.cache_dir.is_none());
            assert!(args.timeout.is_none());
            assert!(!args.skip_exec_check);
            assert!(args.entry.is_none());
        }
        other => panic!("expected Update command, got {other:?}"),
    }
    assert_eq!(cli.verbosity, 0);
    assert!(!cli.quiet);
    assert!(cli.config.is_none());
}

#[test]
fn cli_parses_query_source() {
    let cli = Cli::parse_from([
        "selfupdate",
        "check",
        "-c",
        "1.0",
        "--query",
        "https://updates.test",
        "--package",
        "app",
    ]);
    let Command::Check(args) = cli.command else {
        panic!("expected Check command");
    };
    assert_eq!(args.source.query.as_deref(), Some("https://updates.test"));
    assert_eq!(args.source.package.as_deref(), Some("app"));
}

#[test]
fn cli_rejects_manifest_with_query() {
    let result = Cli::try_parse_from([
        "selfupdate",
        "check",
        "-c",
        "1.0",
        "--manifest",
        "a.yaml",
        "--query",
        "https://updates.test",
    ]);
    assert!(result.is_err());
}

#[test]
fn cli_parses_global_flags_after_subcommand() {
    let cli = Cli::parse_from([
        "selfupdate",
        "recover",
        "-t",
        "app",
        "-vv",
        "--config",
        "/etc/selfupdate.toml",
    ]);
    assert_eq!(cli.verbosity, 2);
    assert_eq!(cli.config, Some(Utf8PathBuf::from("/etc/selfupdate.toml")));
    assert!(matches!(cli.command, Command::Recover(_)));
}

#[test]
fn cli_rejects_verbose_with_quiet() {
    let result = Cli::try_parse_from(["selfupdate", "-v", "-q", "recover", "-t", "app"]);
    assert!(result.is_err());
}

#[test]
fn cli_requires_a_subcommand() {
    assert!(Cli::try_parse_from(["selfupdate"]).is_err());
}

#[test]
fn cli_parses_resolve() {
    let cli = Cli::parse_from(["selfupdate", "resolve", "-m", "app.json", "-c", "1.5"]);
    let Command::Resolve(args) = cli.command else {
        panic!("expected Resolve command");
    };
    assert_eq!(args.manifest, "app.json");
    assert_eq!(args.current, "1.5");
}

#[rstest]
#[case::default(&[], log::LevelFilter::Warn)]
#[case::one(&["-v"], log::LevelFilter::Info)]
#[case::two(&["-vv"], log::LevelFilter::Debug)]
#[case::many(&["-vvvv"], log::LevelFilter::Trace)]
#[case::quiet(&["-q"], log::LevelFilter::Error)]
fn log_level_follows_flags(#[case] flags: &[&str], #[case] expected: log::LevelFilter) {
    let mut args = vec!["selfupdate"];
    args.extend_from_slice(flags);
    args.extend(["recover", "-t", "app"]);
    let cli = Cli::parse_from(args);
    assert_eq!(cli.log_level(), expected);
}
