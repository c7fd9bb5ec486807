//! Updater CLI entrypoint.
//!
//! Resolves the update for a running version, then downloads, verifies, and
//! installs it. Results go to stdout; progress and errors go to stderr.

use clap::Parser;
use selfupdate::cli::{CheckArgs, Cli, Command, RecoverArgs, ResolveArgs, SourceArgs, UpdateArgs};
use selfupdate::config::{ConfigError, UpdaterConfig};
use selfupdate::dirs::{BaseDirs, SystemBaseDirs};
use selfupdate::error::UpdateError;
use selfupdate::extraction::ArchiveExtractor;
use selfupdate::fetch::{DocumentFetcher, FileDocumentFetcher, HttpFetcher};
use selfupdate::install::{AcceptAll, CommitCheck, ExecutableCheck, InstallLock, recover};
use selfupdate::orchestrator::{
    ManifestUpdateSource, QueryUpdateSource, UpdateRequest, UpdateSource, check, run_update,
};
use selfupdate::output::{
    ProgressMeter, failure_message, outcome_message, plan_message, recovery_message,
    write_line,
};
use selfupdate::package::policy::resolve;
use selfupdate::package::query::QueryResponse;
use selfupdate::package::version::Version;
use std::io::Write;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors that end a CLI run.
#[derive(Debug, Error)]
enum RunError {
    /// Configuration could not be loaded or resolved.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The command line is incomplete or contradicts itself.
    #[error("{0}")]
    Usage(String),

    /// The update attempt failed.
    #[error(transparent)]
    Update(#[from] UpdateError),
}

/// Where the update decision comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SourceChoice {
    Manifest(String),
    Query { base_url: String, package: String },
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let run_result = run(&cli, &mut stdout, &mut stderr);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn init_logging(cli: &Cli) {
    // RUST_LOG directives override the level chosen by -v/-q.
    let _ = env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .format_timestamp(None)
        .try_init();
}

fn run(cli: &Cli, stdout: &mut dyn Write, stderr: &mut dyn Write) -> Result<(), RunError> {
    let dirs = SystemBaseDirs::new().ok_or(ConfigError::NoDirectory { purpose: "home" })?;
    let config = UpdaterConfig::discover(cli.config.as_deref(), &dirs)?;

    match &cli.command {
        Command::Check(args) => run_check(args, &config, stdout),
        Command::Update(args) => run_update_command(cli, args, &config, &dirs, stdout, stderr),
        Command::Resolve(args) => run_resolve(args, &config, stdout),
        Command::Recover(args) => run_recover(args, stdout),
    }
}

fn run_check(args: &CheckArgs, config: &UpdaterConfig, stdout: &mut dyn Write) -> Result<(), RunError> {
    let current = parse_current(&args.current)?;
    let choice = choose_source(&args.source, config)?;
    let http = HttpFetcher::new(&config.user_agent(), config.query_timeout());
    let source = build_source(&choice, &http);

    let plan = check(source.as_ref(), &current)?;
    write_line(stdout, plan_message(&current, plan.as_ref()));
    Ok(())
}

fn run_update_command(
    cli: &Cli,
    args: &UpdateArgs,
    config: &UpdaterConfig,
    dirs: &dyn BaseDirs,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<(), RunError> {
    let current = parse_current(&args.current)?;
    let choice = choose_source(&args.source, config)?;
    let cache_dir = match &args.cache_dir {
        Some(dir) => dir.clone(),
        None => config.cache_dir(dirs)?,
    };
    let timeout = args
        .timeout
        .map_or_else(|| config.download_timeout(), Duration::from_secs);

    let queries = HttpFetcher::new(&config.user_agent(), config.query_timeout());
    let packages = HttpFetcher::new(&config.user_agent(), timeout);
    let source = build_source(&choice, &queries);
    let extractor = args
        .entry
        .as_deref()
        .map_or_else(ArchiveExtractor::default, ArchiveExtractor::with_entry);
    let commit_check: &dyn CommitCheck = if args.skip_exec_check {
        &AcceptAll
    } else {
        &ExecutableCheck
    };

    let request = UpdateRequest {
        current,
        target: args.target.clone(),
        cache_dir,
        deadline: Some(Instant::now() + timeout),
    };
    let mut meter = ProgressMeter::new();
    let quiet = cli.quiet;
    let mut progress = |received: u64, total: u64| {
        if quiet {
            return;
        }
        if let Some(line) = meter.advance(received, total) {
            write_line(stderr, line);
        }
    };

    let outcome = run_update(
        &request,
        source.as_ref(),
        &packages,
        &extractor,
        commit_check,
        &mut progress,
    )?;
    write_line(stdout, outcome_message(&outcome));
    Ok(())
}

fn run_resolve(args: &ResolveArgs, config: &UpdaterConfig, stdout: &mut dyn Write) -> Result<(), RunError> {
    let current = parse_current(&args.current)?;
    let http = HttpFetcher::new(&config.user_agent(), config.query_timeout());
    let source = ManifestUpdateSource::new(document_fetcher(&args.manifest, &http), &args.manifest);

    let manifest = source.manifest()?;
    let decision = resolve(&manifest, &current);
    let response = QueryResponse::from_decision(&manifest, &decision)
        .to_json()
        .map_err(UpdateError::from)?;
    write_line(stdout, response);
    Ok(())
}

fn run_recover(args: &RecoverArgs, stdout: &mut dyn Write) -> Result<(), RunError> {
    let _lock = InstallLock::acquire(&args.target).map_err(UpdateError::from)?;
    let action = recover(&args.target).map_err(UpdateError::from)?;
    write_line(stdout, recovery_message(&args.target, &action));
    Ok(())
}

fn parse_current(text: &str) -> Result<Version, RunError> {
    text.parse()
        .map_err(|err| RunError::Usage(format!("invalid --current: {err}")))
}

/// Pick the update source: command-line flags first, then configuration.
fn choose_source(args: &SourceArgs, config: &UpdaterConfig) -> Result<SourceChoice, RunError> {
    let query = |base_url: &str| SourceChoice::Query {
        base_url: base_url.to_owned(),
        package: args
            .package
            .clone()
            .unwrap_or_else(|| config.app_name.clone()),
    };
    if let Some(location) = &args.manifest {
        return Ok(SourceChoice::Manifest(location.clone()));
    }
    if let Some(base_url) = &args.query {
        return Ok(query(base_url));
    }
    if let Some(location) = &config.manifest_url {
        return Ok(SourceChoice::Manifest(location.clone()));
    }
    if let Some(base_url) = &config.query_url {
        return Ok(query(base_url));
    }
    Err(RunError::Usage(
        "no update source: pass --manifest or --query, or set manifest_url in the configuration"
            .to_owned(),
    ))
}

fn build_source<'a>(choice: &SourceChoice, http: &'a HttpFetcher) -> Box<dyn UpdateSource + 'a> {
    match choice {
        SourceChoice::Manifest(location) => Box::new(ManifestUpdateSource::new(
            document_fetcher(location, http),
            location,
        )),
        SourceChoice::Query { base_url, package } => {
            Box::new(QueryUpdateSource::new(http, base_url, package))
        }
    }
}

fn document_fetcher<'a>(location: &str, http: &'a HttpFetcher) -> &'a dyn DocumentFetcher {
    if is_remote(location) {
        http
    } else {
        &FileDocumentFetcher
    }
}

fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

fn exit_code_for_run_result(result: Result<(), RunError>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(RunError::Update(err)) => {
            write_line(stderr, failure_message(&err));
            1
        }
        Err(err) => {
            write_line(stderr, format!("error: {err}"));
            2
        }
    }
}
