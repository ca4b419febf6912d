// Copyright 2026 regdesk contributors
// SPDX-License-Identifier: MIT

//! regdesk: course registration runner, entry point.

use std::time::Duration;

use chrono::Utc;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use regdesk::{Dispatcher, FallbackPolicy, PortalSessionFactory, DEFAULT_REQUEST_TIMEOUT};
use regdesk_cli::config::{describe_tree, load_schedule, resolve_schedule_path, EnvCredentials};
use regdesk_cli::{init_tracing, RunReport};

#[derive(Parser)]
#[command(
    name = "regdesk",
    about = "Register for course sections with per-course fallback chains",
    version
)]
struct Cli {
    /// Show portal notification and error text. Also enabled when DEBUG is set.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register every course in the schedule.
    Run(RunArgs),

    /// Parse a schedule file and print its request trees.
    Validate {
        /// Path to the schedule file.
        #[arg(short, long)]
        schedule: Option<String>,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   regdesk completions bash > ~/.local/share/bash-completion/completions/regdesk
    ///   regdesk completions zsh > ~/.zfunc/_regdesk
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Path to the schedule file.
    #[arg(short, long)]
    schedule: Option<String>,

    /// Semester hint, overriding the schedule's "semester".
    #[arg(long)]
    semester: Option<String>,

    /// Number of courses registered concurrently.
    #[arg(short, long)]
    workers: Option<usize>,

    /// Per-request HTTP timeout in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Give up on a course tree after this many seconds.
    #[arg(long)]
    deadline_secs: Option<u64>,

    /// Extra attempts per section after a transport error.
    #[arg(long, default_value_t = 1)]
    retries: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let debug = std::env::var_os("DEBUG").is_some();
    let log_level = if debug { "debug" } else { cli.log_level.as_str() };
    init_tracing(log_level, cli.log_json);
    let verbose = cli.verbose || debug;

    match cli.command {
        Commands::Run(args) => run(args, verbose, cli.json).await?,

        Commands::Validate { schedule } => {
            let path = resolve_schedule_path(schedule.as_deref());
            let schedule = load_schedule(&path, &EnvCredentials::from_env())?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&schedule.requests)?);
            } else {
                println!("Valid schedule: {}", path.display());
                println!("  Semester: {}", schedule.semester);
                println!("  Courses: {}", schedule.requests.len());
                print!("{}", describe_tree(&schedule.requests));
            }
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "regdesk", &mut std::io::stdout());
        }
    }

    Ok(())
}

async fn run(args: RunArgs, verbose: bool, json: bool) -> anyhow::Result<()> {
    let path = resolve_schedule_path(args.schedule.as_deref());
    let schedule = load_schedule(&path, &EnvCredentials::from_env())?;

    let mut config = schedule.portal_config();
    if let Some(semester) = args.semester {
        config.season = semester;
    }
    config.verbose = verbose;
    config.request_timeout = args
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT);

    tracing::info!(
        schedule = %path.display(),
        courses = schedule.requests.len(),
        semester = %config.season,
        "loaded schedule"
    );

    let factory = PortalSessionFactory::new(config, schedule.credentials.clone());
    let mut dispatcher = Dispatcher::new(factory).with_policy(FallbackPolicy {
        transport_retries: args.retries,
    });
    if let Some(workers) = args.workers {
        dispatcher = dispatcher.with_workers(workers);
    }
    if let Some(secs) = args.deadline_secs {
        dispatcher = dispatcher.with_deadline(Duration::from_secs(secs));
    }

    let started_at = Utc::now();
    let results = dispatcher.dispatch(schedule.requests).await;
    let report = RunReport::new(started_at, Utc::now(), results);

    if json {
        println!("{}", report.render_json()?);
    } else {
        print!("{}", report.render_text());
    }
    Ok(())
}
