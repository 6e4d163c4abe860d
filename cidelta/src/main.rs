//! cidelta - report only the test failures a verification build changed
//!
//! `register` picks the reference build for the current branch and queues
//! verification builds; `sync` polls them and reports the failed-test delta.

#![forbid(unsafe_code)]

mod commands;
mod git;
mod report;
mod server;

use cidelta_core::config::CideltaConfig;
use cidelta_core::{LogConfig, LogFormat, init_logging};
use clap::{Parser, Subcommand};
use commands::register::RegisterArgs;
use commands::sync::SyncArgs;
use report::OutputFormat;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::error;

#[derive(Parser)]
#[command(name = "cidelta")]
#[command(author, version, about = "Failed-test deltas for on-demand CI builds")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    /// Also write JSON logs to this file
    #[arg(long, global = true, env = "CIDELTA_LOG_FILE")]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll pending requests and report finished verification builds
    Sync {
        /// Configuration file
        #[arg(short, long, env = "CIDELTA_CONFIG", default_value = "cidelta.toml")]
        config: PathBuf,

        /// Workspace directory holding cached jobs, references and requests
        #[arg(short, long, env = "CIDELTA_WORKSPACE", default_value = ".cidelta")]
        workspace: PathBuf,

        /// Report format on stdout
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Also write each report as JSON into this directory
        #[arg(long)]
        report_dir: Option<PathBuf>,
    },

    /// Queue verification builds of HEAD against the branch reference
    Register {
        /// Configuration file
        #[arg(short, long, env = "CIDELTA_CONFIG", default_value = "cidelta.toml")]
        config: PathBuf,

        /// Workspace directory holding cached jobs, references and requests
        #[arg(short, long, env = "CIDELTA_WORKSPACE", default_value = ".cidelta")]
        workspace: PathBuf,

        /// Local repository to read history from
        #[arg(long, default_value = ".")]
        repo: PathBuf,

        /// Branch to verify against (guessed from [tracking].branches when omitted)
        #[arg(short, long)]
        branch: Option<String>,

        /// Filter selecting verification jobs (repeatable)
        #[arg(short, long = "filter", required = true)]
        filters: Vec<String>,

        /// Root to verify (repeatable, defaults to [jobs].roots)
        #[arg(short, long = "root")]
        roots: Vec<String>,

        /// Ignore the cached job list
        #[arg(long)]
        refresh_jobs: bool,
    },
}

impl Commands {
    fn config_path(&self) -> &Path {
        match self {
            Commands::Sync { config, .. } | Commands::Register { config, .. } => config.as_path(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // The configured level is only a default; CIDELTA_LOG still wins.
    let default_level = CideltaConfig::load(cli.command.config_path())
        .map(|config| config.logging.level)
        .unwrap_or_else(|_| "info".to_string());
    let mut log_config = LogConfig::from_env(&default_level).with_stderr();
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    if cli.log_json {
        log_config = log_config.with_format(LogFormat::Json);
    }
    if let Some(path) = &cli.log_file {
        log_config = log_config.with_file(path);
    }
    let _logging_guards = match init_logging(&log_config) {
        Ok(guards) => guards,
        Err(e) => {
            eprintln!("cidelta: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Sync {
            config,
            workspace,
            format,
            report_dir,
        } => {
            commands::sync::run(SyncArgs {
                config,
                workspace,
                format,
                report_dir,
            })
            .await
        }
        Commands::Register {
            config,
            workspace,
            repo,
            branch,
            filters,
            roots,
            refresh_jobs,
        } => {
            commands::register::run(RegisterArgs {
                config,
                workspace,
                repo,
                branch,
                filters,
                roots,
                refresh_jobs,
            })
            .await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
