//! rollctl: run and inspect rolling updates against the local rollguard store.
//!
//! # Usage
//!
//! ```text
//! rollctl register default/redis --image redis:7 --replicas 2 --seed-instances
//! rollctl rollout default/redis --image redis:8
//! rollctl status default/redis --format json
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use rollguard_core::WorkloadId;

mod commands;
mod local_store;

use commands::{Context, OutputFormat};

const DEFAULT_LOG_FILTER: &str = "info,rollctl=debug,rollguard=debug";

#[derive(Parser)]
#[command(
    name = "rollctl",
    about = "rollguard: verified rolling updates with automatic rollback",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to rollguard.toml. Missing file means all defaults.
    #[arg(long, global = true, default_value = "rollguard.toml")]
    config: PathBuf,

    /// Directory for the state store; overrides [store].path.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Update a workload's image, verify it, and roll back if it never converges.
    ///
    /// Instances restart unready on every image change; report them with
    /// `rollctl mark` while the rollout waits.
    ///
    /// Exit codes: 0 success, 2 rolled back, 1 rollback failed or aborted.
    Rollout {
        /// Workload as namespace/name (bare name means "default").
        workload: WorkloadId,
        /// New container image reference.
        #[arg(long)]
        image: String,
        /// Verification deadline, e.g. "30s" (overrides config).
        #[arg(long)]
        threshold: Option<String>,
        /// Delay between readiness polls, e.g. "1s" (overrides config).
        #[arg(long)]
        poll_interval: Option<String>,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Show a workload's desired image, version and instance readiness.
    Status {
        workload: WorkloadId,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Create or replace a workload record in the local store.
    Register {
        workload: WorkloadId,
        #[arg(long)]
        image: String,
        #[arg(long, default_value = "1")]
        replicas: u32,
        /// Also create one ready instance per replica.
        #[arg(long)]
        seed_instances: bool,
    },
    /// Record an instance's readiness in the local store.
    Mark {
        workload: WorkloadId,
        /// Instance name, e.g. redis-0.
        instance: String,
        #[arg(long, action = clap::ArgAction::Set)]
        ready: bool,
    },
    /// Write a rollguard.toml carrying every default.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    if let Command::Init { force } = cli.command {
        commands::init::init(&cli.config, force)?;
        return Ok(ExitCode::SUCCESS);
    }

    let ctx = Context::load(&cli.config, cli.data_dir.as_deref())?;

    match cli.command {
        Command::Rollout {
            workload,
            image,
            threshold,
            poll_interval,
            format,
        } => {
            let overrides = commands::rollout::Overrides {
                threshold,
                poll_interval,
            };
            let outcome =
                commands::rollout::rollout(&ctx, &workload, &image, overrides, format).await?;
            Ok(ExitCode::from(commands::rollout::exit_status(&outcome)))
        }
        Command::Status { workload, format } => {
            commands::status::status(&ctx, &workload, format)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Register {
            workload,
            image,
            replicas,
            seed_instances,
        } => {
            commands::register::register(&ctx, &workload, &image, replicas, seed_instances)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Mark {
            workload,
            instance,
            ready,
        } => {
            commands::mark::mark(&ctx, &workload, &instance, ready)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Init { .. } => Ok(ExitCode::SUCCESS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_rollout_with_overrides() {
        let cli = Cli::parse_from([
            "rollctl",
            "--data-dir",
            "/tmp/rg",
            "rollout",
            "prod/redis",
            "--image",
            "redis:8",
            "--threshold",
            "30s",
        ]);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/rg")));
        match cli.command {
            Command::Rollout {
                workload,
                image,
                threshold,
                poll_interval,
                ..
            } => {
                assert_eq!(workload, WorkloadId::new("prod", "redis"));
                assert_eq!(image, "redis:8");
                assert_eq!(threshold.as_deref(), Some("30s"));
                assert!(poll_interval.is_none());
            }
            _ => panic!("expected rollout"),
        }
    }

    #[test]
    fn bare_workload_name_uses_default_namespace() {
        let cli = Cli::parse_from(["rollctl", "status", "redis"]);
        match cli.command {
            Command::Status { workload, .. } => {
                assert_eq!(workload, WorkloadId::new("default", "redis"));
            }
            _ => panic!("expected status"),
        }
    }

    #[test]
    fn mark_requires_explicit_readiness() {
        assert!(Cli::try_parse_from(["rollctl", "mark", "redis", "redis-0"]).is_err());
        let cli = Cli::parse_from(["rollctl", "mark", "redis", "redis-0", "--ready", "false"]);
        assert!(matches!(cli.command, Command::Mark { ready: false, .. }));
    }
}
