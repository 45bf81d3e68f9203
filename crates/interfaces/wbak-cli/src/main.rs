use anyhow::Context;
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use wbak_app_core::Severity;
use wbak_cli::commands;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive the database password from IMEI and UIN
    Password {
        #[arg(long)]
        imei: String,
        #[arg(long)]
        uin: String,
    },
    /// Print a fresh project name for the current local time
    #[command(name = "new-name")]
    NewName,
    /// Show the pipelines a persisted project listing reconstructs to
    Inspect { listing: Utf8PathBuf },
    /// Run one backup end to end against an in-memory device
    Simulate {
        #[arg(long, help = "Delay before emptied parent stages are deleted")]
        settle_ms: Option<u64>,
        #[arg(long, env = "WBAK_SETTINGS", help = "JSON settings file")]
        settings: Option<Utf8PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;

    match cli.command {
        Commands::Password { imei, uin } => {
            println!("{}", commands::cmd_password(&imei, &uin)?);
        }
        Commands::NewName => {
            println!("{}", commands::cmd_new_name(chrono::Local::now().naive_local()));
        }
        Commands::Inspect { listing } => {
            for line in commands::cmd_inspect(&listing)? {
                println!("{line}");
            }
        }
        Commands::Simulate {
            settle_ms,
            settings,
        } => {
            let settings = commands::load_settings(settings.as_deref(), settle_ms)?;
            let report =
                commands::cmd_simulate(settings, chrono::Local::now().naive_local()).await?;

            println!(":: Simulated project {}", report.project);
            println!("   Requests sent: {}", report.requests.len());
            println!("   Cascade time:  {} ms", report.elapsed_ms);
            println!("   Final state:   {}", report.final_state);
            let errors = report
                .notices
                .iter()
                .filter(|n| n.severity == Severity::Error)
                .count();
            println!("   Errors:        {errors}");
        }
    }

    Ok(())
}
