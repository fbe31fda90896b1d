use clap::{Parser, Subcommand};

mod commands;

use commands::{EnqueueArgs, MigrateArgs, RunArgs, RunOnceArgs};

#[derive(Parser)]
#[command(name = "vtm-bot")]
#[command(about = "Scheduler-driven options trading automation", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler until Ctrl-C
    Run(RunArgs),
    /// Execute one job once and print its report
    RunOnce(RunOnceArgs),
    /// Apply migrations and verify the schema
    Migrate(MigrateArgs),
    /// Queue a signal for the signal pipeline
    Enqueue(EnqueueArgs),
}

fn init_logging(json: bool, log_file: Option<&str>) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match (log_file, json) {
        (Some(path), json) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let writer = std::sync::Mutex::new(file);
            if json {
                tracing_subscriber::fmt()
                    .json()
                    .with_env_filter(filter)
                    .with_writer(writer)
                    .init();
            } else {
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_ansi(false)
                    .with_writer(writer)
                    .init();
            }
        }
        (None, true) => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        (None, false) => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json, cli.log_file.as_deref())?;

    match cli.command {
        Commands::Run(args) => commands::run_scheduler(args).await?,
        Commands::RunOnce(args) => commands::run_once(args).await?,
        Commands::Migrate(args) => commands::run_migrate(args).await?,
        Commands::Enqueue(args) => commands::run_enqueue(args).await?,
    }

    Ok(())
}
