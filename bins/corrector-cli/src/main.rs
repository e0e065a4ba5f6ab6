mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "corrector")]
#[command(about = "Corrector - Grade code and block-program submissions locally", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true, default_value = "false")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade a submission against an exercise and print the outcome as JSON
    Grade {
        /// Exercise file (JSON)
        #[arg(short, long)]
        exercise: PathBuf,

        /// Submission file (JSON)
        #[arg(short, long)]
        submission: PathBuf,

        /// Grader config file (defaults to config/grader.json when present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Pretty-print the outcome
        #[arg(long, default_value = "false")]
        pretty: bool,
    },

    /// Print the script a block program compiles to
    Compile {
        /// Block program file (Blockly XML when it ends in .xml, JSON otherwise)
        #[arg(short, long)]
        program: PathBuf,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Grade {
            exercise,
            submission,
            config,
            pretty,
        } => {
            let passed =
                commands::grade_submission(&exercise, &submission, config.as_deref(), pretty)
                    .await?;
            info!(passed, "Done");
            if !passed {
                std::process::exit(1);
            }
        }
        Commands::Compile { program } => {
            commands::compile_program(&program)?;
        }
    }

    Ok(())
}
