//! treport - Command-line tool for generating test reports

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use testreport::commands::*;
use testreport::config::ReportConfig;
use testreport::error::ErrorReporter;
use testreport::ui::CliUI;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{filter::Targets, layer::SubscriberExt, util::SubscriberInitExt, Layer};

#[derive(Parser)]
#[command(name = "treport")]
#[command(about = "Test report aggregation tool", long_about = None)]
struct Cli {
    /// Project directory holding .treport.conf (defaults to current directory)
    #[arg(short = 'C', long, global = true)]
    directory: Option<String>,

    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a report from result directories or files
    Generate {
        /// Result directories or files
        #[arg(required_unless_present = "stage")]
        sources: Vec<PathBuf>,

        /// Stage dump to restore first (repeatable)
        #[arg(long)]
        stage: Vec<PathBuf>,

        /// Output directory, overriding the configuration
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Report name, overriding the configuration
        #[arg(long, env = "TREPORT_NAME")]
        name: Option<String>,
    },

    /// Read results and write a stage dump for a later generate
    Dump {
        /// Result directories or files
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        /// Stage dump file to write
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show the recorded history of report runs
    History {
        /// Number of runs to show
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },
}

fn init_logging(verbose: u8) -> anyhow::Result<()> {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(Targets::new().with_default(level));

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .context("failed to initialise logging")
}

/// Reporter writing to the configured log directory
fn error_reporter(directory: Option<&str>) -> ErrorReporter {
    let base = directory.map(Path::new).unwrap_or_else(|| Path::new("."));
    let log_dir = ReportConfig::load_or_default(base)
        .map(|config| config.log_dir)
        .unwrap_or_else(|_| ReportConfig::default().log_dir);
    if log_dir.is_absolute() {
        ErrorReporter::new(log_dir)
    } else {
        ErrorReporter::new(base.join(log_dir))
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("Warning: {:#}", e);
    }

    let mut ui = CliUI::new();
    let directory = cli.directory.clone();

    let result = match cli.command {
        Commands::Generate {
            sources,
            stage,
            output,
            name,
        } => {
            let cmd = GenerateCommand::new(cli.directory, sources)
                .with_stages(stage)
                .with_output(output)
                .with_name(name);
            cmd.execute(&mut ui)
        }
        Commands::Dump { sources, output } => {
            let cmd = DumpCommand::new(cli.directory, sources, output);
            cmd.execute(&mut ui)
        }
        Commands::History { count } => {
            let cmd = match count {
                Some(count) => HistoryCommand::with_count(cli.directory, count),
                None => HistoryCommand::new(cli.directory),
            };
            cmd.execute(&mut ui)
        }
    };

    match result {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            let message = error_reporter(directory.as_deref()).describe(&e);
            eprintln!("Error: {}", message);
            std::process::exit(1);
        }
    }
}
