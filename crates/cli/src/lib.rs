pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use decalops_core::config::{AppConfig, LoadOptions, LogFormat};

use crate::commands::line::LineCommand;
use crate::commands::order::OrderCommand;
use crate::commands::request::RequestCommand;
use crate::commands::rule::RuleCommand;

#[derive(Debug, Parser)]
#[command(
    name = "decalops",
    about = "Decal shop order lifecycle operator CLI",
    long_about = "Operate the order stage ledger, usage pricing and custom request conversion.",
    after_help = "Examples:\n  decalops migrate\n  decalops order timeline ORD-DEMO-001\n  \
                  decalops request convert REQ-DEMO-001 --employee EMP-7 --cost 850 \
                  --work-units 6.5"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a decalops.toml configuration file")]
    config: Option<PathBuf>,
    #[arg(long, global = true, default_value = "operator", help = "Actor recorded in audit events")]
    actor: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load and verify the deterministic demo dataset")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(subcommand, about = "Open orders, move stages, inspect timelines and re-price")]
    Order(OrderCommand),
    #[command(subcommand, about = "Record measured usage on order lines")]
    Line(LineCommand),
    #[command(subcommand, about = "Custom service request intake and conversion")]
    Request(RequestCommand),
    #[command(subcommand, about = "Maintain usage pricing rules")]
    Rule(RuleCommand),
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            ..LoadOptions::default()
        }
    }
}

/// Logs go to stderr so stdout carries only the JSON outcome.
fn init_logging(config: &AppConfig) -> anyhow::Result<()> {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|error| anyhow::anyhow!("failed to install log subscriber: {error}"))
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.load_options();
    if let Ok(config) = AppConfig::load(options.clone()) {
        if let Err(error) = init_logging(&config) {
            eprintln!("{error:#}");
        }
    }

    let actor = cli.actor.as_str();
    let result = match cli.command {
        Command::Migrate => commands::migrate::run(options),
        Command::Seed => commands::seed::run(options),
        Command::Config => commands::config::run(options),
        Command::Order(command) => commands::order::run(command, options, actor),
        Command::Line(command) => commands::line::run(command, options, actor),
        Command::Request(command) => commands::request::run(command, options, actor),
        Command::Rule(command) => commands::rule::run(command, options, actor),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
