pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "parley",
    about = "Parley operator CLI",
    long_about = "Run and supervise negotiation sessions, inspect configuration, and check \
                  runtime readiness.",
    after_help = "Examples:\n  parley run --url https://chat.example.com/support --objective \
                  \"renew below $50/mo\"\n  parley config\n  parley doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run one negotiation session interactively on the terminal")]
    Run {
        #[arg(long, help = "Chat page URL the session opens")]
        url: String,
        #[arg(long, help = "One-sentence negotiation objective")]
        objective: String,
        #[arg(long = "constraint", help = "Hard constraint; repeat for several")]
        constraints: Vec<String>,
        #[arg(long, help = "Free-form notes forwarded to the decision capability")]
        notes: Option<String>,
        #[arg(long, help = "Path to a parley.toml config file")]
        config: Option<PathBuf>,
    },
    #[command(about = "Inspect effective configuration values with secret redaction")]
    Config,
    #[command(about = "Validate config, decision-capability, and surface readiness checks")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run { url, objective, constraints, notes, config } => {
            return commands::run::run(url, objective, constraints, notes, config);
        }
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
