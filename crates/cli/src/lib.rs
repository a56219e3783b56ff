pub mod bootstrap;
pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "drivethru",
    about = "Drive-thru order-taking agent CLI",
    long_about = "Take drive-thru orders conversationally, evaluate the agent against a labeled dataset, and manage the local database.",
    after_help = "Examples:\n  drivethru migrate\n  drivethru seed\n  drivethru chat\n  drivethru eval --concurrency 4"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Start or resume an interactive order-taking conversation")]
    Chat {
        #[arg(long, help = "Resume a stored conversation by id")]
        conversation: Option<String>,
    },
    #[command(about = "Score the agent against the labeled order-correctness dataset")]
    Eval {
        #[arg(long, help = "Name for this run (default: eval-YYYYmmdd-HHMMSS)")]
        run_name: Option<String>,
        #[arg(long, help = "Read dataset items from a JSON file instead of the database")]
        dataset_file: Option<PathBuf>,
        #[arg(long, help = "Maximum dataset items evaluated in parallel")]
        concurrency: Option<usize>,
    },
    #[command(about = "Load the bundled evaluation dataset (idempotent)")]
    Seed,
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Chat { conversation } => commands::chat::run(conversation),
        Command::Eval { run_name, dataset_file, concurrency } => {
            commands::eval::run(commands::eval::EvalArgs { run_name, dataset_file, concurrency })
        }
        Command::Seed => commands::seed::run(),
        Command::Migrate => commands::migrate::run(),
        Command::Config => commands::config::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn eval_flags_parse() {
        let cli = Cli::try_parse_from([
            "drivethru",
            "eval",
            "--run-name",
            "nightly",
            "--dataset-file",
            "datasets/order-correctness-v1.json",
            "--concurrency",
            "4",
        ])
        .expect("parse");

        match cli.command {
            Command::Eval { run_name, dataset_file, concurrency } => {
                assert_eq!(run_name.as_deref(), Some("nightly"));
                assert!(dataset_file.is_some());
                assert_eq!(concurrency, Some(4));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn chat_accepts_a_conversation_to_resume() {
        let cli = Cli::try_parse_from(["drivethru", "chat", "--conversation", "conv-1"]).expect("parse");
        assert!(matches!(cli.command, Command::Chat { conversation: Some(id) } if id == "conv-1"));
    }
}
