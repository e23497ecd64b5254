pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "studio-pos",
    about = "Studio POS operator CLI",
    long_about = "Apply migrations, load demo data, inspect configuration, and issue sessions.",
    after_help = "Examples:\n  studio-pos seed\n  studio-pos session --user admin-1"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo users and sales (idempotent)")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Issue a session token for an existing user")]
    Session {
        #[arg(long, help = "User id the session belongs to")]
        user: String,
        #[arg(long, help = "Session lifetime in hours (defaults to session.ttl_hours)")]
        ttl_hours: Option<u32>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Session { user, ttl_hours } => commands::session::run(&user, ttl_hours),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
