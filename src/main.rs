mod battery;
mod classify;
mod config;
mod ctl;
mod engine;
mod ipc;
mod output;
mod sensor;
mod theme;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::config::OutputFormat;
use crate::engine::ConfigSource;

#[derive(Parser, Debug)]
#[command(name = "powerbar", version, about = "Status line with battery state for i3bar/swaybar")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override a config value, e.g. battery.device=BAT1 (repeatable)
    #[arg(short, long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// Override poll interval in seconds
    #[arg(long)]
    interval: Option<u64>,

    /// Override output format
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Print one status line and exit
    #[arg(long)]
    once: bool,

    /// Override IPC socket path
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Generate shell completions and exit
    #[arg(long, value_name = "SHELL")]
    completions: Option<Shell>,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Control a running powerbar instance
    Ctl(ctl::CtlArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(CliCommand::Ctl(args)) => ctl::run(args),
        None => run_bar(cli),
    }
}

fn run_bar(args: Cli) -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Some(shell) = args.completions {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "powerbar", &mut std::io::stdout());
        return Ok(());
    }

    let source = ConfigSource {
        path: args.config.unwrap_or_else(config::default_config_path),
        params: args.params,
        interval: args.interval,
        format: args.format,
    };

    if args.once {
        return engine::run_once(&source);
    }

    engine::run(source, args.socket)
}
