use anyhow::Result;
use clap::{Parser, Subcommand};
use daxml_core::SessionConfig;
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Tasks for the project", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the project
    Build,
    /// Run the CLI
    Run,
    /// Run the test suite
    Test,
    /// Write a default session config
    InitConfig {
        #[arg(default_value = "daxml.toml")]
        path: String,
    },
}

fn cargo(args: &[&str], what: &str) -> Result<()> {
    let status = Command::new("cargo").args(args).status()?;
    if !status.success() {
        anyhow::bail!("{} failed", what);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Build => {
            println!("Building project...");
            cargo(&["build"], "Build")?;
        }
        Commands::Run => {
            println!("Running CLI...");
            cargo(&["run", "-p", "daxml-cli"], "Run")?;
        }
        Commands::Test => {
            println!("Testing workspace...");
            cargo(&["test", "--workspace"], "Test")?;
        }
        Commands::InitConfig { path } => {
            SessionConfig::default().save_to_file(path)?;
            println!("Wrote {}", path);
        }
    }

    Ok(())
}
