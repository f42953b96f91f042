use anyhow::Result;
use clap::{Parser, Subcommand};
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
    /// Run the console
    Run,
    /// Create the simulation FIFO pairs in a directory
    SetupSim {
        /// Directory for the FIFOs
        #[arg(default_value = ".")]
        dir: String,
    },
}

const SIM_FIFOS: [&str; 4] = ["soc2cnsl", "cnsl2soc", "soc2eth", "eth2soc"];

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Build => {
            println!("Building project...");
            let status = Command::new("cargo").arg("build").status()?;
            if !status.success() {
                anyhow::bail!("Build failed");
            }
        }
        Commands::Run => {
            println!("Running console...");
            let status = Command::new("cargo")
                .arg("run")
                .arg("-p")
                .arg("socterm-cli")
                .status()?;
            if !status.success() {
                anyhow::bail!("Run failed");
            }
        }
        Commands::SetupSim { dir } => {
            std::fs::create_dir_all(dir)?;
            for name in SIM_FIFOS {
                let path = std::path::Path::new(dir).join(name);
                if path.exists() {
                    println!("{} already exists, skipping", path.display());
                    continue;
                }
                let status = Command::new("mkfifo").arg(&path).status()?;
                if !status.success() {
                    anyhow::bail!("mkfifo {} failed", path.display());
                }
                println!("Created {}", path.display());
            }
        }
    }

    Ok(())
}
