use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use complaint_intake_lib::{resolve_address, IntakeState, FALLBACK_NOTICE};

/// Address resolution for the citizen complaint desk.
#[derive(Parser)]
#[command(name = "complaint-intake", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reverse-geocode a point and print its address.
    Resolve {
        #[arg(allow_negative_numbers = true)]
        lat: f64,
        #[arg(allow_negative_numbers = true)]
        lng: f64,
    },
    /// Print the effective configuration and resolver state as JSON.
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let state = IntakeState::from_env().context("failed to initialise complaint intake")?;

    match cli.command {
        Command::Resolve { lat, lng } => {
            let resolution = resolve_address(&state, lat, lng)
                .await
                .with_context(|| format!("could not resolve ({lat}, {lng})"))?;
            if resolution.is_fallback() {
                eprintln!("{FALLBACK_NOTICE}");
            }
            println!("{}", resolution.address);
        }
        Command::Health => {
            println!("{}", serde_json::to_string_pretty(&state.health())?);
        }
    }
    Ok(())
}
