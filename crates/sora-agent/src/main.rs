use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sora_agent::logging::{self, LogOptions};
use sora_agent::settings::AgentSettings;
use sora_agent::app;

#[derive(Parser)]
#[command(name = "sora-agent")]
#[command(about = "Sora Agent - remote screen, camera and window access over Telegram")]
struct Args {
    /// Settings file (TOML); SORA_* environment variables are used otherwise
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Credentials file, overriding the settings
    #[arg(long, global = true)]
    credentials: Option<PathBuf>,

    /// Log level, overriding the settings
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Serve commands (default)
    Run,
    /// Write an obfuscated credentials file
    WriteCredentials {
        /// Bot API token
        #[arg(long)]
        token: String,
        /// Telegram user id of the administrator
        #[arg(long)]
        admin_id: String,
    },
    /// Validate the credentials file and exit
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut settings = AgentSettings::load(args.config.as_deref())?;
    if let Some(path) = args.credentials {
        settings.credentials_path = path;
    }
    if let Some(level) = args.log_level {
        settings.log_level = level;
    }
    settings.validate()?;

    let _guard = logging::init(&LogOptions {
        level: settings.log_level.to_ascii_lowercase(),
        dir: settings.log_dir.clone(),
        json: settings.log_json,
    })?;

    match args.command.unwrap_or(Cmd::Run) {
        Cmd::Run => app::run(&settings).await?,
        Cmd::WriteCredentials { token, admin_id } => {
            app::write_credentials(&settings.credentials_path, &token, &admin_id)?
        }
        Cmd::Check => {
            let credentials = app::check_credentials(&settings.credentials_path)?;
            println!("admin id: {}", credentials.admin_id);
        }
    }

    Ok(())
}
