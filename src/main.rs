use std::{env, fs::OpenOptions, io, path::PathBuf};

use crossterm::tty::IsTty;
use log::info;
use srs::{models::connections::AppConfig, ui::ConsoleUI};

#[derive(Debug, PartialEq, Eq)]
enum LogTarget {
    File(PathBuf),
    Stderr,
    Off,
}

/// The terminal belongs to the UI: logs go to `SRS_LOG_FILE`, or to stderr
/// only when stderr is redirected away from the terminal.
fn log_target(log_file: Option<String>, stderr_is_tty: bool) -> LogTarget {
    match log_file {
        Some(path) if !path.trim().is_empty() => LogTarget::File(PathBuf::from(path)),
        _ if stderr_is_tty => LogTarget::Off,
        _ => LogTarget::Stderr,
    }
}

fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let mut builder = env_logger::Builder::from_default_env();

    match log_target(env::var("SRS_LOG_FILE").ok(), io::stderr().is_tty()) {
        LogTarget::File(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        LogTarget::Stderr => {}
        LogTarget::Off => return Ok(()),
    }

    builder.try_init()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    init_logging()?;

    let config = AppConfig::load()?;
    let export_dir = env::var("SRS_EXPORT_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."));
    info!("starting console for {}:{}/{}", config.host, config.port, config.database);

    let mut tui = ConsoleUI::new(config, export_dir);
    tui.run_ui().await?;

    Ok(())
}
