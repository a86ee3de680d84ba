pub mod api;
pub mod archive;
pub mod cli;
pub mod commands;
pub mod config_vdf;
pub mod constants;
pub mod data_backup;
pub mod error;
pub mod fix_applier;
pub mod fix_history;
pub mod fix_log;
pub mod login_users;
pub mod lua_parser;
pub mod lua_store;
pub mod settings;
pub mod steam_locator;
pub mod steam_process;
pub mod vdf;

use clap::Parser;
use log::LevelFilter;
use simplelog::{ColorChoice, CombinedLogger, Config, SharedLogger, TermLogger, TerminalMode, WriteLogger};
use std::fs::OpenOptions;

/// Terminal logging plus a persistent log in `<data dir>/basement/logs`.
pub fn init_logging(verbose: bool) {
    let level = if verbose || cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];

    if let Some(dir) = dirs::data_dir().map(|d| d.join(constants::APP_NAME).join("logs")) {
        let file = std::fs::create_dir_all(&dir).and_then(|_| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join(format!("{}.log", constants::APP_NAME)))
        });
        match file {
            Ok(file) => loggers.push(WriteLogger::new(LevelFilter::Info, Config::default(), file)),
            Err(e) => eprintln!("[basement] Could not open log file: {}", e),
        }
    }

    let _ = CombinedLogger::init(loggers);
}

#[tokio::main]
pub async fn run() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    init_logging(cli.verbose);
    log::debug!("[basement] {} {}", constants::APP_NAME, constants::APP_VERSION);
    cli::execute(cli).await
}
