use crate::commands::{self, AppState, BackupKind};
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "basement",
    version,
    about = "Manage Steam depot scripts, depot keys and reversible game fixes"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Use this Steam root for this run only")]
    pub steam_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Show the detected Steam installation")]
    Locate,

    #[command(about = "Remember a custom Steam root")]
    SetSteamPath { path: String },

    #[command(about = "List Steam library folders")]
    Libraries,

    #[command(about = "Print the install directory of an app")]
    InstallPath { app_id: String },

    #[command(about = "Show the current Steam user")]
    CurrentUser,

    #[command(about = "Manage depot scripts")]
    Scripts {
        #[command(subcommand)]
        action: ScriptCommands,
    },

    #[command(about = "Install a .lua script, a .manifest file or an archive of them")]
    Install { package: PathBuf },

    #[command(about = "Read, inject and upload depot decryption keys")]
    Keys {
        #[command(subcommand)]
        action: KeyCommands,
    },

    #[command(about = "Apply and revert game fixes")]
    Fix {
        #[command(subcommand)]
        action: FixCommands,
    },

    #[command(about = "Back up user data for the current Steam user")]
    Backup {
        #[arg(value_enum)]
        kind: BackupKind,
        out_dir: PathBuf,
    },

    #[command(about = "Restore a backup zip onto the Steam root")]
    Restore { zip: PathBuf },

    #[command(about = "Control the Steam client")]
    Steam {
        #[command(subcommand)]
        action: SteamCommands,
    },
}

#[derive(Subcommand)]
pub enum ScriptCommands {
    List,
    #[command(about = "Comment out manifest pins (all scripts when no app id is given)")]
    Patch { app_id: Option<String> },
    Enable { app_id: String },
    Disable { app_id: String },
    Delete { app_id: String },
    #[command(about = "Show depots declared by a script")]
    Depots { app_id: String },
    #[command(about = "Pin or unpin depot manifests")]
    Updates {
        #[command(subcommand)]
        action: UpdateCommands,
    },
}

#[derive(Subcommand)]
pub enum UpdateCommands {
    Disable { app_id: String },
    #[command(about = "Re-enable updates (all scripts when no app id is given)")]
    Enable { app_id: Option<String> },
    List,
}

#[derive(Subcommand)]
pub enum KeyCommands {
    Extract {
        #[arg(long, help = "Only depots with a higher id")]
        after: Option<String>,
    },
    #[command(about = "Copy keys from an app's script into config.vdf")]
    Inject { app_id: String },
    Upload {
        #[arg(long, help = "Ignore the auto-upload setting and interval")]
        force: bool,
    },
}

#[derive(Subcommand)]
pub enum FixCommands {
    Apply {
        app_id: String,
        archive: PathBuf,
        #[arg(long)]
        install: Option<PathBuf>,
        #[arg(long)]
        password: Option<String>,
    },
    ApplyUrl {
        app_id: String,
        #[arg(long, help = "Defaults to the configured fix URL template")]
        url: Option<String>,
        #[arg(long)]
        install: Option<PathBuf>,
        #[arg(long)]
        password: Option<String>,
    },
    Unfix {
        app_id: String,
        #[arg(long)]
        install: Option<PathBuf>,
    },
    History,
    Check { app_id: String },
}

#[derive(Subcommand)]
pub enum SteamCommands {
    Restart,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Password from the command line, else asked for on stdin.
fn password_provider(given: Option<String>) -> impl FnOnce() -> Option<String> + Send + 'static {
    move || {
        given.or_else(|| {
            eprint!("Archive password: ");
            io::stderr().flush().ok()?;
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line).ok()?;
            let line = line.trim_end_matches(&['\r', '\n'][..]).to_string();
            (!line.is_empty()).then_some(line)
        })
    }
}

pub async fn execute(cli: Cli) -> Result<()> {
    let state = AppState::from_default_paths().map_err(|e| anyhow!(e))?;
    if let Some(path) = &cli.steam_path {
        if !state.locator.set_custom_path(path) {
            return Err(anyhow!("{} is not a Steam installation", path.display()));
        }
    }

    match cli.command {
        Commands::Locate => print_json(&commands::locate_steam(&state).await.map_err(|e| anyhow!(e))?),
        Commands::SetSteamPath { path } => {
            commands::set_steam_path(&state, path).await.map_err(|e| anyhow!(e))
        }
        Commands::Libraries => {
            print_json(&commands::get_library_folders(&state).await.map_err(|e| anyhow!(e))?)
        }
        Commands::InstallPath { app_id } => match commands::get_install_path(&state, app_id.clone())
            .await
            .map_err(|e| anyhow!(e))?
        {
            Some(path) => {
                println!("{}", path);
                Ok(())
            }
            None => Err(anyhow!("App {} is not installed", app_id)),
        },
        Commands::CurrentUser => {
            print_json(&commands::get_current_user(&state).await.map_err(|e| anyhow!(e))?)
        }
        Commands::Scripts { action } => run_scripts(&state, action).await,
        Commands::Install { package } => {
            print_json(&commands::install_package(&state, package).await.map_err(|e| anyhow!(e))?)
        }
        Commands::Keys { action } => run_keys(&state, action).await,
        Commands::Fix { action } => run_fix(&state, action).await,
        Commands::Backup { kind, out_dir } => print_json(
            &commands::backup_user_data(&state, kind, out_dir)
                .await
                .map_err(|e| anyhow!(e))?,
        ),
        Commands::Restore { zip } => {
            let restored = commands::restore_user_data(&state, zip)
                .await
                .map_err(|e| anyhow!(e))?;
            println!("Restored {} files", restored);
            Ok(())
        }
        Commands::Steam {
            action: SteamCommands::Restart,
        } => commands::restart_steam(&state).await.map_err(|e| anyhow!(e)),
    }
}

async fn run_scripts(state: &AppState, action: ScriptCommands) -> Result<()> {
    match action {
        ScriptCommands::List => print_json(&commands::list_scripts(state).await.map_err(|e| anyhow!(e))?),
        ScriptCommands::Patch { app_id: Some(id) } => {
            print_json(&commands::patch_script(state, id).await.map_err(|e| anyhow!(e))?)
        }
        ScriptCommands::Patch { app_id: None } => {
            print_json(&commands::patch_all_scripts(state).await.map_err(|e| anyhow!(e))?)
        }
        ScriptCommands::Enable { app_id } => {
            commands::enable_script(state, app_id).await.map_err(|e| anyhow!(e))
        }
        ScriptCommands::Disable { app_id } => {
            commands::disable_script(state, app_id).await.map_err(|e| anyhow!(e))
        }
        ScriptCommands::Delete { app_id } => {
            commands::delete_script(state, app_id).await.map_err(|e| anyhow!(e))
        }
        ScriptCommands::Depots { app_id } => {
            print_json(&commands::get_script_depots(state, app_id).await.map_err(|e| anyhow!(e))?)
        }
        ScriptCommands::Updates { action } => match action {
            UpdateCommands::Disable { app_id } => {
                commands::disable_updates(state, app_id).await.map_err(|e| anyhow!(e))
            }
            UpdateCommands::Enable { app_id } => {
                let modified = commands::enable_updates(state, app_id)
                    .await
                    .map_err(|e| anyhow!(e))?;
                println!("Modified {} scripts", modified);
                Ok(())
            }
            UpdateCommands::List => {
                print_json(&commands::list_updates_disabled(state).await.map_err(|e| anyhow!(e))?)
            }
        },
    }
}

async fn run_keys(state: &AppState, action: KeyCommands) -> Result<()> {
    match action {
        KeyCommands::Extract { after } => {
            print_json(&commands::extract_config_keys(state, after).await.map_err(|e| anyhow!(e))?)
        }
        KeyCommands::Inject { app_id } => {
            let added = commands::inject_script_keys(state, app_id)
                .await
                .map_err(|e| anyhow!(e))?;
            println!("Added {} depot keys", added);
            Ok(())
        }
        KeyCommands::Upload { force } => {
            print_json(&commands::upload_config_keys(state, force).await.map_err(|e| anyhow!(e))?)
        }
    }
}

async fn run_fix(state: &AppState, action: FixCommands) -> Result<()> {
    match action {
        FixCommands::Apply {
            app_id,
            archive,
            install,
            password,
        } => print_json(
            &commands::apply_fix_from_file(state, app_id, archive, install, password_provider(password))
                .await
                .map_err(|e| anyhow!(e))?,
        ),
        FixCommands::ApplyUrl {
            app_id,
            url,
            install,
            password,
        } => print_json(
            &commands::apply_fix_from_url(state, app_id, url, install, password_provider(password))
                .await
                .map_err(|e| anyhow!(e))?,
        ),
        FixCommands::Unfix { app_id, install } => {
            print_json(&commands::unfix_game(state, app_id, install).await.map_err(|e| anyhow!(e))?)
        }
        FixCommands::History => {
            print_json(&commands::get_fix_history(state).await.map_err(|e| anyhow!(e))?)
        }
        FixCommands::Check { app_id } => {
            match commands::check_fix_available(state, app_id.clone())
                .await
                .map_err(|e| anyhow!(e))?
            {
                Some(url) => println!("Fix available: {}", url),
                None => println!("No fix available for {}", app_id),
            }
            Ok(())
        }
    }
}
