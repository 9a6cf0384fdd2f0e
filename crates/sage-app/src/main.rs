use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{debug, info};
use sage_launch::app_probe::OsaScriptProbe;
use sage_launch::env_editor::EnvironmentEditor;
use sage_launch::launch::{notebook_choices, terminal_choices};
use sage_launch::search_path::required_paths;
use sage_launch::server_markers::{self, RuntimeMarker, DEFAULT_SHUTDOWN_PAUSE};
use sage_launch::{
    about_text, AppContext, Disposition, InterfaceType, LaunchError, LaunchOutcome, LaunchState,
    Launcher, OsSpawner, Prompter,
};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

mod prompt;

use crate::prompt::TerminalPrompter;

#[derive(Parser)]
#[command(name = "sage-app")]
#[command(author, version, about = "Start SageMath from its macOS app bundle", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// The app bundle's Contents directory (default: derived from this executable)
    #[arg(long, global = true)]
    bundle: Option<PathBuf>,

    /// Log level
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch Sage (default if no command specified)
    Launch {
        /// Interface: cli or nb
        #[arg(long)]
        interface: Option<String>,
        /// Terminal for the command line: Terminal.app or iTerm.app
        #[arg(long)]
        terminal: Option<String>,
        /// Notebook front end: classic, lab or v7
        #[arg(long)]
        notebook_type: Option<String>,
        /// Folder holding your notebooks
        #[arg(long)]
        notebook_dir: Option<String>,
        /// Answer yes to every question
        #[arg(short, long)]
        yes: bool,
    },
    /// Inspect or stop notebook servers started from the app
    Servers {
        #[command(subcommand)]
        command: ServerCommands,
    },
    /// Edit environment variables passed to Sage
    Env {
        #[command(subcommand)]
        command: EnvCommands,
    },
    /// Inspect the saved launch settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
    /// Show the interfaces that can be launched
    Choices,
    /// About SageMath
    About,
}

#[derive(Subcommand)]
enum ServerCommands {
    /// List running servers
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Stop every running server
    Stop {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Show the saved launch settings
    Show {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum EnvCommands {
    /// List variables
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Add a variable with an empty value
    Add { name: String },
    /// Set a variable
    Set { name: String, value: String },
    /// Remove a variable
    Unset { name: String },
}

#[derive(Tabled)]
struct ServerTableRow {
    #[tabled(rename = "PID")]
    pid: i32,
    #[tabled(rename = "PORT")]
    port: String,
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "NOTEBOOK DIR")]
    notebook_dir: String,
}

impl From<&RuntimeMarker> for ServerTableRow {
    fn from(marker: &RuntimeMarker) -> Self {
        ServerTableRow {
            pid: marker.pid,
            port: marker
                .port
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string()),
            url: marker.url.clone().unwrap_or_else(|| "-".to_string()),
            notebook_dir: marker
                .notebook_dir
                .as_deref()
                .map(shorten_path)
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

#[derive(Tabled)]
struct EnvTableRow {
    #[tabled(rename = "VARIABLE")]
    name: String,
    #[tabled(rename = "VALUE")]
    value: String,
}

#[derive(Serialize)]
struct Choices {
    terminals: Vec<String>,
    notebook_types: Vec<String>,
}

/// Shorten a path for display by replacing home directory with ~
fn shorten_path(path: &str) -> String {
    shorten_under(Path::new(path), dirs::home_dir().as_deref())
}

fn shorten_under(path: &Path, home: Option<&Path>) -> String {
    if let Some(home) = home {
        if let Ok(relative) = path.strip_prefix(home) {
            return format!("~/{}", relative.display());
        }
    }
    path.display().to_string()
}

/// The launcher's own environment, skipping entries that are not UTF-8.
fn inherited_env() -> BTreeMap<String, String> {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    let ctx = AppContext::discover(cli.bundle).context("Failed to locate the app bundle")?;
    ctx.prepare();

    let version = match ctx.read_version() {
        Ok(version) => version,
        Err(e) => fatal(&e),
    };
    let link = match ctx.ensure_version_link(&version) {
        Ok(link) => link,
        Err(e) => fatal(&e),
    };
    debug!("SageMath {} via {:?}", version, link);

    match cli.command {
        None => launch(&ctx, &link, LaunchArgs::default()),
        Some(Commands::Launch {
            interface,
            terminal,
            notebook_type,
            notebook_dir,
            yes,
        }) => launch(
            &ctx,
            &link,
            LaunchArgs {
                interface,
                terminal,
                notebook_type,
                notebook_dir,
                yes,
            },
        ),
        Some(Commands::Servers { command }) => server_command(&ctx, command),
        Some(Commands::Env { command }) => env_command(&ctx, command),
        Some(Commands::Settings {
            command: SettingsCommands::Show { json },
        }) => show_settings(&ctx, json),
        Some(Commands::Choices) => show_choices(&ctx),
        Some(Commands::About) => {
            println!("{}", about_text(&version));
            Ok(())
        }
    }
}

/// Report an error the app cannot run without, then exit.
fn fatal(err: &LaunchError) -> ! {
    TerminalPrompter::new(false).show_warning(&err.to_string());
    std::process::exit(1);
}

#[derive(Default)]
struct LaunchArgs {
    interface: Option<String>,
    terminal: Option<String>,
    notebook_type: Option<String>,
    notebook_dir: Option<String>,
    yes: bool,
}

/// Apply command line choices over the saved ones.
fn selection_from(saved: LaunchState, args: &LaunchArgs) -> Result<LaunchState, LaunchError> {
    let mut selection = saved;
    if let Some(interface) = &args.interface {
        selection.interface_type = interface.parse()?;
    }
    if let Some(terminal) = &args.terminal {
        selection.terminal_app = terminal.parse()?;
    }
    if let Some(kind) = &args.notebook_type {
        selection.notebook_type = kind.parse()?;
    }
    Ok(selection)
}

/// Whether a requested notebook directory replaces the one in use.
///
/// Only notebook launches serve a directory, so only they may need running
/// servers stopped first.
fn switches_notebook_dir(selection: &LaunchState, requested: &str) -> bool {
    selection.interface_type == InterfaceType::Notebook && requested != selection.notebook_dir
}

fn launch(ctx: &AppContext, link: &Path, args: LaunchArgs) -> Result<()> {
    let mut prompter = TerminalPrompter::new(args.yes);
    let saved = ctx.settings_store().load().state;
    let mut selection = match selection_from(saved, &args) {
        Ok(selection) => selection,
        Err(e) => {
            prompter.show_error(&e.to_string());
            std::process::exit(1);
        }
    };

    let mut launcher = Launcher::new(
        ctx,
        OsSpawner,
        prompter,
        inherited_env(),
        required_paths(link),
    );

    if let Some(dir) = args.notebook_dir {
        if switches_notebook_dir(&selection, &dir) && launcher.select_notebook_dir().is_err() {
            std::process::exit(1);
        }
        selection.notebook_dir = dir;
    }

    match launcher.launch(&selection) {
        Ok(LaunchOutcome::Terminal(app)) => println!("Started Sage in {}", app),
        Ok(LaunchOutcome::Server { program }) => println!("Started {}", program),
        Ok(LaunchOutcome::Reused { target }) => println!("Opened running server {}", target),
        Err(e) => {
            info!("Launch aborted: {}", e);
            std::process::exit(match e.disposition() {
                Disposition::Ignored => 0,
                _ => 1,
            });
        }
    }
    Ok(())
}

fn server_command(ctx: &AppContext, command: ServerCommands) -> Result<()> {
    let servers = server_markers::list_servers(&ctx.runtime_dir());
    match command {
        ServerCommands::List { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&servers)?);
            } else if servers.is_empty() {
                println!("No running servers found.");
            } else {
                let rows: Vec<ServerTableRow> = servers.iter().map(ServerTableRow::from).collect();
                println!("{}", Table::new(rows).with(Style::rounded()));
            }
        }
        ServerCommands::Stop { yes } => {
            if servers.is_empty() {
                println!("No running servers found.");
                return Ok(());
            }
            let question = format!("Stop {} running server(s)?", servers.len());
            if !TerminalPrompter::new(yes).ask_yes_no(&question) {
                return Ok(());
            }
            for server in &servers {
                server_markers::stop_server(server, DEFAULT_SHUTDOWN_PAUSE);
                println!("Stopped {}", server.pid);
            }
        }
    }
    Ok(())
}

fn env_command(ctx: &AppContext, command: EnvCommands) -> Result<()> {
    let mut editor = EnvironmentEditor::open(ctx.settings_store());
    match command {
        EnvCommands::List { json } => {
            if json {
                let vars: BTreeMap<&str, &str> = editor
                    .variables()
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&vars)?);
            } else if editor.variables().is_empty() {
                println!("No environment variables set.");
            } else {
                let rows: Vec<EnvTableRow> = editor
                    .variables()
                    .iter()
                    .map(|(name, value)| EnvTableRow {
                        name: name.clone(),
                        value: value.clone(),
                    })
                    .collect();
                println!("{}", Table::new(rows).with(Style::rounded()));
            }
            // Listing never writes.
            return Ok(());
        }
        EnvCommands::Add { name } => editor.add(&name),
        EnvCommands::Set { name, value } => editor.set(&name, &value),
        EnvCommands::Unset { name } => {
            if !editor.remove(&name) {
                anyhow::bail!("{} is not set", name);
            }
        }
    }
    editor
        .done()
        .with_context(|| format!("Failed to save {}", ctx.settings_path().display()))
}

fn show_settings(ctx: &AppContext, json: bool) -> Result<()> {
    let settings = ctx.settings_store().load();
    if json {
        println!("{}", serde_json::to_string_pretty(&settings)?);
        return Ok(());
    }
    let state = &settings.state;
    println!("Interface:      {}", state.interface_type);
    println!("Terminal:       {}", state.terminal_app);
    println!("Notebook:       {}", state.notebook_type);
    println!(
        "Notebook dir:   {}",
        if state.notebook_dir.is_empty() {
            "-".to_string()
        } else {
            shorten_path(&state.notebook_dir)
        }
    );
    println!("Settings file:  {}", ctx.settings_path().display());
    Ok(())
}

fn show_choices(ctx: &AppContext) -> Result<()> {
    let state = ctx.settings_store().load().state;
    let choices = Choices {
        terminals: terminal_choices(&OsaScriptProbe, state.terminal_app)
            .iter()
            .map(ToString::to_string)
            .collect(),
        notebook_types: notebook_choices(state.notebook_type)
            .iter()
            .map(ToString::to_string)
            .collect(),
    };
    println!("{}", serde_json::to_string_pretty(&choices)?);
    Ok(())
}
