//! Turning the launch window's choices into a running Sage.
//!
//! A [`LaunchState`] selection maps to exactly one [`LaunchMode`]:
//!
//! - `Shell`: Sage's command line in Terminal.app or iTerm2
//! - `Classic`: the classic Jupyter server, or the one already running
//! - `Alternative`: JupyterLab or Notebook 7 from the notebook venv
//!
//! Every launch gets the same environment: the launcher's own environment,
//! the persisted overrides on top, `JUPYTER_RUNTIME_DIR` pointing at the
//! runtime directory, and a `PATH` that always contains Sage's directories.
//! Settings are saved only after a successful launch.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};

use crate::app_probe::{AppProbe, ITERM_BUNDLE_ID};
use crate::context::{AppContext, RUNTIME_DIR_VAR};
use crate::error::{Disposition, LaunchError, LaunchResult};
use crate::search_path::{build_search_path, join_search_path};
use crate::server_markers::{self, DEFAULT_SHUTDOWN_PAUSE};
use crate::settings::{LaunchState, NotebookType, SettingsStore, TerminalApp};
use crate::spawn::{ProcessSpawner, SpawnRequest};
use crate::terminal;

/// Dialogs the launcher needs from its user interface.
pub trait Prompter {
    fn show_warning(&mut self, message: &str);
    fn show_error(&mut self, message: &str);
    /// Ask a yes/no question; `true` means yes.
    fn ask_yes_no(&mut self, message: &str) -> bool;
    /// Ask the user to confirm with OK or back out with Cancel; `true` means OK.
    fn ask_ok_cancel(&mut self, message: &str) -> bool {
        self.ask_yes_no(message)
    }
}

/// Notebook front ends served from the notebook venv.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frontend {
    Lab,
    V7,
}

impl Frontend {
    /// Python module that starts the front end.
    pub fn module(&self) -> &'static str {
        match self {
            Frontend::Lab => "jupyterlab",
            Frontend::V7 => "notebook",
        }
    }
}

/// How to start Sage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchMode {
    Shell {
        terminal: TerminalApp,
    },
    Classic {
        notebook_dir: String,
    },
    Alternative {
        frontend: Frontend,
        notebook_dir: String,
    },
}

impl From<&LaunchState> for LaunchMode {
    fn from(state: &LaunchState) -> Self {
        use crate::settings::InterfaceType;

        let notebook_dir = state.notebook_dir.clone();
        match (state.interface_type, state.notebook_type) {
            (InterfaceType::Cli, _) => LaunchMode::Shell {
                terminal: state.terminal_app,
            },
            (InterfaceType::Notebook, NotebookType::Classic) => {
                LaunchMode::Classic { notebook_dir }
            }
            (InterfaceType::Notebook, NotebookType::Lab) => LaunchMode::Alternative {
                frontend: Frontend::Lab,
                notebook_dir,
            },
            (InterfaceType::Notebook, NotebookType::V7) => LaunchMode::Alternative {
                frontend: Frontend::V7,
                notebook_dir,
            },
        }
    }
}

/// What a successful launch did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// A terminal window was asked to run Sage.
    Terminal(TerminalApp),
    /// A new notebook server process was started.
    Server { program: String },
    /// An already running classic server was opened.
    Reused { target: String },
}

/// Terminal choices, saved preference first. iTerm2 is offered only when
/// installed.
pub fn terminal_choices(probe: &dyn AppProbe, preferred: TerminalApp) -> Vec<TerminalApp> {
    let mut choices = vec![TerminalApp::Terminal];
    if probe.is_installed(ITERM_BUNDLE_ID) {
        if preferred == TerminalApp::ITerm {
            choices.insert(0, TerminalApp::ITerm);
        } else {
            choices.push(TerminalApp::ITerm);
        }
    }
    choices
}

/// Notebook choices with the saved favourite first.
pub fn notebook_choices(favorite: NotebookType) -> Vec<NotebookType> {
    let mut choices = NotebookType::ALL.to_vec();
    choices.retain(|kind| *kind != favorite);
    choices.insert(0, favorite);
    choices
}

/// Build the environment for a launched process.
///
/// `PATH` is rebuilt from the override's `PATH` (not the inherited one) plus
/// `required`.
pub fn assemble_environment<I>(
    base: I,
    overrides: &BTreeMap<String, String>,
    runtime_dir: &Path,
    required: &[String],
) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut env: BTreeMap<String, String> = base.into_iter().collect();
    env.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    env.insert(
        RUNTIME_DIR_VAR.to_string(),
        runtime_dir.display().to_string(),
    );
    let user_path = overrides.get("PATH").map(String::as_str).unwrap_or("");
    env.insert(
        "PATH".to_string(),
        join_search_path(&build_search_path(user_path, required)),
    );
    env
}

/// Runs launches against one application context.
pub struct Launcher<'a, S: ProcessSpawner, P: Prompter> {
    ctx: &'a AppContext,
    store: SettingsStore,
    spawner: S,
    prompter: P,
    base_env: BTreeMap<String, String>,
    required_paths: Vec<String>,
    shutdown_pause: Duration,
}

impl<'a, S: ProcessSpawner, P: Prompter> Launcher<'a, S, P> {
    /// `required_paths` are appended to every `PATH`; `base_env` is the
    /// environment launched processes inherit.
    pub fn new(
        ctx: &'a AppContext,
        spawner: S,
        prompter: P,
        base_env: BTreeMap<String, String>,
        required_paths: Vec<String>,
    ) -> Self {
        Self {
            ctx,
            store: ctx.settings_store(),
            spawner,
            prompter,
            base_env,
            required_paths,
            shutdown_pause: DEFAULT_SHUTDOWN_PAUSE,
        }
    }

    /// Change the pause between the two interrupts sent to a server.
    pub fn with_shutdown_pause(mut self, pause: Duration) -> Self {
        self.shutdown_pause = pause;
        self
    }

    pub fn spawner(&self) -> &S {
        &self.spawner
    }

    pub fn prompter(&self) -> &P {
        &self.prompter
    }

    pub fn store(&self) -> &SettingsStore {
        &self.store
    }

    /// The environment the next launch would use.
    pub fn environment(&self) -> BTreeMap<String, String> {
        let overrides = self.store.load().environment;
        assemble_environment(
            self.base_env.clone(),
            &overrides,
            &self.ctx.runtime_dir(),
            &self.required_paths,
        )
    }

    /// Launch according to `selection`, then persist it.
    ///
    /// User-facing failures are shown through the prompter before being
    /// returned; nothing is saved when the launch fails.
    pub fn launch(&mut self, selection: &LaunchState) -> LaunchResult<LaunchOutcome> {
        let mode = LaunchMode::from(selection);
        info!("[launch] Launching {:?}", mode);

        match self.run(&mode) {
            Ok(outcome) => {
                let mut settings = self.store.load();
                settings.state = selection.clone();
                self.store.save(&settings);
                Ok(outcome)
            }
            Err(e) => {
                self.report(&e);
                if matches!(mode, LaunchMode::Alternative { .. }) && e.is_notebook_dir_error() {
                    self.prompter
                        .show_error("Please select a notebook directory.");
                }
                Err(e)
            }
        }
    }

    fn run(&mut self, mode: &LaunchMode) -> LaunchResult<LaunchOutcome> {
        let env = self.environment();
        match mode {
            LaunchMode::Shell { terminal } => self.launch_terminal(*terminal, env),
            LaunchMode::Classic { notebook_dir } => self.launch_classic(notebook_dir, env),
            LaunchMode::Alternative {
                frontend,
                notebook_dir,
            } => self.launch_alternative(*frontend, notebook_dir, env),
        }
    }

    fn launch_terminal(
        &mut self,
        app: TerminalApp,
        env: BTreeMap<String, String>,
    ) -> LaunchResult<LaunchOutcome> {
        let command = terminal::sage_shell_command(&self.ctx.sage_executable());
        let script = match app {
            TerminalApp::Terminal => terminal::terminal_app_script(&command),
            TerminalApp::ITerm => {
                self.spawner.spawn(
                    &SpawnRequest::waited("open", vec!["-a".into(), "iTerm".into()])
                        .with_env(env.clone()),
                )?;
                terminal::iterm_script(&command)
            }
        };
        self.spawner.spawn(
            &SpawnRequest::waited("osascript", vec!["-".into()])
                .with_env(env)
                .with_stdin(script),
        )?;
        Ok(LaunchOutcome::Terminal(app))
    }

    fn launch_classic(
        &mut self,
        notebook_dir: &str,
        env: BTreeMap<String, String>,
    ) -> LaunchResult<LaunchOutcome> {
        if let Some(target) = server_markers::reuse_target(&self.ctx.runtime_dir()) {
            info!("[launch] Reusing running server at {}", target);
            self.spawner
                .spawn(&SpawnRequest::waited("open", vec![target.clone()]).with_env(env))?;
            return Ok(LaunchOutcome::Reused { target });
        }

        let dir = self.check_notebook_dir(notebook_dir)?;
        let program = self.ctx.sage_executable().display().to_string();
        self.spawner.spawn(
            &SpawnRequest::detached(
                program.clone(),
                vec![
                    "--jupyter".into(),
                    "notebook".into(),
                    notebook_dir_flag(&dir),
                ],
            )
            .with_env(env),
        )?;
        Ok(LaunchOutcome::Server { program })
    }

    fn launch_alternative(
        &mut self,
        frontend: Frontend,
        notebook_dir: &str,
        env: BTreeMap<String, String>,
    ) -> LaunchResult<LaunchOutcome> {
        let dir = self.check_notebook_dir(notebook_dir)?;
        let program = self.ctx.notebook_python().display().to_string();
        self.spawner.spawn(
            &SpawnRequest::detached(
                program.clone(),
                vec![
                    "-m".into(),
                    frontend.module().into(),
                    notebook_dir_flag(&dir),
                ],
            )
            .with_env(env),
        )?;
        Ok(LaunchOutcome::Server { program })
    }

    /// Make sure the notebook directory can be used, offering to create it.
    pub fn check_notebook_dir(&mut self, notebook_dir: &str) -> LaunchResult<PathBuf> {
        if notebook_dir.trim().is_empty() {
            return Err(LaunchError::NotebookDirEmpty);
        }
        let dir = PathBuf::from(notebook_dir);
        if !dir.exists() {
            let question = format!("May we create the folder {}?", dir.display());
            if !self.prompter.ask_yes_no(&question) {
                return Err(LaunchError::NotebookDirDeclined(dir));
            }
            std::fs::create_dir_all(&dir).map_err(|source| LaunchError::NotebookDirCreate {
                path: dir.clone(),
                source,
            })?;
            info!("[launch] Created {:?}", dir);
        }
        std::fs::read_dir(&dir).map_err(|source| LaunchError::NotebookDirUnreadable {
            path: dir.clone(),
            source,
        })?;
        Ok(dir)
    }

    /// Prepare to switch notebook directories.
    ///
    /// A running server keeps serving its old directory, so it must be
    /// stopped first; declining leaves everything as it was.
    pub fn select_notebook_dir(&mut self) -> LaunchResult<()> {
        let servers = server_markers::list_servers(&self.ctx.runtime_dir());
        if servers.is_empty() {
            return Ok(());
        }
        let question = "You already have a Jupyter server running with the notebook \
                        directory shown.  Do you want to stop that server and start a new one?";
        if !self.prompter.ask_yes_no(question) {
            return Err(LaunchError::ServerStopDeclined);
        }
        for server in &servers {
            server_markers::stop_server(server, self.shutdown_pause);
        }
        Ok(())
    }

    fn report(&mut self, err: &LaunchError) {
        match err {
            LaunchError::NotebookDirEmpty => self.prompter.show_warning(&err.to_string()),
            LaunchError::NotebookDirDeclined(_) | LaunchError::ServerStopDeclined => {}
            _ => match err.disposition() {
                Disposition::UserFacing | Disposition::Fatal => {
                    self.prompter.show_error(&err.to_string())
                }
                Disposition::Ignored => warn!("[launch] {}", err),
            },
        }
    }
}

fn notebook_dir_flag(dir: &Path) -> String {
    format!("--notebook-dir={}", dir.display())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(bool);

    impl AppProbe for Fixed {
        fn try_is_installed(&self, _bundle_id: &str) -> LaunchResult<bool> {
            Ok(self.0)
        }
    }

    #[test]
    fn test_terminal_choices() {
        assert_eq!(
            terminal_choices(&Fixed(false), TerminalApp::ITerm),
            vec![TerminalApp::Terminal]
        );
        assert_eq!(
            terminal_choices(&Fixed(true), TerminalApp::ITerm),
            vec![TerminalApp::ITerm, TerminalApp::Terminal]
        );
        assert_eq!(
            terminal_choices(&Fixed(true), TerminalApp::Terminal),
            vec![TerminalApp::Terminal, TerminalApp::ITerm]
        );
    }

    #[test]
    fn test_notebook_choices() {
        assert_eq!(
            notebook_choices(NotebookType::V7),
            vec![NotebookType::V7, NotebookType::Classic, NotebookType::Lab]
        );
        assert_eq!(notebook_choices(NotebookType::Classic), NotebookType::ALL.to_vec());
    }

    #[test]
    fn test_mode_from_state() {
        let mut state = LaunchState::default();
        assert_eq!(
            LaunchMode::from(&state),
            LaunchMode::Shell {
                terminal: TerminalApp::Terminal
            }
        );
        state.interface_type = crate::settings::InterfaceType::Notebook;
        state.notebook_type = NotebookType::Lab;
        state.notebook_dir = "/nb".into();
        assert_eq!(
            LaunchMode::from(&state),
            LaunchMode::Alternative {
                frontend: Frontend::Lab,
                notebook_dir: "/nb".into()
            }
        );
    }

    #[test]
    fn test_assemble_environment() {
        let base = vec![
            ("HOME".to_string(), "/Users/me".to_string()),
            ("PATH".to_string(), "/should/not/survive".to_string()),
            ("LANG".to_string(), "C".to_string()),
        ];
        let mut overrides = BTreeMap::new();
        overrides.insert("PATH".to_string(), "/opt/bin::/bin".to_string());
        overrides.insert("LANG".to_string(), "en_US.UTF-8".to_string());
        let required = vec!["/bin".to_string(), "/usr/bin".to_string()];

        let env = assemble_environment(base, &overrides, Path::new("/rt"), &required);
        assert_eq!(env["PATH"], "/opt/bin:/bin:/usr/bin");
        assert_eq!(env["LANG"], "en_US.UTF-8");
        assert_eq!(env["HOME"], "/Users/me");
        assert_eq!(env[RUNTIME_DIR_VAR], "/rt");
    }

    #[test]
    fn test_assemble_environment_without_overrides() {
        let env = assemble_environment(
            Vec::new(),
            &BTreeMap::new(),
            Path::new("/rt"),
            &["/bin".to_string()],
        );
        assert_eq!(env["PATH"], "/bin");
    }

    #[test]
    fn test_frontend_modules() {
        assert_eq!(Frontend::Lab.module(), "jupyterlab");
        assert_eq!(Frontend::V7.module(), "notebook");
    }
}
