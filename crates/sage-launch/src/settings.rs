//! Launcher settings persistence.
//!
//! Settings live in a property list at
//! `~/Library/Application Support/SageMath/Settings.plist` with two groupings:
//!
//! - `state`: the choices made in the launch window
//! - `environment`: variable overrides edited in the environment editor
//!
//! Loading never fails: a missing or corrupt file yields the defaults, and
//! persisted keys are merged over the defaults one key at a time.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, warn};
use serde::Serialize;

use crate::error::{LaunchError, LaunchResult};

/// Top-level key of the launch window choices.
pub const STATE_KEY: &str = "state";
/// Top-level key of the environment overrides.
pub const ENVIRONMENT_KEY: &str = "environment";

/// Which user interface to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum InterfaceType {
    /// Sage's command line in a terminal window
    #[default]
    #[serde(rename = "cli")]
    Cli,
    /// A Jupyter notebook front end
    #[serde(rename = "nb")]
    Notebook,
}

impl InterfaceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterfaceType::Cli => "cli",
            InterfaceType::Notebook => "nb",
        }
    }
}

impl FromStr for InterfaceType {
    type Err = LaunchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "cli" | "shell" => Ok(InterfaceType::Cli),
            "nb" | "notebook" => Ok(InterfaceType::Notebook),
            other => Err(LaunchError::UnknownChoice {
                kind: "interface",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for InterfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal emulator used for the command line interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum TerminalApp {
    #[default]
    #[serde(rename = "Terminal.app")]
    Terminal,
    #[serde(rename = "iTerm.app")]
    ITerm,
}

impl TerminalApp {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalApp::Terminal => "Terminal.app",
            TerminalApp::ITerm => "iTerm.app",
        }
    }
}

impl FromStr for TerminalApp {
    type Err = LaunchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Terminal.app" | "Terminal" | "terminal" => Ok(TerminalApp::Terminal),
            "iTerm.app" | "iTerm" | "iterm" => Ok(TerminalApp::ITerm),
            other => Err(LaunchError::UnknownChoice {
                kind: "terminal application",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for TerminalApp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notebook front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum NotebookType {
    #[default]
    #[serde(rename = "Classic Jupyter")]
    Classic,
    #[serde(rename = "Jupyter Lab")]
    Lab,
    #[serde(rename = "Notebook v7")]
    V7,
}

impl NotebookType {
    pub const ALL: [NotebookType; 3] = [NotebookType::Classic, NotebookType::Lab, NotebookType::V7];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotebookType::Classic => "Classic Jupyter",
            NotebookType::Lab => "Jupyter Lab",
            NotebookType::V7 => "Notebook v7",
        }
    }
}

impl FromStr for NotebookType {
    type Err = LaunchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Classic Jupyter" | "classic" => Ok(NotebookType::Classic),
            "Jupyter Lab" | "lab" => Ok(NotebookType::Lab),
            "Notebook v7" | "v7" => Ok(NotebookType::V7),
            other => Err(LaunchError::UnknownChoice {
                kind: "notebook type",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for NotebookType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `state` grouping: what the launch window shows.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct LaunchState {
    pub interface_type: InterfaceType,
    pub terminal_app: TerminalApp,
    pub notebook_type: NotebookType,
    pub notebook_dir: String,
    /// Keys this version does not know about, kept so they survive a save.
    #[serde(skip)]
    pub extra: BTreeMap<String, plist::Value>,
}

impl LaunchState {
    /// Overlay persisted keys. Values that do not decode keep the default.
    fn merge(&mut self, persisted: &plist::Dictionary) {
        for (key, value) in persisted.iter() {
            let text = value.as_string();
            match key.as_str() {
                "interface_type" => merge_choice(&mut self.interface_type, key, text),
                "terminal_app" => merge_choice(&mut self.terminal_app, key, text),
                "notebook_type" => merge_choice(&mut self.notebook_type, key, text),
                "notebook_dir" => match text {
                    Some(dir) => self.notebook_dir = dir.to_string(),
                    None => debug!("[settings] Ignoring non-string notebook_dir"),
                },
                _ => {
                    self.extra.insert(key.clone(), value.clone());
                }
            }
        }
    }

    fn to_dictionary(&self) -> plist::Dictionary {
        let mut dict = plist::Dictionary::new();
        dict.insert(
            "interface_type".to_string(),
            plist::Value::from(self.interface_type.as_str()),
        );
        dict.insert(
            "terminal_app".to_string(),
            plist::Value::from(self.terminal_app.as_str()),
        );
        dict.insert(
            "notebook_type".to_string(),
            plist::Value::from(self.notebook_type.as_str()),
        );
        dict.insert(
            "notebook_dir".to_string(),
            plist::Value::from(self.notebook_dir.clone()),
        );
        for (key, value) in &self.extra {
            dict.insert(key.clone(), value.clone());
        }
        dict
    }
}

fn merge_choice<T: FromStr>(slot: &mut T, key: &str, text: Option<&str>) {
    match text.map(str::parse::<T>) {
        Some(Ok(value)) => *slot = value,
        _ => debug!("[settings] Ignoring unrecognised value for {}", key),
    }
}

/// Everything the launcher persists.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Settings {
    pub state: LaunchState,
    pub environment: BTreeMap<String, String>,
}

impl Settings {
    /// Defaults with the persisted groupings merged over them.
    pub fn from_dictionary(persisted: &plist::Dictionary) -> Self {
        let mut settings = Settings::default();
        if let Some(state) = persisted.get(STATE_KEY).and_then(|v| v.as_dictionary()) {
            settings.state.merge(state);
        }
        if let Some(environment) = persisted
            .get(ENVIRONMENT_KEY)
            .and_then(|v| v.as_dictionary())
        {
            settings.environment = environment_from_dictionary(environment);
        }
        settings
    }
}

/// Read the string-valued entries of an `environment` grouping.
pub fn environment_from_dictionary(dict: &plist::Dictionary) -> BTreeMap<String, String> {
    dict.iter()
        .filter_map(|(name, value)| match value.as_string() {
            Some(text) => Some((name.clone(), text.to_string())),
            None => {
                debug!("[settings] Skipping non-string environment value {}", name);
                None
            }
        })
        .collect()
}

/// Handle on the persisted settings file.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the raw top-level dictionary.
    pub fn try_read_raw(&self) -> LaunchResult<plist::Dictionary> {
        if !self.path.exists() {
            return Err(LaunchError::SettingsMissing(self.path.clone()));
        }
        plist::Value::from_file(&self.path)
            .map_err(|source| LaunchError::SettingsRead {
                path: self.path.clone(),
                source,
            })?
            .into_dictionary()
            .ok_or_else(|| LaunchError::SettingsShape(self.path.clone()))
    }

    /// Read the raw top-level dictionary, treating any failure as empty.
    pub fn read_raw_or_empty(&self) -> plist::Dictionary {
        match self.try_read_raw() {
            Ok(dict) => dict,
            Err(LaunchError::SettingsMissing(_)) => plist::Dictionary::new(),
            Err(e) => {
                warn!("[settings] {}; using defaults", e);
                plist::Dictionary::new()
            }
        }
    }

    /// Load settings merged over the defaults. Never fails.
    pub fn load(&self) -> Settings {
        Settings::from_dictionary(&self.read_raw_or_empty())
    }

    /// Write `settings.state` over a fresh read of the file, leaving every
    /// other grouping as it is on disk.
    pub fn try_save(&self, settings: &Settings) -> LaunchResult<()> {
        let mut raw = self.read_raw_or_empty();
        raw.insert(
            STATE_KEY.to_string(),
            plist::Value::Dictionary(settings.state.to_dictionary()),
        );
        self.write_raw(raw)
    }

    /// Best-effort save; failures are logged and dropped.
    pub fn save(&self, settings: &Settings) {
        if let Err(e) = self.try_save(settings) {
            warn!("[settings] {}", e);
        }
    }

    /// Replace the whole file with `raw`.
    pub fn write_raw(&self, raw: plist::Dictionary) -> LaunchResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        plist::Value::Dictionary(raw)
            .to_file_xml(&self.path)
            .map_err(|source| LaunchError::SettingsWrite {
                path: self.path.clone(),
                source,
            })?;
        debug!("[settings] Wrote {:?}", self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> SettingsStore {
        SettingsStore::new(dir.path().join("Settings.plist"))
    }

    fn write_plist(store: &SettingsStore, value: plist::Value) {
        value.to_file_xml(store.path()).unwrap();
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.state.interface_type, InterfaceType::Cli);
        assert_eq!(settings.state.terminal_app, TerminalApp::Terminal);
        assert_eq!(settings.state.notebook_type, NotebookType::Classic);
        assert_eq!(settings.state.notebook_dir, "");
        assert!(settings.environment.is_empty());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert_eq!(store.load(), Settings::default());
        assert!(matches!(
            store.try_read_raw(),
            Err(LaunchError::SettingsMissing(_))
        ));
    }

    #[test]
    fn test_corrupt_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), b"<?xml version=\"1.0\"?><plist><dict><key>state").unwrap();
        assert_eq!(store.load(), Settings::default());
        let err = store.try_read_raw().unwrap_err();
        assert!(err.is_ignored());
    }

    #[test]
    fn test_partial_state_merges_over_defaults() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let mut state = plist::Dictionary::new();
        state.insert("notebook_dir".into(), plist::Value::from("/x"));
        let mut root = plist::Dictionary::new();
        root.insert(STATE_KEY.into(), plist::Value::Dictionary(state));
        write_plist(&store, plist::Value::Dictionary(root));

        let settings = store.load();
        assert_eq!(settings.state.notebook_dir, "/x");
        assert_eq!(settings.state.interface_type, InterfaceType::Cli);
        assert_eq!(settings.state.terminal_app, TerminalApp::Terminal);
        assert_eq!(settings.state.notebook_type, NotebookType::Classic);
        assert!(settings.environment.is_empty());
    }

    #[test]
    fn test_unknown_values_fall_back_and_unknown_keys_survive() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let mut state = plist::Dictionary::new();
        state.insert("interface_type".into(), plist::Value::from("telepathy"));
        state.insert("notebook_type".into(), plist::Value::from("Jupyter Lab"));
        state.insert("window_x".into(), plist::Value::from(400i64));
        let mut root = plist::Dictionary::new();
        root.insert(STATE_KEY.into(), plist::Value::Dictionary(state));
        write_plist(&store, plist::Value::Dictionary(root));

        let settings = store.load();
        assert_eq!(settings.state.interface_type, InterfaceType::Cli);
        assert_eq!(settings.state.notebook_type, NotebookType::Lab);
        assert!(settings.state.extra.contains_key("window_x"));

        store.try_save(&settings).unwrap();
        let raw = store.try_read_raw().unwrap();
        let state = raw.get(STATE_KEY).and_then(|v| v.as_dictionary()).unwrap();
        assert_eq!(
            state.get("window_x").and_then(|v| v.as_signed_integer()),
            Some(400)
        );
    }

    #[test]
    fn test_save_preserves_environment_on_disk() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let mut env = plist::Dictionary::new();
        env.insert("PATH".into(), plist::Value::from("/opt/local/bin"));
        let mut root = plist::Dictionary::new();
        root.insert(ENVIRONMENT_KEY.into(), plist::Value::Dictionary(env));
        write_plist(&store, plist::Value::Dictionary(root));

        let mut settings = Settings::default();
        settings.state.interface_type = InterfaceType::Notebook;
        store.try_save(&settings).unwrap();

        let reloaded = store.load();
        assert_eq!(reloaded.state.interface_type, InterfaceType::Notebook);
        assert_eq!(
            reloaded.environment.get("PATH").map(String::as_str),
            Some("/opt/local/bin")
        );
    }

    #[test]
    fn test_round_trip_state() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let mut settings = store.load();
        settings.state.terminal_app = TerminalApp::ITerm;
        settings.state.notebook_dir = "/Users/me/notebooks".into();
        store.save(&settings);

        let first = store.load();
        store.save(&first);
        let second = store.load();
        assert_eq!(first.state, second.state);
        assert_eq!(second.state.terminal_app, TerminalApp::ITerm);
    }

    #[test]
    fn test_save_into_unwritable_location_is_swallowed() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();
        let store = SettingsStore::new(blocker.join("Settings.plist"));
        store.save(&Settings::default());
        assert!(store.try_save(&Settings::default()).unwrap_err().is_ignored());
    }

    #[test]
    fn test_choice_aliases() {
        assert_eq!("shell".parse::<InterfaceType>().unwrap(), InterfaceType::Cli);
        assert_eq!(
            "notebook".parse::<InterfaceType>().unwrap(),
            InterfaceType::Notebook
        );
        assert_eq!("v7".parse::<NotebookType>().unwrap(), NotebookType::V7);
        assert_eq!("iTerm".parse::<TerminalApp>().unwrap(), TerminalApp::ITerm);
        assert!("emacs".parse::<TerminalApp>().is_err());
    }

    #[test]
    fn test_serialized_names_match_disk_vocabulary() {
        assert_eq!(
            serde_json::to_string(&NotebookType::V7).unwrap(),
            "\"Notebook v7\""
        );
        assert_eq!(
            serde_json::to_string(&InterfaceType::Notebook).unwrap(),
            "\"nb\""
        );
    }
}
