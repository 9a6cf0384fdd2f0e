//! Editing the persisted environment overrides.
//!
//! An [`EnvironmentEditor`] is one editing session: it loads the settings
//! file, changes the `environment` grouping in memory, and writes it back on
//! [`EnvironmentEditor::done`]. Dropping the editor discards the changes.

use log::{info, warn};

use crate::error::{LaunchError, LaunchResult};
use crate::launch::Prompter;
use crate::settings::{SettingsStore, ENVIRONMENT_KEY};

const DISCARD_WARNING: &str = "Closing the window will cause your changes to be lost.";

/// An in-progress edit of the environment overrides.
#[derive(Debug)]
pub struct EnvironmentEditor {
    store: SettingsStore,
    raw: plist::Dictionary,
    /// Variables in display order.
    vars: Vec<(String, String)>,
    modified: bool,
}

impl EnvironmentEditor {
    /// Start a session. A corrupt settings file is removed and the session
    /// starts from an empty store.
    pub fn open(store: SettingsStore) -> Self {
        let raw = match store.try_read_raw() {
            Ok(raw) => raw,
            Err(LaunchError::SettingsMissing(_)) => plist::Dictionary::new(),
            Err(e) => {
                warn!("[env-editor] {}; starting over", e);
                if let Err(e) = std::fs::remove_file(store.path()) {
                    warn!("[env-editor] Failed to remove {:?}: {}", store.path(), e);
                }
                plist::Dictionary::new()
            }
        };

        let vars = raw
            .get(ENVIRONMENT_KEY)
            .and_then(|v| v.as_dictionary())
            .map(|env| {
                env.iter()
                    .filter_map(|(name, value)| {
                        value.as_string().map(|v| (name.clone(), v.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            store,
            raw,
            vars,
            modified: false,
        }
    }

    /// Variable names in display order.
    pub fn names(&self) -> Vec<&str> {
        self.vars.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value.as_str())
    }

    /// All variables in display order.
    pub fn variables(&self) -> &[(String, String)] {
        &self.vars
    }

    /// Add a variable with an empty value. Existing variables are untouched.
    pub fn add(&mut self, name: &str) {
        if self.get(name).is_none() {
            self.vars.push((name.to_string(), String::new()));
            self.modified = true;
        }
    }

    /// Set a variable, adding it if needed. Surrounding whitespace is dropped.
    pub fn set(&mut self, name: &str, value: &str) {
        let value = value.trim().to_string();
        self.modified = true;
        match self.vars.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value,
            None => self.vars.push((name.to_string(), value)),
        }
    }

    /// Remove a variable; returns whether it existed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.vars.len();
        self.vars.retain(|(n, _)| n != name);
        let removed = self.vars.len() != before;
        self.modified |= removed;
        removed
    }

    /// Whether anything changed since the session opened.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Discard the session. Unsaved changes are only dropped after the user
    /// confirms; otherwise the editor is handed back.
    pub fn close(self, prompter: &mut dyn Prompter) -> Option<Self> {
        if !self.modified || prompter.ask_ok_cancel(DISCARD_WARNING) {
            return None;
        }
        Some(self)
    }

    /// Write the overrides back, keeping every other grouping on disk.
    pub fn done(mut self) -> LaunchResult<()> {
        self.vars.retain(|(name, _)| !name.is_empty());
        let environment: plist::Dictionary = self
            .vars
            .iter()
            .map(|(name, value)| (name.clone(), plist::Value::from(value.clone())))
            .collect();
        let count = environment.len();
        self.raw.insert(
            ENVIRONMENT_KEY.to_string(),
            plist::Value::Dictionary(environment),
        );
        self.store.write_raw(self.raw)?;
        info!("[env-editor] Saved {} variables", count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{InterfaceType, Settings};
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> SettingsStore {
        SettingsStore::new(dir.path().join("Settings.plist"))
    }

    #[test]
    fn test_edit_and_save() {
        let dir = TempDir::new().unwrap();
        let mut editor = EnvironmentEditor::open(store(&dir));
        assert!(editor.names().is_empty());

        editor.add("PATH");
        editor.set("PATH", "  /opt/local/bin  \n");
        editor.set("MAXIMA_USERDIR", "/tmp/maxima");
        editor.add("");
        editor.done().unwrap();

        let settings = store(&dir).load();
        assert_eq!(settings.environment["PATH"], "/opt/local/bin");
        assert_eq!(settings.environment["MAXIMA_USERDIR"], "/tmp/maxima");
        assert!(!settings.environment.contains_key(""));
    }

    #[test]
    fn test_keeps_order_and_state() {
        let dir = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.state.interface_type = InterfaceType::Notebook;
        store(&dir).try_save(&settings).unwrap();

        let mut editor = EnvironmentEditor::open(store(&dir));
        editor.set("ZED", "1");
        editor.set("ALPHA", "2");
        editor.done().unwrap();

        let editor = EnvironmentEditor::open(store(&dir));
        assert_eq!(editor.names(), vec!["ZED", "ALPHA"]);
        assert_eq!(
            store(&dir).load().state.interface_type,
            InterfaceType::Notebook
        );
    }

    #[test]
    fn test_remove_and_discard() {
        let dir = TempDir::new().unwrap();
        let mut editor = EnvironmentEditor::open(store(&dir));
        editor.set("A", "1");
        editor.set("B", "2");
        editor.done().unwrap();

        let mut editor = EnvironmentEditor::open(store(&dir));
        assert!(editor.remove("A"));
        assert!(!editor.remove("A"));
        drop(editor);

        // Nothing was written by the discarded session.
        assert_eq!(store(&dir).load().environment.len(), 2);
    }

    struct Answer {
        ok: bool,
        asked: Vec<String>,
    }

    impl Answer {
        fn new(ok: bool) -> Self {
            Self {
                ok,
                asked: Vec::new(),
            }
        }
    }

    impl Prompter for Answer {
        fn show_warning(&mut self, _message: &str) {}
        fn show_error(&mut self, _message: &str) {}
        fn ask_yes_no(&mut self, _message: &str) -> bool {
            panic!("closing the editor asks OK/Cancel");
        }
        fn ask_ok_cancel(&mut self, message: &str) -> bool {
            self.asked.push(message.to_string());
            self.ok
        }
    }

    #[test]
    fn test_close_asks_only_when_modified() {
        let dir = TempDir::new().unwrap();
        let editor = EnvironmentEditor::open(store(&dir));
        let mut cancel = Answer::new(false);
        assert!(editor.close(&mut cancel).is_none());
        assert!(cancel.asked.is_empty());

        let mut editor = EnvironmentEditor::open(store(&dir));
        editor.set("A", "1");
        let editor = editor.close(&mut cancel).unwrap();
        assert_eq!(
            cancel.asked,
            vec!["Closing the window will cause your changes to be lost.".to_string()]
        );
        assert_eq!(editor.get("A"), Some("1"));
        assert!(editor.close(&mut Answer::new(true)).is_none());
        assert!(!store(&dir).path().exists());
    }

    #[test]
    fn test_corrupt_store_is_reset() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        std::fs::write(store.path(), b"<?xml version=\"1.0\"?><plist><dict><key>").unwrap();

        let editor = EnvironmentEditor::open(store.clone());
        assert!(editor.names().is_empty());
        assert!(!store.path().exists());
    }
}
