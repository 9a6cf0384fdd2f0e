//! sage-launch - settings, environment assembly and process orchestration
//! for the SageMath macOS app.
//!
//! The app's launch window lets the user start Sage's command line in a
//! terminal, the classic Jupyter notebook, or one of the newer notebook
//! front ends. This crate holds everything behind that window:
//!
//! - [`settings`]: the persisted `Settings.plist`
//! - [`search_path`]: the `PATH` handed to Sage
//! - [`app_probe`]: whether helper apps such as iTerm2 are installed
//! - [`server_markers`]: notebook servers already running
//! - [`launch`]: choosing and starting the right process
//! - [`env_editor`]: editing environment overrides

pub mod app_probe;
pub mod context;
pub mod env_editor;
pub mod error;
pub mod launch;
pub mod search_path;
pub mod server_markers;
pub mod settings;
pub mod spawn;
pub mod terminal;

pub use context::AppContext;
pub use error::{Disposition, LaunchError, LaunchResult};
pub use launch::{LaunchMode, LaunchOutcome, Launcher, Prompter};
pub use settings::{InterfaceType, LaunchState, NotebookType, Settings, SettingsStore, TerminalApp};
pub use spawn::{OsSpawner, ProcessSpawner, SpawnRequest};

/// Text of the "About SageMath" dialog.
pub const ABOUT: &str = "\
SageMath is a free open-source mathematics software system licensed under the GPL. \
Please visit sagemath.org for more information about SageMath.

This SageMath app contains a subset of the SageMath binary distribution available \
from sagemath.org. It is packaged as a component of the 3-manifolds project by \
Marc Culler, Nathan Dunfield, and Matthias G\u{f6}rner. It is licensed under the GPL \
License, version 2 or later, and can be downloaded from
https://github.com/3-manifolds/Sage_macOS/releases.

The app is copyright \u{a9} 2021 by Marc Culler, Nathan Dunfield, Matthias G\u{f6}rner and others.";

/// About text headed by the bundle version.
pub fn about_text(version: &str) -> String {
    format!("SageMath {}\n\n{}", version, ABOUT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_about_text() {
        let text = about_text("10.4");
        assert!(text.starts_with("SageMath 10.4\n\n"));
        assert!(text.contains("version 2 or later"));
    }
}
