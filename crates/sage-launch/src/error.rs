//! Error types shared by every launcher component.
//!
//! Each error carries a [`Disposition`] so callers (and tests) can tell a
//! quietly ignored failure apart from one the user must see.

use std::path::PathBuf;

/// How the launcher reacts to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Logged and swallowed; the caller falls back to defaults or "absent".
    Ignored,
    /// Reported in a dialog; only the current launch attempt is aborted.
    UserFacing,
    /// Reported, then the process exits with a non-zero status.
    Fatal,
}

/// Result type for launcher operations.
pub type LaunchResult<T> = Result<T, LaunchError>;

/// Errors that can occur while loading settings, probing, or launching.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("settings file {0} does not exist")]
    SettingsMissing(PathBuf),

    #[error("failed to read settings from {path}: {source}")]
    SettingsRead {
        path: PathBuf,
        #[source]
        source: plist::Error,
    },

    #[error("settings file {0} is not a dictionary")]
    SettingsShape(PathBuf),

    #[error("failed to write settings to {path}: {source}")]
    SettingsWrite {
        path: PathBuf,
        #[source]
        source: plist::Error,
    },

    #[error("failed to read bundle info from {path}: {source}")]
    BundleInfo {
        path: PathBuf,
        #[source]
        source: plist::Error,
    },

    #[error("bundle info {0} has no CFBundleShortVersionString")]
    BundleVersionMissing(PathBuf),

    #[error("failed to read runtime directory {path}: {source}")]
    RuntimeDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read marker {path}: {source}")]
    MarkerRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse marker {path}: {source}")]
    MarkerParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to signal process {pid}: {reason}")]
    Signal { pid: i32, reason: String },

    #[error("application probe for {bundle_id} failed: {reason}")]
    Probe { bundle_id: String, reason: String },

    #[error("Please choose or create a folder for your Jupyter notebooks.")]
    NotebookDirEmpty,

    #[error("The folder {0} was not created.")]
    NotebookDirDeclined(PathBuf),

    #[error("Could not create the folder {path}: {source}")]
    NotebookDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Sorry. We do not have permission to read {path}")]
    NotebookDirUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown {kind}: {value}")]
    UnknownChoice { kind: &'static str, value: String },

    #[error("The running Jupyter server was left in place.")]
    ServerStopDeclined,

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{source} Cannot create {path}; SageMath must exit.")]
    Symlink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LaunchError {
    /// Classify the error according to the launcher's failure policy.
    pub fn disposition(&self) -> Disposition {
        match self {
            LaunchError::SettingsMissing(_)
            | LaunchError::SettingsRead { .. }
            | LaunchError::SettingsShape(_)
            | LaunchError::SettingsWrite { .. }
            | LaunchError::RuntimeDir { .. }
            | LaunchError::MarkerRead { .. }
            | LaunchError::MarkerParse { .. }
            | LaunchError::Signal { .. }
            | LaunchError::Probe { .. } => Disposition::Ignored,

            LaunchError::NotebookDirEmpty
            | LaunchError::NotebookDirDeclined(_)
            | LaunchError::NotebookDirCreate { .. }
            | LaunchError::NotebookDirUnreadable { .. }
            | LaunchError::UnknownChoice { .. }
            | LaunchError::ServerStopDeclined
            | LaunchError::Spawn { .. } => Disposition::UserFacing,

            LaunchError::BundleInfo { .. }
            | LaunchError::BundleVersionMissing(_)
            | LaunchError::Symlink { .. } => Disposition::Fatal,
        }
    }

    /// True when the notebook directory could not be used.
    pub fn is_notebook_dir_error(&self) -> bool {
        matches!(
            self,
            LaunchError::NotebookDirEmpty
                | LaunchError::NotebookDirDeclined(_)
                | LaunchError::NotebookDirCreate { .. }
                | LaunchError::NotebookDirUnreadable { .. }
        )
    }

    /// True for errors the launcher swallows after logging.
    pub fn is_ignored(&self) -> bool {
        self.disposition() == Disposition::Ignored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notebook_dir_errors() {
        assert!(LaunchError::NotebookDirEmpty.is_notebook_dir_error());
        assert!(LaunchError::NotebookDirDeclined("/x".into()).is_notebook_dir_error());
        assert!(!LaunchError::ServerStopDeclined.is_notebook_dir_error());
    }

    #[test]
    fn test_dispositions() {
        assert!(LaunchError::SettingsMissing(PathBuf::from("/x")).is_ignored());
        assert_eq!(
            LaunchError::NotebookDirEmpty.disposition(),
            Disposition::UserFacing
        );
        let symlink = LaunchError::Symlink {
            path: PathBuf::from("/var/tmp/sage-10.0-current"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert_eq!(symlink.disposition(), Disposition::Fatal);
    }

    #[test]
    fn test_user_facing_messages() {
        let err = LaunchError::NotebookDirUnreadable {
            path: PathBuf::from("/private/notes"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert_eq!(
            err.to_string(),
            "Sorry. We do not have permission to read /private/notes"
        );
    }
}
