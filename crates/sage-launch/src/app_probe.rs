//! Ask macOS whether a helper application is installed.

use std::io::Write;
use std::process::{Command, Stdio};

use log::debug;

use crate::error::{LaunchError, LaunchResult};

/// Bundle identifier of iTerm2.
pub const ITERM_BUNDLE_ID: &str = "com.googlecode.iterm2";

/// Yes/no oracle for installed applications.
pub trait AppProbe {
    /// Look up `bundle_id`, reporting why the lookup failed if it did.
    fn try_is_installed(&self, bundle_id: &str) -> LaunchResult<bool>;

    /// Look up `bundle_id`; any failure counts as "not installed".
    fn is_installed(&self, bundle_id: &str) -> bool {
        match self.try_is_installed(bundle_id) {
            Ok(found) => found,
            Err(e) => {
                debug!("[probe] {}", e);
                false
            }
        }
    }
}

/// Probe backed by a Finder lookup through `osascript`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsaScriptProbe;

/// AppleScript that returns `true` when Finder can resolve the bundle id.
pub fn find_app_script(bundle_id: &str) -> String {
    format!(
        r#"set appExists to false
try
    tell application "Finder" to get application file id "{}"
    set appExists to true
end try
return appExists
"#,
        bundle_id.replace('"', "")
    )
}

impl AppProbe for OsaScriptProbe {
    fn try_is_installed(&self, bundle_id: &str) -> LaunchResult<bool> {
        let probe_err = |reason: String| LaunchError::Probe {
            bundle_id: bundle_id.to_string(),
            reason,
        };

        let mut child = Command::new("osascript")
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| probe_err(format!("failed to run osascript: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(find_app_script(bundle_id).as_bytes())
                .map_err(|e| probe_err(format!("failed to send script: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| probe_err(format!("osascript did not finish: {}", e)))?;

        if !output.status.success() {
            return Err(probe_err(format!(
                "osascript exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim() == "true")
    }
}
