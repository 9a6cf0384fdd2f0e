//! Detect notebook servers through the files they leave in the runtime directory.
//!
//! A running server writes `nbserver-<pid>.json` (classic) or
//! `jpserver-<pid>.json` (jupyter_server) with its pid, URL and token, plus a
//! companion `<stem>-open.html` page that redirects to the authenticated URL.
//! Both are removed on clean shutdown.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{LaunchError, LaunchResult};

/// Pause between the two interrupts sent to a server.
pub const DEFAULT_SHUTDOWN_PAUSE: Duration = Duration::from_secs(2);

fn marker_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(nbserver|jpserver)-([0-9]+)\.json$").expect("valid regex"))
}

fn opener_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(nbserver|jpserver)-([0-9]+)-open\.html$").expect("valid regex")
    })
}

/// On-disk shape of a server marker. Only `pid` is required.
#[derive(Debug, Deserialize)]
struct MarkerFile {
    pid: i32,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default, alias = "root_dir")]
    notebook_dir: Option<String>,
}

/// A notebook server believed to be running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeMarker {
    /// The JSON marker file.
    pub path: PathBuf,
    pub pid: i32,
    pub url: Option<String>,
    pub token: Option<String>,
    pub port: Option<u16>,
    pub notebook_dir: Option<String>,
    /// Companion `-open.html` page, when present.
    pub opener: Option<PathBuf>,
}

impl RuntimeMarker {
    /// What to hand to the OS opener to reach this server.
    ///
    /// The companion page is preferred since it carries the login redirect;
    /// otherwise the URL with its token.
    pub fn open_target(&self) -> Option<String> {
        if let Some(opener) = &self.opener {
            return Some(opener.display().to_string());
        }
        let url = self.url.as_deref()?;
        match self.token.as_deref() {
            Some(token) if !token.is_empty() => {
                let joiner = if url.contains('?') { '&' } else { '?' };
                Some(format!("{}{}token={}", url, joiner, token))
            }
            _ => Some(url.to_string()),
        }
    }
}

/// True if `file_name` follows the server marker naming convention.
pub fn is_marker_name(file_name: &str) -> bool {
    marker_pattern().is_match(file_name)
}

/// Parse one marker file.
pub fn read_marker(path: &Path) -> LaunchResult<RuntimeMarker> {
    let contents = std::fs::read_to_string(path).map_err(|source| LaunchError::MarkerRead {
        path: path.to_path_buf(),
        source,
    })?;
    let file: MarkerFile =
        serde_json::from_str(&contents).map_err(|source| LaunchError::MarkerParse {
            path: path.to_path_buf(),
            source,
        })?;

    let opener = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(|stem| path.with_file_name(format!("{}-open.html", stem)))
        .filter(|candidate| candidate.is_file());

    Ok(RuntimeMarker {
        path: path.to_path_buf(),
        pid: file.pid,
        url: file.url,
        token: file.token,
        port: file.port,
        notebook_dir: file.notebook_dir,
        opener,
    })
}

/// File names in `runtime_dir` matching `pattern`, sorted.
fn matching_files(runtime_dir: &Path, pattern: &Regex) -> LaunchResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(runtime_dir).map_err(|source| LaunchError::RuntimeDir {
        path: runtime_dir.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| pattern.is_match(name))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();
    Ok(paths)
}

/// List running servers, skipping markers that cannot be parsed.
pub fn try_list_servers(runtime_dir: &Path) -> LaunchResult<Vec<RuntimeMarker>> {
    let markers = matching_files(runtime_dir, marker_pattern())?
        .into_iter()
        .filter_map(|path| match read_marker(&path) {
            Ok(marker) => Some(marker),
            Err(e) => {
                debug!("[markers] Skipping {}", e);
                None
            }
        })
        .collect();
    Ok(markers)
}

/// List running servers; an unreadable runtime directory means none.
pub fn list_servers(runtime_dir: &Path) -> Vec<RuntimeMarker> {
    try_list_servers(runtime_dir).unwrap_or_else(|e| {
        debug!("[markers] {}", e);
        Vec::new()
    })
}

/// Companion `-open.html` pages in `runtime_dir`, sorted.
pub fn list_openers(runtime_dir: &Path) -> Vec<PathBuf> {
    matching_files(runtime_dir, opener_pattern()).unwrap_or_else(|e| {
        debug!("[markers] {}", e);
        Vec::new()
    })
}

/// Where to point the OS opener if a classic server is already running.
pub fn reuse_target(runtime_dir: &Path) -> Option<String> {
    if let Some(target) = list_servers(runtime_dir)
        .iter()
        .find_map(RuntimeMarker::open_target)
    {
        return Some(target);
    }
    list_openers(runtime_dir)
        .into_iter()
        .next()
        .map(|path| path.display().to_string())
}

/// Interrupt a server, wait `pause`, and interrupt it again.
///
/// The second interrupt tolerates a process that has already exited.
pub fn try_stop_server(marker: &RuntimeMarker, pause: Duration) -> LaunchResult<()> {
    interrupt(marker.pid)?;
    info!("[markers] Sent interrupt to server pid {}", marker.pid);
    std::thread::sleep(pause);
    match interrupt(marker.pid) {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!("[markers] Second interrupt: {}", e);
            Ok(())
        }
    }
}

/// Best-effort variant of [`try_stop_server`].
pub fn stop_server(marker: &RuntimeMarker, pause: Duration) {
    if let Err(e) = try_stop_server(marker, pause) {
        warn!("[markers] {}", e);
    }
}

#[cfg(unix)]
fn interrupt(pid: i32) -> LaunchResult<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    // kill(0) and negative pids address process groups.
    if pid <= 0 {
        return Err(LaunchError::Signal {
            pid,
            reason: "refusing to signal a process group".to_string(),
        });
    }
    kill(Pid::from_raw(pid), Signal::SIGINT).map_err(|e| LaunchError::Signal {
        pid,
        reason: e.to_string(),
    })
}

#[cfg(not(unix))]
fn interrupt(pid: i32) -> LaunchResult<()> {
    Err(LaunchError::Signal {
        pid,
        reason: "signals are not supported on this platform".to_string(),
    })
}
