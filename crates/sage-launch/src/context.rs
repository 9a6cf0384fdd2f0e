//! Paths the launcher works with, resolved once at startup.
//!
//! The launcher executable sits in `SageMath.app/Contents/MacOS/`; everything
//! else is found relative to `Contents`:
//!
//! - `Contents/Info.plist`: bundle metadata, including the version
//! - `Contents/Frameworks/Sage.framework/Versions/Current`: the Sage install
//!
//! Per-user state goes to `~/Library/Application Support/SageMath`.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::error::{LaunchError, LaunchResult};
use crate::settings::SettingsStore;

/// Environment variable that overrides the bundle `Contents` directory.
pub const BUNDLE_ENV_VAR: &str = "SAGE_APP_BUNDLE";

/// Variable telling Jupyter where to put its runtime files.
pub const RUNTIME_DIR_VAR: &str = "JUPYTER_RUNTIME_DIR";

/// Info.plist key holding the user-visible version.
const VERSION_KEY: &str = "CFBundleShortVersionString";

/// Small application context handed to every launcher operation.
#[derive(Debug, Clone)]
pub struct AppContext {
    contents_dir: PathBuf,
    home_dir: PathBuf,
    link_root: PathBuf,
}

impl AppContext {
    pub fn new(contents_dir: impl Into<PathBuf>, home_dir: impl Into<PathBuf>) -> Self {
        Self {
            contents_dir: contents_dir.into(),
            home_dir: home_dir.into(),
            link_root: PathBuf::from("/var/tmp"),
        }
    }

    /// Resolve the context for the running executable.
    ///
    /// `bundle` (or `SAGE_APP_BUNDLE`) replaces the `Contents` directory that
    /// would otherwise be derived from the executable's location.
    pub fn discover(bundle: Option<PathBuf>) -> std::io::Result<Self> {
        let contents_dir = match bundle.or_else(|| std::env::var_os(BUNDLE_ENV_VAR).map(PathBuf::from)) {
            Some(dir) => dir,
            None => {
                let exe = std::env::current_exe()?;
                exe.parent()
                    .and_then(Path::parent)
                    .map(Path::to_path_buf)
                    .ok_or_else(|| {
                        std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            format!("{} is not inside an app bundle", exe.display()),
                        )
                    })?
            }
        };
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"));
        debug!("[bundle] Contents at {:?}, home at {:?}", contents_dir, home_dir);
        Ok(Self::new(contents_dir, home_dir))
    }

    /// Put the version symlink under `root` instead of `/var/tmp`.
    pub fn with_link_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.link_root = root.into();
        self
    }

    pub fn contents_dir(&self) -> &Path {
        &self.contents_dir
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    pub fn info_plist(&self) -> PathBuf {
        self.contents_dir.join("Info.plist")
    }

    pub fn framework_dir(&self) -> PathBuf {
        self.contents_dir.join("Frameworks")
    }

    /// The active Sage installation inside the framework.
    pub fn current_dir(&self) -> PathBuf {
        self.framework_dir()
            .join("Sage.framework")
            .join("Versions")
            .join("Current")
    }

    /// The `sage` command line program.
    pub fn sage_executable(&self) -> PathBuf {
        self.current_dir().join("venv").join("bin").join("sage")
    }

    /// Interpreter of the venv holding the alternative notebook front ends.
    pub fn notebook_python(&self) -> PathBuf {
        self.current_dir()
            .join("notebook_venv")
            .join("bin")
            .join("python3")
    }

    pub fn support_dir(&self) -> PathBuf {
        self.home_dir
            .join("Library")
            .join("Application Support")
            .join("SageMath")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.support_dir().join("Settings.plist")
    }

    pub fn settings_store(&self) -> SettingsStore {
        SettingsStore::new(self.settings_path())
    }

    /// Where launched servers write their marker files.
    pub fn runtime_dir(&self) -> PathBuf {
        self.support_dir().join("Jupyter")
    }

    /// Read the bundle version from `Info.plist`.
    pub fn read_version(&self) -> LaunchResult<String> {
        let path = self.info_plist();
        let info = plist::Value::from_file(&path).map_err(|source| LaunchError::BundleInfo {
            path: path.clone(),
            source,
        })?;
        info.as_dictionary()
            .and_then(|dict| dict.get(VERSION_KEY))
            .and_then(|value| value.as_string())
            .map(str::to_string)
            .ok_or(LaunchError::BundleVersionMissing(path))
    }

    /// Version-stable path to the installation, used by Sage's own scripts.
    pub fn version_link(&self, version: &str) -> PathBuf {
        self.link_root.join(format!("sage-{}-current", version))
    }

    /// Make sure [`Self::version_link`] exists, creating it if needed.
    pub fn ensure_version_link(&self, version: &str) -> LaunchResult<PathBuf> {
        let link = self.version_link(version);
        if link.is_symlink() {
            debug!("[bundle] {:?} already exists", link);
            return Ok(link);
        }
        create_symlink(&self.current_dir(), &link).map_err(|source| LaunchError::Symlink {
            path: link.clone(),
            source,
        })?;
        info!("[bundle] Linked {:?} -> {:?}", link, self.current_dir());
        Ok(link)
    }

    /// Create the runtime directory and move to the home directory.
    ///
    /// Both steps are best effort.
    pub fn prepare(&self) {
        let runtime_dir = self.runtime_dir();
        if let Err(e) = create_runtime_dir(&runtime_dir) {
            warn!("[bundle] Failed to create {:?}: {}", runtime_dir, e);
        }
        if let Err(e) = std::env::set_current_dir(&self.home_dir) {
            warn!("[bundle] Failed to enter {:?}: {}", self.home_dir, e);
        }
    }
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn create_symlink(_target: &Path, _link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "symbolic links are not supported on this platform",
    ))
}

#[cfg(unix)]
fn create_runtime_dir(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o755)
        .create(path)
}

#[cfg(not(unix))]
fn create_runtime_dir(path: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Disposition;
    use tempfile::TempDir;

    fn write_info_plist(ctx: &AppContext, version: Option<&str>) {
        let mut dict = plist::Dictionary::new();
        dict.insert("CFBundleName".into(), plist::Value::from("SageMath"));
        if let Some(version) = version {
            dict.insert(VERSION_KEY.into(), plist::Value::from(version));
        }
        std::fs::create_dir_all(ctx.contents_dir()).unwrap();
        plist::Value::Dictionary(dict)
            .to_file_xml(ctx.info_plist())
            .unwrap();
    }

    #[test]
    fn test_layout() {
        let ctx = AppContext::new("/Applications/SageMath.app/Contents", "/Users/me");
        assert_eq!(
            ctx.sage_executable(),
            PathBuf::from(
                "/Applications/SageMath.app/Contents/Frameworks/Sage.framework/Versions/Current/venv/bin/sage"
            )
        );
        assert!(ctx.notebook_python().ends_with("notebook_venv/bin/python3"));
        assert_eq!(
            ctx.settings_path(),
            PathBuf::from("/Users/me/Library/Application Support/SageMath/Settings.plist")
        );
        assert_eq!(
            ctx.runtime_dir(),
            PathBuf::from("/Users/me/Library/Application Support/SageMath/Jupyter")
        );
        assert_eq!(
            ctx.version_link("10.4"),
            PathBuf::from("/var/tmp/sage-10.4-current")
        );
    }

    #[test]
    fn test_read_version() {
        let tmp = TempDir::new().unwrap();
        let ctx = AppContext::new(tmp.path().join("Contents"), tmp.path());
        write_info_plist(&ctx, Some("10.4"));
        assert_eq!(ctx.read_version().unwrap(), "10.4");
    }

    #[test]
    fn test_missing_version_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let ctx = AppContext::new(tmp.path().join("Contents"), tmp.path());
        assert_eq!(
            ctx.read_version().unwrap_err().disposition(),
            Disposition::Fatal
        );
        write_info_plist(&ctx, None);
        assert!(matches!(
            ctx.read_version(),
            Err(LaunchError::BundleVersionMissing(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_ensure_version_link() {
        let tmp = TempDir::new().unwrap();
        let ctx = AppContext::new(tmp.path().join("Contents"), tmp.path())
            .with_link_root(tmp.path().join("links"));
        std::fs::create_dir_all(ctx.current_dir()).unwrap();
        std::fs::create_dir_all(tmp.path().join("links")).unwrap();

        let link = ctx.ensure_version_link("10.4").unwrap();
        assert!(link.is_symlink());
        assert_eq!(std::fs::read_link(&link).unwrap(), ctx.current_dir());

        // A second call finds the existing link.
        assert_eq!(ctx.ensure_version_link("10.4").unwrap(), link);
    }

    #[cfg(unix)]
    #[test]
    fn test_link_failure_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let ctx = AppContext::new(tmp.path().join("Contents"), tmp.path())
            .with_link_root(tmp.path().join("missing").join("root"));
        let err = ctx.ensure_version_link("10.4").unwrap_err();
        assert_eq!(err.disposition(), Disposition::Fatal);
        assert!(err.to_string().contains("SageMath must exit"));
    }

    #[test]
    #[serial_test::serial]
    fn test_prepare_creates_runtime_dir() {
        let tmp = TempDir::new().unwrap();
        let ctx = AppContext::new(tmp.path().join("Contents"), tmp.path());
        let original = std::env::current_dir().unwrap();
        ctx.prepare();
        std::env::set_current_dir(original).unwrap();
        assert!(ctx.runtime_dir().is_dir());
    }
}
