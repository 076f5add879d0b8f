use crate::adapters::{Apt, DbusSend, LocalHost, NvidiaSmi, Systemctl};
use crate::capabilities::{GpuQuery, HostProbe, IpcBroker, PackageManager, ServiceManager};
use crate::utils::errors::ProvisionError;
use log::debug;
use std::fs::{self, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Mode given to every configuration file we write.
const CONFIG_FILE_MODE: u32 = 0o644;

/// External tools the provisioning steps drive.
#[derive(Clone)]
pub struct Capabilities {
    pub services: Arc<dyn ServiceManager>,
    pub packages: Arc<dyn PackageManager>,
    pub broker: Arc<dyn IpcBroker>,
    pub host: Arc<dyn HostProbe>,
    pub gpu: Arc<dyn GpuQuery>,
}

impl Capabilities {
    pub fn local() -> Self {
        Self {
            services: Arc::new(Systemctl),
            packages: Arc::new(Apt),
            broker: Arc::new(DbusSend),
            host: Arc::new(LocalHost::default()),
            gpu: Arc::new(NvidiaSmi),
        }
    }
}

/// A file the current run wrote, with the backup taken before it was replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TouchedPath {
    pub path: PathBuf,
    pub backup: Option<PathBuf>,
}

/// The machine being provisioned.
///
/// Every step receives this instead of reaching for ambient state. Paths handed
/// to it are absolute system paths (`/etc/tlp.conf`) and are resolved under
/// `root`, which is `/` in production and a scratch directory in tests.
pub struct SystemState {
    root: PathBuf,
    pub services: Arc<dyn ServiceManager>,
    pub packages: Arc<dyn PackageManager>,
    pub broker: Arc<dyn IpcBroker>,
    pub host: Arc<dyn HostProbe>,
    pub gpu: Arc<dyn GpuQuery>,
    touched: Vec<TouchedPath>,
}

impl SystemState {
    pub fn new(root: impl Into<PathBuf>, capabilities: Capabilities) -> Self {
        Self {
            root: root.into(),
            services: capabilities.services,
            packages: capabilities.packages,
            broker: capabilities.broker,
            host: capabilities.host,
            gpu: capabilities.gpu,
            touched: Vec::new(),
        }
    }

    /// The real machine
    pub fn local() -> Self {
        Self::new("/", Capabilities::local())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path.strip_prefix("/").unwrap_or(path))
    }

    pub fn exists(&self, path: &Path) -> bool {
        self.resolve(path).exists()
    }

    pub fn read_to_string(&self, path: &Path) -> Result<String, ProvisionError> {
        let resolved = self.resolve(path);
        fs::read_to_string(&resolved).map_err(|e| ProvisionError::io(&resolved, e))
    }

    pub fn free_space(&self) -> Option<u64> {
        self.host.free_space(&self.root)
    }

    pub fn touched(&self) -> &[TouchedPath] {
        &self.touched
    }

    fn record(&mut self, path: &Path, backup: Option<PathBuf>) {
        match self.touched.iter_mut().find(|t| t.path == path) {
            Some(entry) => {
                if backup.is_some() {
                    entry.backup = backup;
                }
            }
            None => self.touched.push(TouchedPath {
                path: path.to_path_buf(),
                backup,
            }),
        }
    }

    /// Copy an existing file to `<name>.backup.<stamp>` beside it.
    ///
    /// Returns the backup's system path, or `None` when there was nothing to
    /// keep. An earlier backup with the same stamp is never overwritten; a
    /// numeric suffix is added instead.
    pub fn backup_existing(
        &mut self,
        path: &Path,
        stamp: &str,
    ) -> Result<Option<PathBuf>, ProvisionError> {
        let source = self.resolve(path);
        if !source.is_file() {
            debug!("Nothing to back up at {}", path.display());
            return Ok(None);
        }

        let file_name = path
            .file_name()
            .ok_or_else(|| ProvisionError::Parse(format!("{} has no file name", path.display())))?
            .to_string_lossy()
            .to_string();

        let mut candidate = path.with_file_name(format!("{}.backup.{}", file_name, stamp));
        let mut attempt = 1;
        while self.resolve(&candidate).exists() {
            candidate = path.with_file_name(format!("{}.backup.{}.{}", file_name, stamp, attempt));
            attempt += 1;
        }

        let destination = self.resolve(&candidate);
        fs::copy(&source, &destination).map_err(|e| ProvisionError::io(&destination, e))?;
        log::info!("Backed up {} to {}", path.display(), candidate.display());

        self.record(path, Some(candidate.clone()));
        Ok(Some(candidate))
    }

    /// Replace `path` with `contents` via a temp file in the same directory
    /// and a rename, so readers never see a truncated file.
    pub fn write_atomic(&mut self, path: &Path, contents: &str) -> Result<(), ProvisionError> {
        let target = self.resolve(path);
        let parent = target.parent().ok_or_else(|| {
            ProvisionError::io(
                &target,
                io::Error::new(io::ErrorKind::InvalidInput, "path has no parent directory"),
            )
        })?;
        fs::create_dir_all(parent).map_err(|e| ProvisionError::io(parent, e))?;

        let mut staged = NamedTempFile::new_in(parent).map_err(|e| ProvisionError::io(parent, e))?;
        staged
            .write_all(contents.as_bytes())
            .and_then(|_| staged.as_file().sync_all())
            .map_err(|e| ProvisionError::io(staged.path(), e))?;
        fs::set_permissions(staged.path(), Permissions::from_mode(CONFIG_FILE_MODE))
            .map_err(|e| ProvisionError::io(staged.path(), e))?;
        staged
            .persist(&target)
            .map_err(|e| ProvisionError::io(&target, e.error))?;

        debug!("Wrote {} ({} bytes)", target.display(), contents.len());
        self.record(path, None);
        Ok(())
    }

    /// Delete and recreate a directory, then apply `mode` and `owner`.
    pub fn reset_dir(&mut self, path: &Path, mode: u32, owner: &str) -> Result<(), ProvisionError> {
        let dir = self.resolve(path);
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|e| ProvisionError::io(&dir, e))?;
        }
        fs::create_dir_all(&dir).map_err(|e| ProvisionError::io(&dir, e))?;
        fs::set_permissions(&dir, Permissions::from_mode(mode)).map_err(|e| ProvisionError::io(&dir, e))?;

        let user = users::get_user_by_name(owner).ok_or_else(|| ProvisionError::EnvironmentUnsupported {
            detail: format!("user `{}` does not exist", owner),
            hint: format!("create `{}` or change the runtime directory owner", owner),
        })?;
        std::os::unix::fs::chown(&dir, Some(user.uid()), Some(user.primary_group_id()))
            .map_err(|e| ProvisionError::io(&dir, e))?;

        log::info!("Recreated {} (mode {:o}, owner {})", path.display(), mode, owner);
        self.record(path, None);
        Ok(())
    }
}
