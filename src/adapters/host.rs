use crate::capabilities::HostProbe;
use log::debug;
use std::path::{Path, PathBuf};
use sysinfo::{Disks, System};

/// Facts about the machine this process runs on
#[derive(Default)]
pub struct LocalHost;

/// Pull the version out of `ldd --version`, whose first line ends with it:
/// `ldd (Ubuntu GLIBC 2.35-0ubuntu3.8) 2.35`
pub fn parse_glibc_version(output: &str) -> Option<String> {
    let candidate = output.lines().next()?.split_whitespace().last()?;
    candidate
        .chars()
        .next()
        .filter(|c| c.is_ascii_digit())
        .map(|_| candidate.to_string())
}

/// Pick the disk whose mount point is the longest prefix of `path`.
fn volume_for<'a>(mounts: impl Iterator<Item = (&'a Path, u64)>, path: &Path) -> Option<u64> {
    mounts
        .filter(|(mount, _)| path.starts_with(mount))
        .max_by_key(|(mount, _)| mount.components().count())
        .map(|(_, available)| available)
}

impl HostProbe for LocalHost {
    fn os_family(&self) -> String {
        std::env::consts::OS.to_string()
    }

    fn architecture(&self) -> String {
        let arch: Option<String> = System::cpu_arch().into();
        arch.unwrap_or_else(|| std::env::consts::ARCH.to_string())
    }

    fn kernel_version(&self) -> Option<String> {
        System::kernel_version()
    }

    fn glibc_version(&self) -> Option<String> {
        let output = std::process::Command::new("ldd").arg("--version").output().ok()?;
        let version = parse_glibc_version(&String::from_utf8_lossy(&output.stdout));
        debug!("Detected glibc {:?}", version);
        version
    }

    fn free_space(&self, path: &Path) -> Option<u64> {
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let disks = Disks::new_with_refreshed_list();
        volume_for(
            disks.list().iter().map(|disk| (disk.mount_point(), disk.available_space())),
            &path,
        )
    }

    fn find_executable(&self, name: &str) -> Option<PathBuf> {
        which::which(name).ok()
    }

    fn is_privileged(&self) -> bool {
        users::get_effective_uid() == 0
    }
}
