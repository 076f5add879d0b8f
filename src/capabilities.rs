use crate::utils::errors::ProvisionError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceStatus {
    pub active: bool,
    pub enabled: bool,
}

/// One row of the GPU driver's power report.
#[derive(Debug, Clone, PartialEq)]
pub struct GpuPowerReading {
    pub index: u32,
    pub name: String,
    pub driver_version: String,
    pub power_draw_watts: Option<f64>,
    pub power_limit_watts: Option<f64>,
}

/// OS service manager
#[async_trait]
pub trait ServiceManager: Send + Sync {
    /// Make the manager pick up new or changed unit files
    async fn daemon_reload(&self) -> Result<(), ProvisionError>;

    /// Persist the unit across reboots
    async fn enable(&self, unit: &str) -> Result<(), ProvisionError>;

    async fn disable(&self, unit: &str) -> Result<(), ProvisionError>;

    /// Run the unit now
    async fn start(&self, unit: &str) -> Result<(), ProvisionError>;

    async fn stop(&self, unit: &str) -> Result<(), ProvisionError>;

    async fn status(&self, unit: &str) -> Result<ServiceStatus, ProvisionError>;
}

#[async_trait]
pub trait PackageManager: Send + Sync {
    async fn is_installed(&self, package: &str) -> Result<bool, ProvisionError>;

    async fn install(&self, packages: &[String]) -> Result<(), ProvisionError>;
}

/// System message bus broker
#[async_trait]
pub trait IpcBroker: Send + Sync {
    /// Ask the running broker to re-read its policy files
    async fn reload(&self) -> Result<(), ProvisionError>;
}

/// Read-only facts about the machine, consulted by the preflight pass.
pub trait HostProbe: Send + Sync {
    fn os_family(&self) -> String;

    fn architecture(&self) -> String;

    fn kernel_version(&self) -> Option<String>;

    /// Version string of the C library, e.g. `2.35`
    fn glibc_version(&self) -> Option<String>;

    /// Free bytes on the volume holding `path`
    fn free_space(&self, path: &Path) -> Option<u64>;

    fn find_executable(&self, name: &str) -> Option<PathBuf>;

    fn is_privileged(&self) -> bool;
}

#[async_trait]
pub trait GpuQuery: Send + Sync {
    async fn power_state(&self) -> Result<Vec<GpuPowerReading>, ProvisionError>;
}
