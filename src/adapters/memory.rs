//! In-memory stand-ins for the external tools, so workflows run in tests
//! without root or an init system.

use crate::capabilities::{
    GpuPowerReading, GpuQuery, HostProbe, IpcBroker, PackageManager, ServiceManager, ServiceStatus,
};
use crate::system_state::Capabilities;
use crate::utils::errors::ProvisionError;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn failed(command: String) -> ProvisionError {
    ProvisionError::CommandFailed {
        command,
        code: Some(5),
        stderr: "simulated failure".to_string(),
        hint: "check the in-memory service manager".to_string(),
    }
}

#[derive(Default)]
struct Units {
    known: HashSet<String>,
    enabled: HashSet<String>,
    active: HashSet<String>,
    /// Units whose process exits right after a successful `start`
    dying: HashSet<String>,
    calls: Vec<String>,
}

#[derive(Default)]
pub struct MemoryServiceManager {
    units: Mutex<Units>,
    fail_on: Mutex<Option<String>>,
    hang_on_start: AtomicBool,
}

impl MemoryServiceManager {
    /// Pretend a unit is installed, optionally already running
    pub fn with_unit(&self, unit: &str, active: bool, enabled: bool) {
        let mut units = self.units.lock().unwrap();
        units.known.insert(unit.to_string());
        if active {
            units.active.insert(unit.to_string());
        }
        if enabled {
            units.enabled.insert(unit.to_string());
        }
    }

    /// Make one call, e.g. `"start tlp.service"`, fail
    pub fn fail_on(&self, call: &str) {
        *self.fail_on.lock().unwrap() = Some(call.to_string());
    }

    /// `start` succeeds but the unit is dead by the time anyone asks
    pub fn die_after_start(&self, unit: &str) {
        self.units.lock().unwrap().dying.insert(unit.to_string());
    }

    /// `start` never returns; used to interrupt a run mid-flight
    pub fn hang_on_start(&self) {
        self.hang_on_start.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.units.lock().unwrap().calls.clone()
    }

    pub fn enabled_units(&self) -> HashSet<String> {
        self.units.lock().unwrap().enabled.clone()
    }

    fn call(&self, call: String) -> Result<(), ProvisionError> {
        self.units.lock().unwrap().calls.push(call.clone());
        if self.fail_on.lock().unwrap().as_deref() == Some(call.as_str()) {
            return Err(failed(format!("systemctl {}", call)));
        }
        Ok(())
    }

    fn require_known(&self, unit: &str, call: &str) -> Result<(), ProvisionError> {
        if self.units.lock().unwrap().known.contains(unit) {
            Ok(())
        } else {
            Err(failed(format!("systemctl {} {}", call, unit)))
        }
    }
}

#[async_trait]
impl ServiceManager for MemoryServiceManager {
    async fn daemon_reload(&self) -> Result<(), ProvisionError> {
        self.call("daemon-reload".to_string())
    }

    async fn enable(&self, unit: &str) -> Result<(), ProvisionError> {
        self.call(format!("enable {}", unit))?;
        let mut units = self.units.lock().unwrap();
        units.known.insert(unit.to_string());
        units.enabled.insert(unit.to_string());
        Ok(())
    }

    async fn disable(&self, unit: &str) -> Result<(), ProvisionError> {
        self.call(format!("disable {}", unit))?;
        self.require_known(unit, "disable")?;
        self.units.lock().unwrap().enabled.remove(unit);
        Ok(())
    }

    async fn start(&self, unit: &str) -> Result<(), ProvisionError> {
        self.call(format!("start {}", unit))?;
        if self.hang_on_start.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let mut units = self.units.lock().unwrap();
        units.known.insert(unit.to_string());
        if !units.dying.contains(unit) {
            units.active.insert(unit.to_string());
        }
        Ok(())
    }

    async fn stop(&self, unit: &str) -> Result<(), ProvisionError> {
        self.call(format!("stop {}", unit))?;
        self.require_known(unit, "stop")?;
        self.units.lock().unwrap().active.remove(unit);
        Ok(())
    }

    async fn status(&self, unit: &str) -> Result<ServiceStatus, ProvisionError> {
        let units = self.units.lock().unwrap();
        Ok(ServiceStatus {
            active: units.active.contains(unit),
            enabled: units.enabled.contains(unit),
        })
    }
}

#[derive(Default)]
pub struct MemoryPackageManager {
    installed: Mutex<HashSet<String>>,
    installs: Mutex<Vec<Vec<String>>>,
    fail_install: AtomicBool,
}

impl MemoryPackageManager {
    pub fn preinstall(&self, package: &str) {
        self.installed.lock().unwrap().insert(package.to_string());
    }

    pub fn fail_install(&self) {
        self.fail_install.store(true, Ordering::SeqCst);
    }

    /// Every install request, in order
    pub fn installs(&self) -> Vec<Vec<String>> {
        self.installs.lock().unwrap().clone()
    }
}

#[async_trait]
impl PackageManager for MemoryPackageManager {
    async fn is_installed(&self, package: &str) -> Result<bool, ProvisionError> {
        Ok(self.installed.lock().unwrap().contains(package))
    }

    async fn install(&self, packages: &[String]) -> Result<(), ProvisionError> {
        self.installs.lock().unwrap().push(packages.to_vec());
        if self.fail_install.load(Ordering::SeqCst) {
            return Err(failed(format!("apt-get install -y {}", packages.join(" "))));
        }
        self.installed.lock().unwrap().extend(packages.iter().cloned());
        Ok(())
    }
}

pub struct MemoryBroker {
    reachable: AtomicBool,
    reloads: AtomicUsize,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self {
            reachable: AtomicBool::new(true),
            reloads: AtomicUsize::new(0),
        }
    }
}

impl MemoryBroker {
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IpcBroker for MemoryBroker {
    async fn reload(&self) -> Result<(), ProvisionError> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(failed("dbus-send ReloadConfig".to_string()));
        }
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct StaticHost {
    pub os_family: String,
    pub architecture: String,
    pub kernel_version: Option<String>,
    pub glibc_version: Option<String>,
    pub free_space: Option<u64>,
    pub executables: HashSet<String>,
    pub privileged: bool,
}

impl Default for StaticHost {
    fn default() -> Self {
        Self {
            os_family: "linux".to_string(),
            architecture: "x86_64".to_string(),
            kernel_version: Some("6.8.0-45-generic".to_string()),
            glibc_version: Some("2.35".to_string()),
            free_space: Some(100 * 1024 * 1024 * 1024),
            executables: ["systemctl", "nvidia-smi", "dbus-send", "dpkg-query", "apt-get"]
                .into_iter()
                .map(String::from)
                .collect(),
            privileged: true,
        }
    }
}

impl HostProbe for StaticHost {
    fn os_family(&self) -> String {
        self.os_family.clone()
    }

    fn architecture(&self) -> String {
        self.architecture.clone()
    }

    fn kernel_version(&self) -> Option<String> {
        self.kernel_version.clone()
    }

    fn glibc_version(&self) -> Option<String> {
        self.glibc_version.clone()
    }

    fn free_space(&self, _path: &Path) -> Option<u64> {
        self.free_space
    }

    fn find_executable(&self, name: &str) -> Option<PathBuf> {
        self.executables
            .contains(name)
            .then(|| PathBuf::from("/usr/bin").join(name))
    }

    fn is_privileged(&self) -> bool {
        self.privileged
    }
}

pub struct StaticGpu {
    readings: Mutex<Vec<GpuPowerReading>>,
    fail: AtomicBool,
}

impl Default for StaticGpu {
    fn default() -> Self {
        Self {
            readings: Mutex::new(vec![reading(0, Some(140.0))]),
            fail: AtomicBool::new(false),
        }
    }
}

pub fn reading(index: u32, limit: Option<f64>) -> GpuPowerReading {
    GpuPowerReading {
        index,
        name: "NVIDIA GeForce RTX 4070 Laptop GPU".to_string(),
        driver_version: "550.54.14".to_string(),
        power_draw_watts: Some(9.8),
        power_limit_watts: limit,
    }
}

impl StaticGpu {
    pub fn set_readings(&self, readings: Vec<GpuPowerReading>) {
        *self.readings.lock().unwrap() = readings;
    }

    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl GpuQuery for StaticGpu {
    async fn power_state(&self) -> Result<Vec<GpuPowerReading>, ProvisionError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(failed("nvidia-smi --query-gpu".to_string()));
        }
        Ok(self.readings.lock().unwrap().clone())
    }
}

/// Test-side handles onto the same adapters the `SystemState` holds
pub struct Handles {
    pub services: Arc<MemoryServiceManager>,
    pub packages: Arc<MemoryPackageManager>,
    pub broker: Arc<MemoryBroker>,
    pub gpu: Arc<StaticGpu>,
}

pub fn capabilities_with_host(host: StaticHost) -> (Capabilities, Handles) {
    let handles = Handles {
        services: Arc::new(MemoryServiceManager::default()),
        packages: Arc::new(MemoryPackageManager::default()),
        broker: Arc::new(MemoryBroker::default()),
        gpu: Arc::new(StaticGpu::default()),
    };
    let capabilities = Capabilities {
        services: handles.services.clone(),
        packages: handles.packages.clone(),
        broker: handles.broker.clone(),
        host: Arc::new(host),
        gpu: handles.gpu.clone(),
    };
    (capabilities, handles)
}

pub fn capabilities() -> (Capabilities, Handles) {
    capabilities_with_host(StaticHost::default())
}
