//! Operator-editable defaults.
//!
//! There is no config file: edit the `Default` impls below, or use the
//! `with_*` builders (the CLI does this for `--threshold-watts`).

use crate::policy::PowerPolicy;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PreflightConfig {
    /// The only OS family the tool runs on
    pub supported_os: String,
    pub supported_archs: Vec<String>,
    /// Minimum glibc, compared numerically
    pub glibc_floor: String,
    /// Free bytes required on the configuration volume
    pub min_free_bytes: u64,
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            supported_os: "linux".to_string(),
            supported_archs: vec!["x86_64".to_string(), "aarch64".to_string()],
            glibc_floor: "2.31".to_string(),
            min_free_bytes: 1024 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CpuConfig {
    pub packages: Vec<String>,
    pub service: String,
    /// Daemons that fight over the same knobs; stopped best-effort
    pub conflicting_services: Vec<String>,
    pub policy_path: PathBuf,
    pub policy: PowerPolicy,
    pub governor_path: PathBuf,
    pub power_supply_dir: PathBuf,
    pub required_tools: Vec<String>,
    pub recommended_tools: Vec<String>,
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            packages: vec!["tlp".to_string(), "tlp-rdw".to_string()],
            service: "tlp.service".to_string(),
            conflicting_services: vec!["power-profiles-daemon.service".to_string()],
            policy_path: PathBuf::from("/etc/tlp.conf"),
            policy: PowerPolicy::default(),
            governor_path: PathBuf::from("/sys/devices/system/cpu/cpu0/cpufreq/scaling_governor"),
            power_supply_dir: PathBuf::from("/sys/class/power_supply"),
            // Checked up front: stop_old retires the conflicting daemons before
            // packages are installed.
            required_tools: vec![
                "systemctl".to_string(),
                "dpkg-query".to_string(),
                "apt-get".to_string(),
            ],
            recommended_tools: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GpuConfig {
    pub vendor_binary: PathBuf,
    pub service: String,
    pub unit_path: PathBuf,
    pub bus_name: String,
    pub ipc_policy_path: PathBuf,
    pub runtime_dir: PathBuf,
    pub runtime_dir_mode: u32,
    pub runtime_dir_owner: String,
    /// Power cap at or above which the daemon is considered effective
    pub power_cap_threshold_watts: f64,
    pub required_tools: Vec<String>,
    pub recommended_tools: Vec<String>,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            vendor_binary: PathBuf::from("/usr/bin/nvidia-powerd"),
            service: "nvidia-powerd.service".to_string(),
            unit_path: PathBuf::from("/etc/systemd/system/nvidia-powerd.service"),
            bus_name: "nvidia.powerd.server".to_string(),
            ipc_policy_path: PathBuf::from("/etc/dbus-1/system.d/nvidia-dbus.conf"),
            runtime_dir: PathBuf::from("/var/log/nvtopps"),
            runtime_dir_mode: 0o755,
            runtime_dir_owner: "root".to_string(),
            power_cap_threshold_watts: 140.0,
            required_tools: vec!["systemctl".to_string(), "nvidia-smi".to_string()],
            recommended_tools: vec!["dbus-send".to_string()],
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    pub preflight: PreflightConfig,
    pub cpu: CpuConfig,
    pub gpu: GpuConfig,
    /// Pause after `start` before verification queries the daemon
    pub settle_interval: Duration,
    pub summary_path: PathBuf,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            preflight: PreflightConfig::default(),
            cpu: CpuConfig::default(),
            gpu: GpuConfig::default(),
            settle_interval: Duration::from_secs(2),
            summary_path: PathBuf::from("/var/log/powerprov/install-summary.txt"),
        }
    }
}

impl ProvisionConfig {
    pub fn with_power_cap_threshold(mut self, watts: f64) -> Self {
        self.gpu.power_cap_threshold_watts = watts;
        self
    }

    pub fn with_settle_interval(mut self, interval: Duration) -> Self {
        self.settle_interval = interval;
        self
    }
}
