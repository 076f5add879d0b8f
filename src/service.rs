use crate::capabilities::ServiceStatus;
use crate::system_state::SystemState;
use crate::utils::errors::ProvisionError;
use log::{debug, info, warn};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    OnFailure,
}

impl RestartPolicy {
    fn as_str(self) -> &'static str {
        match self {
            RestartPolicy::OnFailure => "on-failure",
        }
    }
}

/// Declarative service descriptor for the OS service manager.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceUnit {
    pub description: String,
    /// Ordering and hard dependency, e.g. the message bus
    pub requires: Vec<String>,
    pub bus_name: Option<String>,
    pub exec_start: String,
    pub restart: RestartPolicy,
    pub restart_sec: u32,
    /// Hardening directives, rendered verbatim
    pub sandboxing: Vec<(String, String)>,
    pub wanted_by: String,
}

impl ServiceUnit {
    /// Rendering is stable so rewriting the unit on every run is idempotent.
    pub fn render(&self) -> String {
        let mut out = String::from("[Unit]\n");
        out.push_str(&format!("Description={}\n", self.description));
        for dependency in &self.requires {
            out.push_str(&format!("After={}\n", dependency));
            out.push_str(&format!("Requires={}\n", dependency));
        }

        out.push_str("\n[Service]\n");
        match &self.bus_name {
            Some(bus_name) => {
                out.push_str("Type=dbus\n");
                out.push_str(&format!("BusName={}\n", bus_name));
            }
            None => out.push_str("Type=simple\n"),
        }
        out.push_str(&format!("ExecStart={}\n", self.exec_start));
        out.push_str(&format!("Restart={}\n", self.restart.as_str()));
        out.push_str(&format!("RestartSec={}\n", self.restart_sec));
        for (key, value) in &self.sandboxing {
            out.push_str(&format!("{}={}\n", key, value));
        }

        out.push_str("\n[Install]\n");
        out.push_str(&format!("WantedBy={}\n", self.wanted_by));
        out
    }
}

/// Where to look when a unit misbehaves
pub fn journal_hint(unit: &str) -> String {
    format!("inspect `journalctl -u {} -b --no-pager` and `systemctl status {}`", unit, unit)
}

/// Write the unit file and make the service manager aware of it.
pub async fn install_unit(
    state: &mut SystemState,
    path: &Path,
    unit: &ServiceUnit,
) -> Result<(), ProvisionError> {
    info!("Writing service unit {}", path.display());
    state.write_atomic(path, &unit.render())?;
    daemon_reload(state).await
}

pub async fn daemon_reload(state: &SystemState) -> Result<(), ProvisionError> {
    debug!("Reloading service manager");
    state.services.daemon_reload().await
}

pub async fn enable(state: &SystemState, name: &str) -> Result<(), ProvisionError> {
    info!("Enabling {}", name);
    state.services.enable(name).await
}

/// Start the service, then give it `settle` to come up before anyone
/// queries it.
pub async fn start(state: &SystemState, name: &str, settle: Duration) -> Result<(), ProvisionError> {
    info!("Starting {}", name);
    state.services.start(name).await?;
    if !settle.is_zero() {
        debug!("Waiting {:?} for {} to settle", settle, name);
        tokio::time::sleep(settle).await;
    }
    Ok(())
}

/// Ask the service manager how the unit is doing once it has settled. A
/// unit that died after `start` or is not enabled fails the run.
pub async fn ensure_running(state: &SystemState, name: &str) -> Result<ServiceStatus, ProvisionError> {
    let status = state.services.status(name).await?;
    debug!("{}: active={} enabled={}", name, status.active, status.enabled);
    if status.active && status.enabled {
        Ok(status)
    } else {
        Err(ProvisionError::ServiceNotRunning {
            unit: name.to_string(),
            active: status.active,
            enabled: status.enabled,
            hint: journal_hint(name),
        })
    }
}

/// The service may never have existed; failure is expected and ignored.
pub async fn stop_best_effort(state: &SystemState, name: &str) {
    if let Err(err) = state.services.stop(name).await {
        warn!("Ignoring failure to stop {}: {}", name, err);
    }
}

pub async fn disable_best_effort(state: &SystemState, name: &str) {
    if let Err(err) = state.services.disable(name).await {
        warn!("Ignoring failure to disable {}: {}", name, err);
    }
}
