use crate::capabilities::{ServiceManager, ServiceStatus};
use crate::service::journal_hint;
use crate::utils::command::{run_checked, run_status};
use crate::utils::errors::ProvisionError;
use async_trait::async_trait;

/// `systemctl` on the running system
pub struct Systemctl;

#[async_trait]
impl ServiceManager for Systemctl {
    async fn daemon_reload(&self) -> Result<(), ProvisionError> {
        run_checked(
            "systemctl",
            &["daemon-reload"],
            &[],
            "inspect `journalctl -b -u systemd --no-pager` for unit parse errors",
        )
        .await
        .map(|_| ())
    }

    async fn enable(&self, unit: &str) -> Result<(), ProvisionError> {
        run_checked("systemctl", &["enable", unit], &[], &journal_hint(unit)).await.map(|_| ())
    }

    async fn disable(&self, unit: &str) -> Result<(), ProvisionError> {
        run_checked("systemctl", &["disable", unit], &[], &journal_hint(unit)).await.map(|_| ())
    }

    async fn start(&self, unit: &str) -> Result<(), ProvisionError> {
        run_checked("systemctl", &["start", unit], &[], &journal_hint(unit)).await.map(|_| ())
    }

    async fn stop(&self, unit: &str) -> Result<(), ProvisionError> {
        run_checked("systemctl", &["stop", unit], &[], &journal_hint(unit)).await.map(|_| ())
    }

    async fn status(&self, unit: &str) -> Result<ServiceStatus, ProvisionError> {
        let active = run_status("systemctl", &["is-active", "--quiet", unit]).await?;
        let enabled = run_status("systemctl", &["is-enabled", "--quiet", unit]).await?;
        Ok(ServiceStatus { active, enabled })
    }
}
