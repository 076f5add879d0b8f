use crate::config::ProvisionConfig;
use crate::preflight::{Requirements, run_preflight};
use crate::service;
use crate::system_state::SystemState;
use crate::utils::confirm::Confirm;
use crate::utils::errors::ProvisionError;
use crate::utils::reporter;
use crate::verify::Verification;
use async_trait::async_trait;
use itertools::Itertools;
use log::{debug, info};
use std::path::PathBuf;

/// Progress of a single provisioning run. Stages only ever move forward;
/// any fatal failure lands in `Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    NotChecked,
    PreflightOk,
    BackedUp,
    StoppedOld,
    ResourcesProvisioned,
    ServiceEnabled,
    ServiceStarted,
    Verified,
    Aborted,
}

/// The daemon-specific half of a workflow. Enabling and starting the
/// service, and the ordering between steps, belong to `Workflow`.
#[async_trait]
pub trait Provisioner: Send + Sync {
    fn name(&self) -> &'static str;

    /// Unit the workflow enables and starts
    fn service(&self) -> &str;

    fn requirements(&self) -> Requirements;

    /// One line per thing that will be rewritten, shown before confirming
    fn planned_changes(&self) -> Vec<String>;

    /// Copy every file about to be replaced; returns the backups taken
    async fn back_up(&self, state: &mut SystemState, stamp: &str) -> Result<Vec<PathBuf>, ProvisionError>;

    /// Best-effort; a previous instance may not exist
    async fn stop_old(&self, state: &mut SystemState);

    /// Directories, policy files, unit files, and a service-manager reload
    async fn provision_resources(&self, state: &mut SystemState) -> Result<(), ProvisionError>;

    /// Query the result. Problems are downgraded to warnings here, never errors.
    async fn verify(&self, state: &SystemState) -> Verification;
}

/// What a completed run hands to the summary.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub workflow: String,
    pub service: String,
    pub stage: Stage,
    pub verification: Verification,
}

/// Drives a `Provisioner` through the stages in order.
pub struct Workflow<P: Provisioner> {
    provisioner: P,
    stage: Stage,
}

impl<P: Provisioner> Workflow<P> {
    pub fn new(provisioner: P) -> Self {
        Self {
            provisioner,
            stage: Stage::NotChecked,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn advance(&mut self, next: Stage) {
        debug!("{}: {:?} -> {:?}", self.provisioner.name(), self.stage, next);
        self.stage = next;
    }

    pub async fn run(
        &mut self,
        config: &ProvisionConfig,
        state: &mut SystemState,
        confirm: &dyn Confirm,
    ) -> Result<RunReport, ProvisionError> {
        if self.stage != Stage::NotChecked {
            return Err(ProvisionError::Declined(format!(
                "{} workflow already ran (stage {:?})",
                self.provisioner.name(),
                self.stage
            )));
        }

        match self.run_stages(config, state, confirm).await {
            Ok(report) => Ok(report),
            Err(err) => {
                info!("{} workflow aborted at {:?}", self.provisioner.name(), self.stage);
                self.advance(Stage::Aborted);
                Err(err)
            }
        }
    }

    async fn run_stages(
        &mut self,
        config: &ProvisionConfig,
        state: &mut SystemState,
        confirm: &dyn Confirm,
    ) -> Result<RunReport, ProvisionError> {
        let name = self.provisioner.name();
        let unit = self.provisioner.service().to_string();

        reporter::header(&format!("{}: preflight checks", name));
        let report = run_preflight(&config.preflight, state, &self.provisioner.requirements());
        report.print();
        report.resolve(confirm).await?;
        self.advance(Stage::PreflightOk);

        let changes = self.provisioner.planned_changes();
        reporter::header(&format!("{}: planned changes", name));
        for change in &changes {
            reporter::info(change);
        }
        if !confirm.confirm(&format!("Apply {} change(s) for {}?", changes.len(), name)).await {
            return Err(ProvisionError::Declined(format!("{} provisioning", name)));
        }

        reporter::header(&format!("{}: backing up existing configuration", name));
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
        let backups = self.provisioner.back_up(state, &stamp).await?;
        if backups.is_empty() {
            reporter::info("Nothing to back up");
        } else {
            reporter::success(&format!(
                "Backed up: {}",
                backups.iter().map(|b| b.display()).join(", ")
            ));
        }
        self.advance(Stage::BackedUp);

        reporter::header(&format!("{}: stopping previous instances", name));
        self.provisioner.stop_old(state).await;
        self.advance(Stage::StoppedOld);

        reporter::header(&format!("{}: provisioning", name));
        self.provisioner.provision_resources(state).await?;
        self.advance(Stage::ResourcesProvisioned);

        service::enable(state, &unit).await?;
        reporter::success(&format!("Enabled {}", unit));
        self.advance(Stage::ServiceEnabled);

        service::start(state, &unit, config.settle_interval).await?;
        reporter::success(&format!("Started {}", unit));
        self.advance(Stage::ServiceStarted);

        reporter::header(&format!("{}: verification", name));
        service::ensure_running(state, &unit).await?;
        reporter::success(&format!("{} is active and enabled", unit));
        let mut verification = self.provisioner.verify(state).await;
        verification
            .detected
            .push(("service state".to_string(), "active, enabled".to_string()));
        for verdict in &verification.verdicts {
            verdict.report();
        }
        self.advance(Stage::Verified);

        Ok(RunReport {
            workflow: name.to_string(),
            service: unit,
            stage: self.stage,
            verification,
        })
    }
}
