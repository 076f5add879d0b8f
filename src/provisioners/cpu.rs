use crate::config::CpuConfig;
use crate::policy::{self, PowerSource, governor_key, parse_assignments};
use crate::preflight::Requirements;
use crate::service;
use crate::system_state::SystemState;
use crate::utils::errors::ProvisionError;
use crate::verify::{ObservedPowerState, Verdict, Verification, classify_governor};
use crate::workflow::Provisioner;
use async_trait::async_trait;
use itertools::Itertools;
use log::{debug, info};
use std::fs;
use std::path::PathBuf;

/// Installs the CPU power-policy daemon and its governor policy.
pub struct CpuPowerPolicy {
    pub config: CpuConfig,
}

impl CpuPowerPolicy {
    pub fn new(config: CpuConfig) -> Self {
        Self { config }
    }

    /// Mains supply online means AC. A machine with no mains supply listed
    /// at all (a desktop without power_supply entries) is treated as AC too.
    fn power_source(&self, state: &SystemState) -> PowerSource {
        let dir = state.resolve(&self.config.power_supply_dir);
        let Ok(entries) = fs::read_dir(&dir) else {
            return PowerSource::Ac;
        };

        let mut saw_mains = false;
        for entry in entries.flatten() {
            let supply = entry.path();
            let kind = fs::read_to_string(supply.join("type")).unwrap_or_default();
            if kind.trim() != "Mains" {
                continue;
            }
            saw_mains = true;
            if fs::read_to_string(supply.join("online")).unwrap_or_default().trim() == "1" {
                return PowerSource::Ac;
            }
        }

        if saw_mains { PowerSource::Battery } else { PowerSource::Ac }
    }
}

#[async_trait]
impl Provisioner for CpuPowerPolicy {
    fn name(&self) -> &'static str {
        "cpu-power-policy"
    }

    fn service(&self) -> &str {
        &self.config.service
    }

    fn requirements(&self) -> Requirements {
        Requirements {
            required_tools: self.config.required_tools.clone(),
            recommended_tools: self.config.recommended_tools.clone(),
            vendor_binary: None,
        }
    }

    fn planned_changes(&self) -> Vec<String> {
        let mut changes = vec![
            format!("install packages: {}", self.config.packages.iter().join(", ")),
            format!("rewrite {}", self.config.policy_path.display()),
        ];
        changes.extend(
            self.config
                .conflicting_services
                .iter()
                .map(|svc| format!("stop and disable {}", svc)),
        );
        changes.push(format!("enable and start {}", self.config.service));
        changes
    }

    async fn back_up(&self, state: &mut SystemState, stamp: &str) -> Result<Vec<PathBuf>, ProvisionError> {
        Ok(state.backup_existing(&self.config.policy_path, stamp)?.into_iter().collect())
    }

    async fn stop_old(&self, state: &mut SystemState) {
        for conflicting in &self.config.conflicting_services {
            service::stop_best_effort(state, conflicting).await;
            service::disable_best_effort(state, conflicting).await;
        }
    }

    async fn provision_resources(&self, state: &mut SystemState) -> Result<(), ProvisionError> {
        let mut missing = Vec::new();
        for package in &self.config.packages {
            if !state.packages.is_installed(package).await? {
                missing.push(package.clone());
            }
        }
        if missing.is_empty() {
            debug!("Packages already installed: {:?}", self.config.packages);
        } else {
            info!("Installing {}", missing.iter().join(" "));
            state.packages.install(&missing).await?;
        }

        policy::write_policy(state, &self.config.policy_path, &self.config.policy)?;
        service::daemon_reload(state).await
    }

    async fn verify(&self, state: &SystemState) -> Verification {
        let source = self.power_source(state);
        let context = format!("{} power", source);

        // The live file is what the daemon reads; prefer it over our own idea
        // of what we wrote.
        let declared = state
            .read_to_string(&self.config.policy_path)
            .and_then(|text| parse_assignments(&text))
            .ok()
            .and_then(|values| values.get(&governor_key(source)).cloned());

        let observed_governor = state
            .read_to_string(&self.config.governor_path)
            .ok()
            .map(|g| g.trim().to_string());

        let verdict = match &declared {
            Some(expected) => classify_governor(observed_governor.as_deref(), expected, &context),
            None => Verdict::Inconclusive(format!(
                "{} does not declare a governor for {}",
                self.config.policy_path.display(),
                context
            )),
        };

        let mut detected = vec![("power source".to_string(), source.to_string())];
        if let Some(governor) = &observed_governor {
            detected.push(("cpu governor".to_string(), governor.clone()));
        }

        Verification {
            observed: ObservedPowerState {
                governor: observed_governor,
                gpus: Vec::new(),
            },
            verdicts: vec![verdict],
            detected,
        }
    }
}
