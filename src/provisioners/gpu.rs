use crate::config::GpuConfig;
use crate::ipc_policy::{self, IpcAccessPolicy};
use crate::preflight::{Requirements, VendorBinary};
use crate::service::{self, RestartPolicy, ServiceUnit};
use crate::system_state::SystemState;
use crate::utils::errors::ProvisionError;
use crate::utils::reporter;
use crate::verify::{ObservedPowerState, Verdict, Verification, classify_power_cap};
use crate::workflow::Provisioner;
use async_trait::async_trait;
use itertools::Itertools;
use log::info;
use std::path::PathBuf;

/// Installs the GPU dynamic-power daemon as a bus-activated service.
pub struct GpuPowerDaemon {
    pub config: GpuConfig,
}

impl GpuPowerDaemon {
    pub fn new(config: GpuConfig) -> Self {
        Self { config }
    }

    pub fn unit(&self) -> ServiceUnit {
        let hardening = [
            ("ProtectSystem", "full"),
            ("ProtectHome", "true"),
            ("PrivateTmp", "true"),
            ("NoNewPrivileges", "true"),
        ];
        ServiceUnit {
            description: "NVIDIA Dynamic Boost power daemon".to_string(),
            requires: vec!["dbus.service".to_string()],
            bus_name: Some(self.config.bus_name.clone()),
            exec_start: self.config.vendor_binary.display().to_string(),
            restart: RestartPolicy::OnFailure,
            restart_sec: 5,
            sandboxing: hardening
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            wanted_by: "multi-user.target".to_string(),
        }
    }
}

#[async_trait]
impl Provisioner for GpuPowerDaemon {
    fn name(&self) -> &'static str {
        "gpu-power-daemon"
    }

    fn service(&self) -> &str {
        &self.config.service
    }

    fn requirements(&self) -> Requirements {
        Requirements {
            required_tools: self.config.required_tools.clone(),
            recommended_tools: self.config.recommended_tools.clone(),
            vendor_binary: Some(VendorBinary {
                path: self.config.vendor_binary.clone(),
                remediation: "reinstall the NVIDIA driver package \
                              (e.g. `sudo apt install --reinstall nvidia-driver-<version>`)"
                    .to_string(),
            }),
        }
    }

    fn planned_changes(&self) -> Vec<String> {
        vec![
            format!("stop and disable {}", self.config.service),
            format!(
                "recreate {} (mode {:o}, owner {})",
                self.config.runtime_dir.display(),
                self.config.runtime_dir_mode,
                self.config.runtime_dir_owner
            ),
            format!("rewrite {}", self.config.ipc_policy_path.display()),
            format!("rewrite {}", self.config.unit_path.display()),
            format!("enable and start {}", self.config.service),
        ]
    }

    async fn back_up(&self, state: &mut SystemState, stamp: &str) -> Result<Vec<PathBuf>, ProvisionError> {
        let mut backups = Vec::new();
        for path in [&self.config.unit_path, &self.config.ipc_policy_path] {
            backups.extend(state.backup_existing(path, stamp)?);
        }
        Ok(backups)
    }

    async fn stop_old(&self, state: &mut SystemState) {
        service::stop_best_effort(state, &self.config.service).await;
        service::disable_best_effort(state, &self.config.service).await;
    }

    async fn provision_resources(&self, state: &mut SystemState) -> Result<(), ProvisionError> {
        state.reset_dir(
            &self.config.runtime_dir,
            self.config.runtime_dir_mode,
            &self.config.runtime_dir_owner,
        )?;

        let policy = IpcAccessPolicy::new(&self.config.bus_name);
        ipc_policy::write_and_reload(state, &self.config.ipc_policy_path, &policy).await?;

        service::install_unit(state, &self.config.unit_path, &self.unit()).await
    }

    async fn verify(&self, state: &SystemState) -> Verification {
        let threshold = self.config.power_cap_threshold_watts;

        let gpus = match state.gpu.power_state().await {
            Ok(gpus) => gpus,
            Err(err) => {
                reporter::info("Query the cap yourself with `nvidia-smi -q -d POWER` once a workload runs");
                return Verification {
                    verdicts: vec![Verdict::Inconclusive(format!("could not query GPU power state: {}", err))],
                    ..Verification::default()
                };
            }
        };

        let mut verdicts: Vec<Verdict> = gpus.iter().map(|gpu| classify_power_cap(gpu, threshold)).collect();
        if verdicts.is_empty() {
            verdicts.push(Verdict::Inconclusive("the driver reported no GPUs".to_string()));
        }

        let drivers = gpus.iter().map(|gpu| gpu.driver_version.as_str()).unique().join(", ");
        info!("Observed {} GPU(s), driver {}", gpus.len(), drivers);

        let mut detected = Vec::new();
        if !drivers.is_empty() {
            detected.push(("nvidia driver".to_string(), drivers));
        }
        for gpu in &gpus {
            if let Some(draw) = gpu.power_draw_watts {
                detected.push((format!("gpu {} power draw", gpu.index), format!("{:.1} W", draw)));
            }
        }

        Verification {
            observed: ObservedPowerState { governor: None, gpus },
            verdicts,
            detected,
        }
    }
}
