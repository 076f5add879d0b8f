use crate::config::ProvisionConfig;
use crate::provisioners::{CpuPowerPolicy, GpuPowerDaemon};
use crate::summary;
use crate::system_state::SystemState;
use crate::utils::confirm::Confirm;
use crate::utils::errors::{INTERRUPTED_EXIT_CODE, ProvisionError};
use crate::utils::reporter;
use crate::workflow::{RunReport, Workflow};
use clap::ValueEnum;
use std::future::Future;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Target {
    /// CPU governor policy daemon
    Cpu,
    /// GPU dynamic power daemon
    Gpu,
    /// CPU first, then GPU
    All,
}

/// Run the selected workflows in order. The first fatal error stops
/// everything after it; the summary is only written when all succeed.
///
/// There is no lock and no resume: two concurrent runs against the same
/// machine race each other, last writer wins.
pub async fn provision(
    target: Target,
    config: &ProvisionConfig,
    state: &mut SystemState,
    confirm: &dyn Confirm,
) -> Result<Vec<RunReport>, ProvisionError> {
    let mut reports = Vec::new();

    if matches!(target, Target::Cpu | Target::All) {
        let mut workflow = Workflow::new(CpuPowerPolicy::new(config.cpu.clone()));
        reports.push(workflow.run(config, state, confirm).await?);
    }
    if matches!(target, Target::Gpu | Target::All) {
        let mut workflow = Workflow::new(GpuPowerDaemon::new(config.gpu.clone()));
        reports.push(workflow.run(config, state, confirm).await?);
    }

    summary::write_summary(state, &config.summary_path, &reports)?;
    reporter::header("Done");
    reporter::success(&format!("Summary written to {}", config.summary_path.display()));
    if reports.iter().any(|r| !r.verification.confirmed()) {
        reporter::warning("Some checks were inconclusive at idle; re-test under load");
    }
    Ok(reports)
}

/// Resolves on Ctrl-C. If the handler cannot be installed it never resolves.
pub async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Race the work against an interrupt and turn the outcome into an exit code.
/// An interrupt rolls nothing back; files already written stay where they are.
pub async fn run_until_interrupted<W, I>(work: W, interrupt: I) -> i32
where
    W: Future<Output = Result<Vec<RunReport>, ProvisionError>>,
    I: Future<Output = ()>,
{
    tokio::select! {
        result = work => match result {
            Ok(_) => 0,
            Err(err) => {
                reporter::error(&err.to_string());
                if let Some(hint) = err.hint() {
                    reporter::info(&format!("hint: {}", hint));
                }
                err.exit_code()
            }
        },
        _ = interrupt => {
            reporter::warning(
                "Interrupted. Nothing was rolled back: files already written stay in place and \
                 backups sit beside them. Re-run to finish provisioning.",
            );
            INTERRUPTED_EXIT_CODE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{self, StaticHost};
    use crate::capabilities::ServiceManager;
    use crate::utils::confirm::scripted::Scripted;
    use crate::workflow::Stage;
    use async_trait::async_trait;
    use std::fs;
    use std::os::unix::fs::{MetadataExt, PermissionsExt};
    use std::path::Path;
    use std::time::Duration;

    const UNIT: &str = "/etc/systemd/system/nvidia-powerd.service";
    const SUMMARY: &str = "/var/log/powerprov/install-summary.txt";

    fn config() -> ProvisionConfig {
        let mut config = ProvisionConfig::default().with_settle_interval(Duration::ZERO);
        config.gpu.runtime_dir_owner = users::get_current_username()
            .unwrap()
            .to_string_lossy()
            .to_string();
        config
    }

    fn machine(host: StaticHost) -> (tempfile::TempDir, SystemState, memory::Handles) {
        let root = tempfile::tempdir().unwrap();
        let (caps, handles) = memory::capabilities_with_host(host);
        let mut state = SystemState::new(root.path(), caps);
        state
            .write_atomic(Path::new("/usr/bin/nvidia-powerd"), "#!/bin/sh\n")
            .unwrap();
        (root, state, handles)
    }

    fn backups_of(state: &SystemState, dir: &str, prefix: &str) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(state.resolve(Path::new(dir)))
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|name| name.starts_with(prefix))
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_gpu_end_to_end_from_scratch() {
        let (_root, mut state, handles) = machine(StaticHost::default());
        let confirm = Scripted::new(vec![]);

        let reports = provision(Target::Gpu, &config(), &mut state, &confirm).await.unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].stage, Stage::Verified);
        assert!(reports[0].verification.confirmed());

        let log_dir = fs::metadata(state.resolve(Path::new("/var/log/nvtopps"))).unwrap();
        assert!(log_dir.is_dir());
        assert_eq!(log_dir.permissions().mode() & 0o777, 0o755);
        assert_eq!(log_dir.uid(), users::get_current_uid());

        assert!(state.exists(Path::new(UNIT)));
        let status = handles.services.status("nvidia-powerd.service").await.unwrap();
        assert!(status.active && status.enabled);
        assert_eq!(handles.broker.reloads(), 1);

        let summary = state.read_to_string(Path::new(SUMMARY)).unwrap();
        assert!(summary.contains("nvidia driver: 550.54.14"));
        assert!(summary.contains("service state: active, enabled"));
        assert!(summary.contains(UNIT));
    }

    #[tokio::test]
    async fn test_gpu_daemon_dying_after_start_is_fatal() {
        let (_root, mut state, handles) = machine(StaticHost::default());
        handles.services.die_after_start("nvidia-powerd.service");

        let err = provision(Target::Gpu, &config(), &mut state, &Scripted::new(vec![]))
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::ServiceNotRunning { active: false, .. }));
        assert_eq!(err.exit_code(), 1);
        assert!(!state.exists(Path::new(SUMMARY)));
    }

    #[tokio::test]
    async fn test_cpu_retires_conflicting_daemon() {
        let (_root, mut state, handles) = machine(StaticHost::default());
        handles.services.with_unit("power-profiles-daemon.service", true, true);

        provision(Target::Cpu, &config(), &mut state, &Scripted::new(vec![])).await.unwrap();

        let old = handles.services.status("power-profiles-daemon.service").await.unwrap();
        assert!(!old.active && !old.enabled);
        let tlp = handles.services.status("tlp.service").await.unwrap();
        assert!(tlp.active && tlp.enabled);
    }

    #[tokio::test]
    async fn test_missing_package_tool_fails_before_any_change() {
        let mut host = StaticHost::default();
        host.executables.remove("apt-get");
        let (_root, mut state, handles) = machine(host);
        handles.services.with_unit("power-profiles-daemon.service", true, true);

        let err = provision(Target::Cpu, &config(), &mut state, &Scripted::new(vec![]))
            .await
            .unwrap_err();

        match err {
            ProvisionError::PreflightFailed(problems) => {
                assert!(problems.iter().any(|p| p.starts_with("apt-get")));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(handles.services.calls().is_empty());
        assert!(handles.packages.installs().is_empty());
        assert!(!state.exists(Path::new("/etc/tlp.conf")));
        let old = handles.services.status("power-profiles-daemon.service").await.unwrap();
        assert!(old.active && old.enabled);
    }

    #[tokio::test]
    async fn test_gpu_rerun_is_idempotent() {
        let (_root, mut state, handles) = machine(StaticHost::default());
        let confirm = Scripted::new(vec![]);

        provision(Target::Gpu, &config(), &mut state, &confirm).await.unwrap();
        let first_unit = state.read_to_string(Path::new(UNIT)).unwrap();
        provision(Target::Gpu, &config(), &mut state, &confirm).await.unwrap();

        assert_eq!(state.read_to_string(Path::new(UNIT)).unwrap(), first_unit);
        let units: Vec<String> = fs::read_dir(state.resolve(Path::new("/etc/systemd/system")))
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|name| name.ends_with(".service"))
            .collect();
        assert_eq!(units, vec!["nvidia-powerd.service".to_string()]);
        assert_eq!(handles.services.enabled_units().len(), 1);
        let status = handles.services.status("nvidia-powerd.service").await.unwrap();
        assert!(status.active && status.enabled);

        // The second run backed up what the first run wrote.
        let backups = backups_of(&state, "/etc/systemd/system", "nvidia-powerd.service.backup.");
        assert_eq!(backups.len(), 1);
    }

    #[tokio::test]
    async fn test_cpu_backup_preserves_prior_policy() {
        let (_root, mut state, handles) = machine(StaticHost::default());
        let prior = "# hand-tuned\nCPU_SCALING_GOVERNOR_ON_AC=schedutil\n";
        state.write_atomic(Path::new("/etc/tlp.conf"), prior).unwrap();
        let confirm = Scripted::new(vec![]);

        provision(Target::Cpu, &config(), &mut state, &confirm).await.unwrap();
        let live = state.read_to_string(Path::new("/etc/tlp.conf")).unwrap();
        provision(Target::Cpu, &config(), &mut state, &confirm).await.unwrap();

        let backups = backups_of(&state, "/etc", "tlp.conf.backup.");
        assert_eq!(backups.len(), 2);
        let first_backup = state.read_to_string(&Path::new("/etc").join(&backups[0])).unwrap();
        assert_eq!(first_backup, prior);

        assert_ne!(live, prior);
        assert_eq!(live, config().cpu.policy.render());
        assert_eq!(state.read_to_string(Path::new("/etc/tlp.conf")).unwrap(), live);

        let status = handles.services.status("tlp.service").await.unwrap();
        assert!(status.active && status.enabled);
    }

    #[tokio::test]
    async fn test_missing_vendor_binary_leaves_no_state() {
        let root = tempfile::tempdir().unwrap();
        let (caps, handles) = memory::capabilities();
        let mut state = SystemState::new(root.path(), caps);

        let err = provision(Target::Gpu, &config(), &mut state, &Scripted::new(vec![]))
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::PreflightFailed(_)));
        assert_eq!(err.exit_code(), 1);
        assert!(state.touched().is_empty());
        assert!(!state.exists(Path::new(UNIT)));
        assert!(!state.exists(Path::new("/etc/dbus-1/system.d/nvidia-dbus.conf")));
        assert!(!state.exists(Path::new(SUMMARY)));
        assert!(handles.services.calls().is_empty());
    }

    #[tokio::test]
    async fn test_low_disk_declined_has_no_side_effects() {
        let host = StaticHost { free_space: Some(1024), ..StaticHost::default() };
        let (_root, mut state, handles) = machine(host);
        let confirm = Scripted::new(vec![false]);

        let err = provision(Target::Cpu, &config(), &mut state, &confirm).await.unwrap_err();

        assert!(matches!(err, ProvisionError::ResourceInsufficient(_)));
        assert!(!state.exists(Path::new("/etc/tlp.conf")));
        assert!(handles.packages.installs().is_empty());
        assert!(handles.services.calls().is_empty());
    }

    #[tokio::test]
    async fn test_low_disk_accepted_proceeds() {
        let host = StaticHost { free_space: Some(1024), ..StaticHost::default() };
        let (_root, mut state, _handles) = machine(host);
        let confirm = Scripted::new(vec![true]);

        let reports = provision(Target::Cpu, &config(), &mut state, &confirm).await.unwrap();

        assert_eq!(reports[0].stage, Stage::Verified);
        assert!(state.exists(Path::new("/etc/tlp.conf")));
        assert_eq!(confirm.asked().len(), 2);
    }

    #[tokio::test]
    async fn test_all_stops_at_first_fatal_failure() {
        let (_root, mut state, handles) = machine(StaticHost::default());
        handles.services.fail_on("start tlp.service");

        let err = provision(Target::All, &config(), &mut state, &Scripted::new(vec![]))
            .await
            .unwrap_err();

        assert_eq!(err.exit_code(), 5);
        assert!(!state.exists(Path::new(UNIT)));
        assert!(!state.exists(Path::new(SUMMARY)));
    }

    #[tokio::test]
    async fn test_interrupt_exits_130_and_keeps_written_files() {
        let (root, mut state, handles) = machine(StaticHost::default());
        handles.services.hang_on_start();
        let policy = root.path().join("etc/tlp.conf");
        let confirm = Scripted::new(vec![]);

        let interrupt = async {
            while !policy.exists() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        let code = run_until_interrupted(provision(Target::Cpu, &config(), &mut state, &confirm), interrupt).await;

        assert_eq!(code, INTERRUPTED_EXIT_CODE);
        assert!(policy.exists());
        assert!(!state.exists(Path::new(SUMMARY)));
    }

    /// Operator who takes a while to answer the prompt.
    struct SlowAnswer;

    #[async_trait]
    impl Confirm for SlowAnswer {
        async fn confirm(&self, _question: &str) -> bool {
            tokio::time::sleep(Duration::from_millis(400)).await;
            false
        }
    }

    #[tokio::test]
    async fn test_interrupt_at_open_prompt_exits_130() {
        let (_root, mut state, handles) = machine(StaticHost::default());

        let interrupt = tokio::time::sleep(Duration::from_millis(20));
        let code = run_until_interrupted(provision(Target::Cpu, &config(), &mut state, &SlowAnswer), interrupt).await;

        assert_eq!(code, INTERRUPTED_EXIT_CODE);
        assert!(!state.exists(Path::new("/etc/tlp.conf")));
        assert!(handles.services.calls().is_empty());
    }

    #[tokio::test]
    async fn test_exit_code_for_success_and_failure() {
        let ok = run_until_interrupted(async { Ok(Vec::new()) }, std::future::pending()).await;
        assert_eq!(ok, 0);

        let failed = run_until_interrupted(
            async { Err(ProvisionError::Declined("test".to_string())) },
            std::future::pending(),
        )
        .await;
        assert_eq!(failed, 1);
    }
}
