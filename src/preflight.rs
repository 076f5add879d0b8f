use crate::config::PreflightConfig;
use crate::system_state::SystemState;
use crate::utils::confirm::Confirm;
use crate::utils::errors::ProvisionError;
use crate::utils::reporter;
use itertools::Itertools;
use std::cmp::Ordering;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Aborts the run once every check has been reported
    Fatal,
    /// The operator may override
    Soft,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckStatus {
    Passed(String),
    /// Worth knowing, never blocks
    Advisory(String),
    Failed {
        severity: Severity,
        detail: String,
        hint: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    pub check: String,
    pub status: CheckStatus,
}

impl CheckOutcome {
    fn passed(check: &str, detail: String) -> Self {
        Self { check: check.to_string(), status: CheckStatus::Passed(detail) }
    }

    fn advisory(check: &str, detail: String) -> Self {
        Self { check: check.to_string(), status: CheckStatus::Advisory(detail) }
    }

    fn failed(check: &str, severity: Severity, detail: String, hint: Option<String>) -> Self {
        Self {
            check: check.to_string(),
            status: CheckStatus::Failed { severity, detail, hint },
        }
    }

    fn is_failure(&self, wanted: Severity) -> bool {
        matches!(&self.status, CheckStatus::Failed { severity, .. } if *severity == wanted)
    }
}

/// Daemon binary a provisioner wraps a service around
#[derive(Debug, Clone)]
pub struct VendorBinary {
    pub path: PathBuf,
    pub remediation: String,
}

/// What a particular workflow needs on top of the common checks.
#[derive(Debug, Clone, Default)]
pub struct Requirements {
    pub required_tools: Vec<String>,
    pub recommended_tools: Vec<String>,
    pub vendor_binary: Option<VendorBinary>,
}

/// Compare dotted versions component by component as integers, so
/// `2.4 < 2.31`. Non-digit suffixes (`35-0ubuntu3`) are ignored and missing
/// components count as zero.
pub fn compare_versions(found: &str, floor: &str) -> Ordering {
    fn components(version: &str) -> Vec<u64> {
        version
            .split('.')
            .map(|part| {
                let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
                digits.parse().unwrap_or(0)
            })
            .collect()
    }

    let (a, b) = (components(found), components(floor));
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| a.get(i).copied().unwrap_or(0).cmp(&b.get(i).copied().unwrap_or(0)))
        .find(|ord| *ord != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

fn human_bytes(bytes: u64) -> String {
    const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
    format!("{:.1} GiB", bytes as f64 / GIB)
}

#[derive(Debug, Clone, Default)]
pub struct PreflightReport {
    outcomes: Vec<CheckOutcome>,
}

/// Run every check. Nothing short-circuits: the report lists all problems
/// at once so they can be fixed in a single pass.
pub fn run_preflight(
    config: &PreflightConfig,
    state: &SystemState,
    requirements: &Requirements,
) -> PreflightReport {
    let host = &state.host;
    let mut outcomes = Vec::new();

    let os = host.os_family();
    outcomes.push(if os == config.supported_os {
        CheckOutcome::passed("operating system", os)
    } else {
        CheckOutcome::failed(
            "operating system",
            Severity::Fatal,
            format!("`{}` is not supported, only `{}`", os, config.supported_os),
            Some("run on a supported Linux distribution".to_string()),
        )
    });

    let arch = host.architecture();
    outcomes.push(if config.supported_archs.iter().any(|a| *a == arch) {
        CheckOutcome::passed("architecture", arch)
    } else {
        CheckOutcome::failed(
            "architecture",
            Severity::Fatal,
            format!("`{}` is not one of {}", arch, config.supported_archs.iter().join(", ")),
            None,
        )
    });

    outcomes.push(if host.is_privileged() {
        CheckOutcome::passed("privileges", "running as root".to_string())
    } else {
        CheckOutcome::failed(
            "privileges",
            Severity::Fatal,
            "system configuration requires root".to_string(),
            Some("re-run with sudo".to_string()),
        )
    });

    outcomes.push(match host.glibc_version() {
        Some(version) if compare_versions(&version, &config.glibc_floor) != Ordering::Less => {
            CheckOutcome::passed("glibc", version)
        }
        Some(version) => CheckOutcome::failed(
            "glibc",
            Severity::Fatal,
            format!("glibc {} is older than the required {}", version, config.glibc_floor),
            Some("upgrade the distribution".to_string()),
        ),
        None => CheckOutcome::failed(
            "glibc",
            Severity::Fatal,
            "could not determine the glibc version".to_string(),
            Some("make sure `ldd` is installed".to_string()),
        ),
    });

    outcomes.push(match state.free_space() {
        Some(free) if free >= config.min_free_bytes => {
            CheckOutcome::passed("disk space", format!("{} free", human_bytes(free)))
        }
        Some(free) => CheckOutcome::failed(
            "disk space",
            Severity::Soft,
            format!(
                "only {} free on {}, {} recommended",
                human_bytes(free),
                state.root().display(),
                human_bytes(config.min_free_bytes)
            ),
            None,
        ),
        None => CheckOutcome::advisory(
            "disk space",
            format!("could not determine free space on {}", state.root().display()),
        ),
    });

    for tool in &requirements.required_tools {
        outcomes.push(match host.find_executable(tool) {
            Some(path) => CheckOutcome::passed(tool, path.display().to_string()),
            None => CheckOutcome::failed(
                tool,
                Severity::Fatal,
                format!("required tool `{}` not found", tool),
                Some(format!("install the package providing `{}`", tool)),
            ),
        });
    }

    for tool in &requirements.recommended_tools {
        outcomes.push(match host.find_executable(tool) {
            Some(path) => CheckOutcome::passed(tool, path.display().to_string()),
            None => CheckOutcome::advisory(tool, format!("recommended tool `{}` not found", tool)),
        });
    }

    if let Some(vendor) = &requirements.vendor_binary {
        let name = vendor.path.display().to_string();
        outcomes.push(if state.exists(&vendor.path) {
            CheckOutcome::passed("vendor daemon", name)
        } else {
            CheckOutcome::failed(
                "vendor daemon",
                Severity::Fatal,
                format!("{} is missing", name),
                Some(vendor.remediation.clone()),
            )
        });
    }

    PreflightReport { outcomes }
}

impl PreflightReport {
    pub fn outcomes(&self) -> &[CheckOutcome] {
        &self.outcomes
    }

    pub fn fatal_failures(&self) -> Vec<&CheckOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure(Severity::Fatal)).collect()
    }

    pub fn print(&self) {
        for outcome in self.outcomes() {
            match &outcome.status {
                CheckStatus::Passed(detail) => reporter::success(&format!("{}: {}", outcome.check, detail)),
                CheckStatus::Advisory(detail) => reporter::warning(&format!("{}: {}", outcome.check, detail)),
                CheckStatus::Failed { severity, detail, hint } => {
                    let line = format!("{}: {}", outcome.check, detail);
                    match severity {
                        Severity::Fatal => reporter::error(&line),
                        Severity::Soft => reporter::warning(&line),
                    }
                    if let Some(hint) = hint {
                        reporter::info(&format!("  fix: {}", hint));
                    }
                }
            }
        }
    }

    /// Turn the report into a go/no-go decision. Fatal failures abort as one
    /// error; soft failures each ask the operator.
    pub async fn resolve(&self, confirm: &dyn Confirm) -> Result<(), ProvisionError> {
        let fatal: Vec<String> = self
            .fatal_failures()
            .into_iter()
            .map(|outcome| match &outcome.status {
                CheckStatus::Failed { detail, hint: Some(hint), .. } => {
                    format!("{}: {} ({})", outcome.check, detail, hint)
                }
                CheckStatus::Failed { detail, .. } => format!("{}: {}", outcome.check, detail),
                _ => outcome.check.clone(),
            })
            .collect();
        if !fatal.is_empty() {
            return Err(ProvisionError::PreflightFailed(fatal));
        }

        for outcome in self.outcomes.iter().filter(|o| o.is_failure(Severity::Soft)) {
            if let CheckStatus::Failed { detail, .. } = &outcome.status {
                if !confirm.confirm(&format!("{}: {}. Continue anyway?", outcome.check, detail)).await {
                    return Err(ProvisionError::ResourceInsufficient(detail.clone()));
                }
                log::warn!("Operator overrode `{}` check", outcome.check);
            }
        }
        Ok(())
    }
}
