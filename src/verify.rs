use crate::capabilities::GpuPowerReading;
use crate::utils::reporter;

/// Read-only snapshot taken after provisioning; never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservedPowerState {
    pub governor: Option<String>,
    pub gpus: Vec<GpuPowerReading>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Confirmed(String),
    /// Below expectation. Never fatal: an idle daemon may not have raised
    /// the value yet.
    Inconclusive(String),
}

impl Verdict {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Verdict::Confirmed(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Verdict::Confirmed(message) | Verdict::Inconclusive(message) => message,
        }
    }

    pub fn report(&self) {
        match self {
            Verdict::Confirmed(message) => reporter::success(message),
            Verdict::Inconclusive(message) => reporter::warning(message),
        }
    }
}

/// Result of the verification stage plus versions found on the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Verification {
    pub observed: ObservedPowerState,
    pub verdicts: Vec<Verdict>,
    pub detected: Vec<(String, String)>,
}

impl Verification {
    pub fn confirmed(&self) -> bool {
        !self.verdicts.is_empty() && self.verdicts.iter().all(Verdict::is_confirmed)
    }
}

/// At or above the threshold is success, anything else only warns.
pub fn classify_power_cap(gpu: &GpuPowerReading, threshold_watts: f64) -> Verdict {
    let label = format!("GPU {} ({})", gpu.index, gpu.name);
    match gpu.power_limit_watts {
        Some(limit) if limit >= threshold_watts => Verdict::Confirmed(format!(
            "{}: power cap {:.1} W meets the {:.1} W target",
            label, limit, threshold_watts
        )),
        Some(limit) => Verdict::Inconclusive(format!(
            "{}: power cap {:.1} W is below the {:.1} W target; it may rise once a workload \
             drives the daemon, re-test under load",
            label, limit, threshold_watts
        )),
        None => Verdict::Inconclusive(format!(
            "{}: driver did not report a power cap; re-test under load",
            label
        )),
    }
}

pub fn classify_governor(observed: Option<&str>, expected: &str, context: &str) -> Verdict {
    match observed {
        Some(governor) if governor == expected => Verdict::Confirmed(format!(
            "CPU governor is `{}` as declared for {}",
            governor, context
        )),
        Some(governor) => Verdict::Inconclusive(format!(
            "CPU governor is `{}` but `{}` is declared for {}; the daemon may apply it on the next \
             power event, re-check after replugging",
            governor, expected, context
        )),
        None => Verdict::Inconclusive("could not read the active CPU governor".to_string()),
    }
}
