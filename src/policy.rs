use crate::system_state::SystemState;
use crate::utils::errors::ProvisionError;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerSource {
    Ac,
    Battery,
}

impl PowerSource {
    /// Key suffix used by the policy daemon
    fn key_suffix(self) -> &'static str {
        match self {
            PowerSource::Ac => "AC",
            PowerSource::Battery => "BAT",
        }
    }
}

impl std::fmt::Display for PowerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerSource::Ac => write!(f, "AC"),
            PowerSource::Battery => write!(f, "battery"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerProfile {
    /// cpufreq scaling governor, e.g. `performance`
    pub governor: String,
    /// Allow turbo/boost frequencies
    pub boost: bool,
    /// Energy performance preference hint
    pub energy_perf_policy: String,
}

/// Governor policy for both power-source contexts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerPolicy {
    pub ac: PowerProfile,
    pub battery: PowerProfile,
}

impl Default for PowerPolicy {
    fn default() -> Self {
        Self {
            ac: PowerProfile {
                governor: "performance".to_string(),
                boost: true,
                energy_perf_policy: "performance".to_string(),
            },
            battery: PowerProfile {
                governor: "powersave".to_string(),
                boost: false,
                energy_perf_policy: "balance_power".to_string(),
            },
        }
    }
}

pub fn governor_key(source: PowerSource) -> String {
    format!("CPU_SCALING_GOVERNOR_ON_{}", source.key_suffix())
}

impl PowerPolicy {
    pub fn profile(&self, source: PowerSource) -> &PowerProfile {
        match source {
            PowerSource::Ac => &self.ac,
            PowerSource::Battery => &self.battery,
        }
    }

    /// Full file contents; the live file is always replaced with exactly this.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("# Managed by powerprov. Local edits are replaced on the next run;\n");
        out.push_str("# the previous version is kept beside this file with a timestamp suffix.\n");
        out.push_str("TLP_ENABLE=1\n");
        out.push_str("TLP_DEFAULT_MODE=AC\n");
        for source in [PowerSource::Ac, PowerSource::Battery] {
            let profile = self.profile(source);
            let suffix = source.key_suffix();
            out.push('\n');
            out.push_str(&format!("# {}\n", source));
            out.push_str(&format!("{}={}\n", governor_key(source), profile.governor));
            out.push_str(&format!("CPU_BOOST_ON_{}={}\n", suffix, u8::from(profile.boost)));
            out.push_str(&format!(
                "CPU_ENERGY_PERF_POLICY_ON_{}={}\n",
                suffix, profile.energy_perf_policy
            ));
        }
        out
    }
}

/// Parse `KEY=value` lines. Comments and blank lines are skipped; a key
/// assigned twice is rejected since the daemon would only honour one.
pub fn parse_assignments(text: &str) -> Result<BTreeMap<String, String>, ProvisionError> {
    let mut values = BTreeMap::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line.split_once('=').ok_or_else(|| {
            ProvisionError::Parse(format!("line {}: expected KEY=value, got `{}`", number + 1, line))
        })?;
        let value = value.trim().trim_matches('"').to_string();
        if values.insert(key.trim().to_string(), value).is_some() {
            return Err(ProvisionError::Parse(format!(
                "line {}: `{}` assigned more than once",
                number + 1,
                key.trim()
            )));
        }
    }
    Ok(values)
}

/// Replace the live policy file in one step.
pub fn write_policy(
    state: &mut SystemState,
    path: &Path,
    policy: &PowerPolicy,
) -> Result<(), ProvisionError> {
    log::info!("Writing power policy to {}", path.display());
    state.write_atomic(path, &policy.render())
}
