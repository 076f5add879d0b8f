use crate::system_state::SystemState;
use crate::utils::errors::ProvisionError;
use crate::utils::reporter;
use log::info;
use std::path::Path;

/// Bus permissions for a single daemon.
///
/// Deliberately coarse: the daemon may own its well-known name and talk to
/// any client in the default context. The daemon's protocol is undocumented,
/// so no narrower rule set is attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcAccessPolicy {
    pub bus_name: String,
}

impl IpcAccessPolicy {
    pub fn new(bus_name: &str) -> Self {
        Self { bus_name: bus_name.to_string() }
    }

    pub fn render(&self) -> String {
        format!(
            r#"<!DOCTYPE busconfig PUBLIC
 "-//freedesktop//DTD D-BUS Bus Configuration 1.0//EN"
 "http://www.freedesktop.org/standards/dbus/1.0/busconfig.dtd">
<busconfig>
  <policy user="root">
    <allow own="{name}"/>
    <allow send_destination="{name}"/>
    <allow receive_sender="{name}"/>
  </policy>
  <policy context="default">
    <allow own="{name}"/>
    <allow send_destination="{name}"/>
    <allow receive_sender="{name}"/>
  </policy>
</busconfig>
"#,
            name = self.bus_name
        )
    }
}

/// Whether the running broker picked the new policy up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    Applied,
    /// Written; takes effect when the broker restarts
    Deferred,
}

/// Write the policy and ask the broker to reload it. An unreachable broker is
/// not an error.
pub async fn write_and_reload(
    state: &mut SystemState,
    path: &Path,
    policy: &IpcAccessPolicy,
) -> Result<ReloadOutcome, ProvisionError> {
    info!("Writing bus policy for {} to {}", policy.bus_name, path.display());
    state.write_atomic(path, &policy.render())?;

    match state.broker.reload().await {
        Ok(()) => Ok(ReloadOutcome::Applied),
        Err(err) => {
            reporter::warning(&format!(
                "Bus broker did not reload ({}); the policy applies after its next restart",
                err
            ));
            Ok(ReloadOutcome::Deferred)
        }
    }
}
