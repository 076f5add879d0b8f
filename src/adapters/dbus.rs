use crate::capabilities::IpcBroker;
use crate::utils::command::run_checked;
use crate::utils::errors::ProvisionError;
use async_trait::async_trait;

/// System bus broker, reached through `dbus-send`
pub struct DbusSend;

#[async_trait]
impl IpcBroker for DbusSend {
    async fn reload(&self) -> Result<(), ProvisionError> {
        run_checked(
            "dbus-send",
            &[
                "--system",
                "--type=method_call",
                "--dest=org.freedesktop.DBus",
                "/org/freedesktop/DBus",
                "org.freedesktop.DBus.ReloadConfig",
            ],
            &[],
            "the policy is applied on the next `systemctl restart dbus` or reboot",
        )
        .await
        .map(|_| ())
    }
}
