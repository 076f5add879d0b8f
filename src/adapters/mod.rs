pub mod apt;
pub mod dbus;
pub mod host;
pub mod nvidia_smi;
pub mod systemd;

#[cfg(test)]
pub mod memory;

pub use apt::Apt;
pub use dbus::DbusSend;
pub use host::LocalHost;
pub use nvidia_smi::NvidiaSmi;
pub use systemd::Systemctl;
