use crate::capabilities::PackageManager;
use crate::utils::command::run_checked;
use crate::utils::errors::ProvisionError;
use async_trait::async_trait;
use itertools::Itertools;

/// Debian/Ubuntu packaging via `dpkg-query` and `apt-get`
pub struct Apt;

#[async_trait]
impl PackageManager for Apt {
    async fn is_installed(&self, package: &str) -> Result<bool, ProvisionError> {
        match run_checked("dpkg-query", &["-W", "-f=${Status}", package], &[], "").await {
            Ok(out) => Ok(out.stdout.contains("install ok installed")),
            // dpkg-query exits 1 for packages it has never heard of
            Err(ProvisionError::CommandFailed { code: Some(1), .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn install(&self, packages: &[String]) -> Result<(), ProvisionError> {
        if packages.is_empty() {
            return Ok(());
        }
        let mut args = vec!["install", "-y"];
        args.extend(packages.iter().map(String::as_str));
        let hint = format!(
            "run `sudo apt-get update` and retry, or install manually: `sudo apt-get install {}`",
            packages.iter().join(" ")
        );
        run_checked("apt-get", &args, &[("DEBIAN_FRONTEND", "noninteractive")], &hint)
            .await
            .map(|_| ())
    }
}
