use crate::utils::errors::ProvisionError;
use log::debug;
use std::io::ErrorKind;
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

fn render(program: &str, args: &[&str]) -> String {
    std::iter::once(program).chain(args.iter().copied()).collect::<Vec<_>>().join(" ")
}

/// Run an external tool to completion; a non-zero exit is a `CommandFailed`
/// carrying the tool's own stderr plus `hint`.
pub async fn run_checked(
    program: &str,
    args: &[&str],
    envs: &[(&str, &str)],
    hint: &str,
) -> Result<CommandOutput, ProvisionError> {
    let rendered = render(program, args);
    debug!("Running `{}`", rendered);

    let output = Command::new(program)
        .args(args)
        .envs(envs.iter().copied())
        .output()
        .await
        .map_err(|e| spawn_error(program, &rendered, e))?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if !output.status.success() {
        return Err(ProvisionError::CommandFailed {
            command: rendered,
            code: output.status.code(),
            stderr,
            hint: hint.to_string(),
        });
    }

    Ok(CommandOutput { stdout, stderr })
}

/// Run a query-style command where the exit status is the answer.
pub async fn run_status(program: &str, args: &[&str]) -> Result<bool, ProvisionError> {
    let rendered = render(program, args);
    debug!("Querying `{}`", rendered);

    let status = Command::new(program)
        .args(args)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await
        .map_err(|e| spawn_error(program, &rendered, e))?;

    Ok(status.success())
}

fn spawn_error(program: &str, rendered: &str, err: std::io::Error) -> ProvisionError {
    if err.kind() == ErrorKind::NotFound {
        ProvisionError::MissingDependency {
            name: program.to_string(),
            hint: format!("install the package providing `{}`", program),
        }
    } else {
        ProvisionError::CommandFailed {
            command: rendered.to_string(),
            code: None,
            stderr: err.to_string(),
            hint: String::new(),
        }
    }
}
