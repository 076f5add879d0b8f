use std::path::{Path, PathBuf};
use thiserror::Error;

/// Exit status used when a fatal error has no more specific code.
pub const FATAL_EXIT_CODE: i32 = 1;

/// Conventional status for a run stopped by SIGINT. Reserved for the
/// operator's own interrupt.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Unsupported environment: {detail}")]
    EnvironmentUnsupported { detail: String, hint: String },
    #[error("Missing dependency: {name}")]
    MissingDependency { name: String, hint: String },
    #[error("Insufficient resources: {0}")]
    ResourceInsufficient(String),
    #[error("Command `{command}` failed ({}): {stderr}", describe_code(.code))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
        hint: String,
    },
    #[error("Service {unit} is not running after start (active: {active}, enabled: {enabled})")]
    ServiceNotRunning {
        unit: String,
        active: bool,
        enabled: bool,
        hint: String,
    },
    #[error("Preflight failed: {}", .0.join("; "))]
    PreflightFailed(Vec<String>),
    #[error("Declined by operator: {0}")]
    Declined(String),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Parse error: {0}")]
    Parse(String),
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

impl ProvisionError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        ProvisionError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Remediation text printed under the error, if the failure carries one.
    pub fn hint(&self) -> Option<&str> {
        match self {
            ProvisionError::EnvironmentUnsupported { hint, .. }
            | ProvisionError::MissingDependency { hint, .. }
            | ProvisionError::CommandFailed { hint, .. }
            | ProvisionError::ServiceNotRunning { hint, .. } => Some(hint.as_str()),
            _ => None,
        }
    }

    /// Failed external commands propagate their own status; everything else exits 1.
    /// A command that itself exited 130 maps to 1 so it cannot pass for an interrupt.
    pub fn exit_code(&self) -> i32 {
        match self {
            ProvisionError::CommandFailed { code: Some(code), .. }
                if *code != 0 && *code != INTERRUPTED_EXIT_CODE =>
            {
                *code
            }
            _ => FATAL_EXIT_CODE,
        }
    }
}
