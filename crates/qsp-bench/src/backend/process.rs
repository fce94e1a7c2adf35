//! Out-of-process backend invocation.

use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::trace;

use crate::error::{BackendError, BackendResult};
use crate::state::AmplitudeVector;

/// JSON document written to a synthesizer's standard input.
#[derive(Debug, Serialize)]
pub struct CoefficientPayload {
    /// Real parts in basis order.
    pub coefficients: Vec<f64>,
    /// Imaginary parts, present only for complex targets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imag: Option<Vec<f64>>,
    pub eps: f64,
}

impl CoefficientPayload {
    /// Payload for a real target. Fails for complex amplitudes.
    pub fn real(state: &AmplitudeVector, eps: f64) -> BackendResult<Self> {
        let coefficients = state.real_coefficients().ok_or_else(|| {
            BackendError::UnsupportedState("complex amplitudes, real coefficients required".into())
        })?;
        Ok(Self {
            coefficients,
            imag: None,
            eps,
        })
    }

    /// Payload for any target; imaginary parts are sent when present.
    pub fn complex(state: &AmplitudeVector, eps: f64) -> Self {
        let coefficients = state.amplitudes().iter().map(|a| a.re).collect();
        let imag = (!state.is_real()).then(|| state.amplitudes().iter().map(|a| a.im).collect());
        Self {
            coefficients,
            imag,
            eps,
        }
    }

    /// Serialized form.
    pub fn to_bytes(&self) -> BackendResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| BackendError::MalformedOutput(e.to_string()))
    }
}

/// Whether `program` can be started: an existing path, or a bare name
/// found on `PATH`.
pub fn program_exists(program: &Path) -> bool {
    if program.components().count() > 1 || program.is_absolute() {
        return program.is_file();
    }
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}

/// Run `program` with `args`, optionally feeding `stdin`, and return its
/// standard output.
///
/// A non-zero exit is an error carrying the captured standard error. With a
/// `timeout`, the child is killed when the deadline passes.
pub async fn run_command(
    program: &Path,
    args: &[String],
    stdin: Option<&[u8]>,
    timeout: Option<Duration>,
) -> BackendResult<String> {
    let command_name = program.display().to_string();
    trace!("Running {} {}", command_name, args.join(" "));

    let mut child = Command::new(program)
        .args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| BackendError::Spawn {
            command: command_name.clone(),
            message: e.to_string(),
        })?;

    let pipe = child.stdin.take();
    let input = stdin.unwrap_or_default().to_vec();
    let write = async move {
        if let Some(mut pipe) = pipe {
            pipe.write_all(&input).await?;
            pipe.shutdown().await?;
        }
        Ok::<_, std::io::Error>(())
    };

    let exchange = async {
        let (written, output) = tokio::join!(write, child.wait_with_output());
        (written, output)
    };

    let (written, output) = match timeout {
        Some(limit) => tokio::time::timeout(limit, exchange).await.map_err(|_| {
            BackendError::Timeout(format!(
                "'{}' did not finish within {}s",
                command_name,
                limit.as_secs_f64()
            ))
        })?,
        None => exchange.await,
    };

    let output = output.map_err(|e| BackendError::Spawn {
        command: command_name.clone(),
        message: e.to_string(),
    })?;

    if !output.status.success() {
        return Err(BackendError::NonZeroExit {
            command: command_name,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    // A child that exits without reading its input is fine once it succeeded.
    if let Err(e) = written {
        if e.kind() != ErrorKind::BrokenPipe {
            return Err(BackendError::Spawn {
                command: command_name,
                message: format!("failed to write stdin: {e}"),
            });
        }
    }

    String::from_utf8(output.stdout).map_err(|_| {
        BackendError::MalformedOutput(format!("'{command_name}' printed non-UTF-8 output"))
    })
}

/// Resolve a timeout setting in seconds.
pub fn timeout_from_secs(secs: Option<u64>) -> Option<Duration> {
    secs.filter(|&s| s > 0).map(Duration::from_secs)
}
