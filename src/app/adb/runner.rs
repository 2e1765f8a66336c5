use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::app::error::AppError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stderr when present, stdout otherwise.
    pub fn detail(&self) -> String {
        if self.stderr.trim().is_empty() {
            self.stdout_text().trim().to_string()
        } else {
            self.stderr.trim().to_string()
        }
    }
}

/// Runs one invocation of the device-management binary.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    fn program(&self) -> &str;

    async fn run(
        &self,
        args: &[String],
        timeout: Duration,
        trace_id: &str,
    ) -> Result<CommandOutput, AppError>;
}

#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: String,
}

impl ProcessRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    fn program(&self) -> &str {
        &self.program
    }

    async fn run(
        &self,
        args: &[String],
        timeout: Duration,
        trace_id: &str,
    ) -> Result<CommandOutput, AppError> {
        run_command_with_timeout(&self.program, args, timeout, trace_id).await
    }
}

pub async fn run_command_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
    trace_id: &str,
) -> Result<CommandOutput, AppError> {
    // kill_on_drop reaps the child when the timeout drops the output future.
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| match err.kind() {
            ErrorKind::NotFound => {
                AppError::dependency(format!("Executable not found: {program}"), trace_id)
            }
            _ => AppError::system(format!("Failed to spawn command: {err}"), trace_id),
        })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|err| {
            AppError::system(format!("Failed to collect command output: {err}"), trace_id)
        })?,
        Err(_) => {
            return Err(AppError::system(
                format!("Command timed out after {}s", timeout.as_secs_f32()),
                trace_id,
            ))
        }
    };

    Ok(CommandOutput {
        stdout: output.stdout,
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(script: &str) -> (String, Vec<String>) {
        if cfg!(windows) {
            ("cmd.exe".to_string(), vec!["/C".to_string(), script.to_string()])
        } else {
            ("sh".to_string(), vec!["-c".to_string(), script.to_string()])
        }
    }

    #[tokio::test]
    async fn does_not_deadlock_on_large_stdout() {
        // A child that fills the pipe buffer must still complete well inside the timeout.
        let script = if cfg!(windows) {
            "for /L %i in (1,1,100000) do @echo 1234567890"
        } else {
            "i=0; while [ $i -lt 100000 ]; do echo 1234567890; i=$((i+1)); done"
        };
        let (program, args) = shell(script);

        let output = run_command_with_timeout(&program, &args, Duration::from_secs(20), "trace-large")
            .await
            .expect("large output completes");

        assert!(output.success());
        assert!(output.stdout.len() >= 1_000_000, "got {}", output.stdout.len());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn times_out_and_reports_system_error() {
        let (program, args) = shell("sleep 5");
        let err = run_command_with_timeout(&program, &args, Duration::from_millis(100), "trace-slow")
            .await
            .expect_err("should time out");
        assert_eq!(err.code, "ERR_SYSTEM");
        assert!(err.error.contains("timed out"));
    }

    #[tokio::test]
    async fn missing_program_is_a_dependency_error() {
        let err = run_command_with_timeout(
            "/this/path/should/not/exist/adb",
            &[],
            Duration::from_secs(1),
            "trace-missing",
        )
        .await
        .expect_err("spawn fails");
        assert_eq!(err.code, "ERR_DEPENDENCY");
        assert_eq!(err.trace_id, "trace-missing");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_stderr_and_exit_code() {
        let (program, args) = shell("echo oops 1>&2; exit 3");
        let output = run_command_with_timeout(&program, &args, Duration::from_secs(5), "trace-err")
            .await
            .expect("runs");
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.detail(), "oops");
    }
}
