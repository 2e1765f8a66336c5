use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::app::adb::parse::{
    mentions_missing_device, output_indicates_failure, parse_adb_devices, parse_forward_list,
    parse_package_list, parse_setting_value, status_indicates_failure,
};
use crate::app::adb::runner::{CommandOutput, CommandRunner};
use crate::app::config::AdbSettings;
use crate::app::error::AppError;
use crate::app::models::{Device, ForwardEntry, ForwardSpec};
use crate::app::screenshot::is_png;

/// Request/response wrapper over the adb command line. Never retries.
pub struct DeviceClient {
    runner: Arc<dyn CommandRunner>,
    command_timeout: Duration,
    screenshot_timeout: Duration,
}

/// How a finished command is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Check {
    /// Exit code and stderr only; stdout is data.
    Status,
    /// Also scans the output for error markers; stdout is a status message.
    Markers,
}

fn to_args(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

fn device_args(serial: &str, rest: &[&str]) -> Vec<String> {
    let mut args = vec!["-s".to_string(), serial.to_string()];
    args.extend(rest.iter().map(|item| item.to_string()));
    args
}

/// Single-quotes a value for the device shell that `adb shell` hands its arguments to.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

impl DeviceClient {
    pub fn new(runner: Arc<dyn CommandRunner>, settings: &AdbSettings) -> Self {
        Self {
            runner,
            command_timeout: settings.command_timeout(),
            screenshot_timeout: settings.screenshot_timeout(),
        }
    }

    pub fn program(&self) -> &str {
        self.runner.program()
    }

    async fn exec(
        &self,
        context: &str,
        serial: Option<&str>,
        args: Vec<String>,
        check: Check,
        trace_id: &str,
    ) -> Result<CommandOutput, AppError> {
        debug!(trace_id = %trace_id, args = ?args, "adb");
        let output = self.runner.run(&args, self.command_timeout, trace_id).await?;
        let failed = match check {
            Check::Status => status_indicates_failure(&output),
            Check::Markers => output_indicates_failure(&output),
        };
        if failed {
            return Err(self.failure(context, serial, &output, trace_id));
        }
        Ok(output)
    }

    fn failure(
        &self,
        context: &str,
        serial: Option<&str>,
        output: &CommandOutput,
        trace_id: &str,
    ) -> AppError {
        let detail = output.detail();
        warn!(
            trace_id = %trace_id,
            context = context,
            exit_code = ?output.exit_code,
            detail = %detail,
            "adb command failed"
        );
        match serial {
            Some(serial) if mentions_missing_device(&detail) => {
                AppError::device_not_found(serial, trace_id)
            }
            _ => AppError::command_failed(context, &detail, trace_id),
        }
    }

    pub async fn list_devices(&self, trace_id: &str) -> Result<Vec<Device>, AppError> {
        let output = self
            .exec("adb devices", None, to_args(&["devices", "-l"]), Check::Status, trace_id)
            .await?;
        Ok(parse_adb_devices(&output.stdout_text()))
    }

    /// Raw PNG bytes of the current framebuffer.
    pub async fn screenshot(&self, serial: &str, trace_id: &str) -> Result<Vec<u8>, AppError> {
        let args = device_args(serial, &["exec-out", "screencap", "-p"]);
        let output = self.runner.run(&args, self.screenshot_timeout, trace_id).await?;
        // stdout is binary here, so only the exit code and stderr are meaningful.
        if !output.success() || (output.stdout.is_empty() && !output.stderr.trim().is_empty()) {
            return Err(self.failure("screencap", Some(serial), &output, trace_id));
        }
        if !is_png(&output.stdout) {
            return Err(AppError::command_failed(
                "screencap",
                "output is not a PNG image",
                trace_id,
            ));
        }
        Ok(output.stdout)
    }

    pub async fn list_packages(
        &self,
        serial: &str,
        trace_id: &str,
    ) -> Result<HashSet<String>, AppError> {
        let output = self
            .exec(
                "pm list packages",
                Some(serial),
                device_args(serial, &["shell", "pm", "list", "packages"]),
                Check::Status,
                trace_id,
            )
            .await?;
        Ok(parse_package_list(&output.stdout_text()))
    }

    pub async fn get_setting(
        &self,
        serial: &str,
        namespace: &str,
        key: &str,
        trace_id: &str,
    ) -> Result<Option<String>, AppError> {
        let output = self
            .exec(
                "settings get",
                Some(serial),
                device_args(serial, &["shell", "settings", "get", namespace, key]),
                Check::Status,
                trace_id,
            )
            .await?;
        Ok(parse_setting_value(&output.stdout_text()))
    }

    pub async fn put_setting(
        &self,
        serial: &str,
        namespace: &str,
        key: &str,
        value: &str,
        trace_id: &str,
    ) -> Result<(), AppError> {
        let quoted = shell_quote(value);
        self.exec(
            "settings put",
            Some(serial),
            device_args(serial, &["shell", "settings", "put", namespace, key, &quoted]),
            Check::Markers,
            trace_id,
        )
        .await?;
        Ok(())
    }

    /// Action commands only: the output is scanned for error markers.
    pub async fn shell(
        &self,
        serial: &str,
        command: &[&str],
        trace_id: &str,
    ) -> Result<CommandOutput, AppError> {
        let mut rest = vec!["shell"];
        rest.extend_from_slice(command);
        self.exec(
            "adb shell",
            Some(serial),
            device_args(serial, &rest),
            Check::Markers,
            trace_id,
        )
        .await
    }

    pub async fn list_forwards(&self, trace_id: &str) -> Result<Vec<ForwardEntry>, AppError> {
        let output = self
            .exec("forward --list", None, to_args(&["forward", "--list"]), Check::Status, trace_id)
            .await?;
        Ok(parse_forward_list(&output.stdout_text()))
    }

    pub async fn remove_all_forwards(&self, serial: &str, trace_id: &str) -> Result<(), AppError> {
        self.exec(
            "forward --remove-all",
            Some(serial),
            device_args(serial, &["forward", "--remove-all"]),
            Check::Markers,
            trace_id,
        )
        .await?;
        Ok(())
    }

    pub async fn create_forward(
        &self,
        serial: &str,
        spec: &ForwardSpec,
        trace_id: &str,
    ) -> Result<(), AppError> {
        self.exec(
            "forward",
            Some(serial),
            device_args(serial, &["forward", &spec.local, &spec.remote]),
            Check::Markers,
            trace_id,
        )
        .await?;
        Ok(())
    }

    /// `target` is `host:port` of the device's pairing service.
    pub async fn pair(
        &self,
        target: &str,
        password: &str,
        trace_id: &str,
    ) -> Result<String, AppError> {
        let output = self
            .exec("adb pair", None, to_args(&["pair", target, password]), Check::Markers, trace_id)
            .await?;
        Ok(output.stdout_text().trim().to_string())
    }

    pub async fn version(&self, trace_id: &str) -> Result<String, AppError> {
        let output = self
            .exec("adb version", None, to_args(&["version"]), Check::Status, trace_id)
            .await?;
        Ok(output.stdout_text().trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::adb::fake::FakeAdb;
    use crate::app::models::DeviceState;

    fn client(fake: &Arc<FakeAdb>) -> DeviceClient {
        DeviceClient::new(fake.clone(), &AdbSettings::default())
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("a:b/c"), "'a:b/c'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[tokio::test]
    async fn list_devices_with_zero_devices_is_empty() {
        let fake = FakeAdb::new();
        let devices = client(&fake).list_devices("trace-1").await.expect("list");
        assert!(devices.is_empty());
    }

    #[tokio::test]
    async fn list_devices_reports_states() {
        let fake = FakeAdb::new();
        fake.add_device("emulator-5554");
        fake.add_device_with_state("R58M123ABC", "unauthorized");
        let devices = client(&fake).list_devices("trace-2").await.expect("list");
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].state, DeviceState::Connected);
        assert_eq!(devices[1].state, DeviceState::Unauthorized);
    }

    #[tokio::test]
    async fn screenshot_of_stale_device_is_device_not_found() {
        let fake = FakeAdb::new();
        let err = client(&fake)
            .screenshot("gone-serial", "trace-3")
            .await
            .expect_err("stale serial");
        assert!(err.is_device_not_found());
        assert_eq!(err.trace_id, "trace-3");
    }

    #[tokio::test]
    async fn unauthorized_device_is_a_command_failure() {
        let fake = FakeAdb::new();
        fake.add_device_with_state("R58M123ABC", "unauthorized");
        let err = client(&fake)
            .remove_all_forwards("R58M123ABC", "trace-9")
            .await
            .expect_err("unauthorized");
        assert_eq!(err.code, "ERR_COMMAND_FAILED");
        assert!(err.error.contains("device unauthorized"));
    }

    #[tokio::test]
    async fn screenshot_returns_png_bytes() {
        let fake = FakeAdb::new();
        fake.add_device("emulator-5554");
        let bytes = client(&fake)
            .screenshot("emulator-5554", "trace-4")
            .await
            .expect("png");
        assert!(is_png(&bytes));
    }

    #[tokio::test]
    async fn settings_round_trip_through_device_shell() {
        let fake = FakeAdb::new();
        fake.add_device("emulator-5554");
        let client = client(&fake);
        assert_eq!(
            client
                .get_setting("emulator-5554", "secure", "enabled_accessibility_services", "t")
                .await
                .expect("get"),
            None
        );
        client
            .put_setting("emulator-5554", "secure", "enabled_accessibility_services", "a/b:c/d", "t")
            .await
            .expect("put");
        assert_eq!(
            client
                .get_setting("emulator-5554", "secure", "enabled_accessibility_services", "t")
                .await
                .expect("get"),
            Some("a/b:c/d".to_string())
        );
    }

    #[tokio::test]
    async fn error_marker_in_output_is_command_failed() {
        let fake = FakeAdb::new();
        fake.add_device("emulator-5554");
        fake.respond_to(
            "am start-foreground-service",
            CommandOutput {
                stdout: b"Error: Not found; no service started.".to_vec(),
                stderr: String::new(),
                exit_code: Some(0),
            },
        );
        let err = client(&fake)
            .shell(
                "emulator-5554",
                &["am", "start-foreground-service", "com.x/.SocketService"],
                "trace-5",
            )
            .await
            .expect_err("marker");
        assert_eq!(err.code, "ERR_COMMAND_FAILED");
        assert!(err.error.contains("no service started"));
    }

    #[tokio::test]
    async fn package_names_containing_marker_words_are_listed() {
        let fake = FakeAdb::new();
        fake.add_device("emulator-5554");
        fake.install_package("emulator-5554", "com.example.error");
        fake.install_package("emulator-5554", "com.unable.launcher");
        let packages = client(&fake)
            .list_packages("emulator-5554", "trace-7")
            .await
            .expect("listing succeeds");
        assert!(packages.contains("com.example.error"));
        assert!(packages.contains("com.unable.launcher"));
    }

    #[tokio::test]
    async fn setting_value_with_marker_word_is_returned() {
        let fake = FakeAdb::new();
        fake.add_device("emulator-5554");
        fake.set_setting("emulator-5554", "secure", "k", "com.failed.svc/.Svc");
        let value = client(&fake)
            .get_setting("emulator-5554", "secure", "k", "trace-8")
            .await
            .expect("get");
        assert_eq!(value.as_deref(), Some("com.failed.svc/.Svc"));
    }

    #[tokio::test]
    async fn pair_passes_target_and_password() {
        let fake = FakeAdb::new();
        let message = client(&fake)
            .pair("192.168.1.5:5555", "secret", "trace-6")
            .await
            .expect("pair");
        assert!(message.starts_with("Successfully paired"));
        assert_eq!(fake.calls(), vec!["pair 192.168.1.5:5555 secret".to_string()]);
    }
}
