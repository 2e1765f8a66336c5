//! Scripted in-memory adb used by the test suite.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::app::adb::runner::{CommandOutput, CommandRunner};
use crate::app::error::AppError;
use crate::app::screenshot::PNG_SIGNATURE;

#[derive(Default)]
struct FakeState {
    devices: Vec<(String, String)>,
    forwards: Vec<(String, String, String)>,
    packages: HashMap<String, HashSet<String>>,
    settings: HashMap<(String, String, String), String>,
    responses: Vec<(String, CommandOutput)>,
    calls: Vec<String>,
}

#[derive(Default)]
pub struct FakeAdb {
    state: Mutex<FakeState>,
}

fn ok(stdout: impl Into<String>) -> CommandOutput {
    CommandOutput {
        stdout: stdout.into().into_bytes(),
        stderr: String::new(),
        exit_code: Some(0),
    }
}

fn err(stderr: impl Into<String>) -> CommandOutput {
    CommandOutput {
        stdout: Vec::new(),
        stderr: stderr.into(),
        exit_code: Some(1),
    }
}

fn unquote(value: &str) -> String {
    value
        .strip_prefix('\'')
        .and_then(|inner| inner.strip_suffix('\''))
        .unwrap_or(value)
        .replace(r"'\''", "'")
}

impl FakeAdb {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_device(&self, serial: &str) {
        self.add_device_with_state(serial, "device");
    }

    pub fn add_device_with_state(&self, serial: &str, state: &str) {
        let mut guard = self.state.lock().expect("fake adb");
        guard.devices.push((serial.to_string(), state.to_string()));
    }

    pub fn install_package(&self, serial: &str, package: &str) {
        let mut guard = self.state.lock().expect("fake adb");
        guard
            .packages
            .entry(serial.to_string())
            .or_default()
            .insert(package.to_string());
    }

    pub fn set_setting(&self, serial: &str, namespace: &str, key: &str, value: &str) {
        let mut guard = self.state.lock().expect("fake adb");
        guard.settings.insert(
            (serial.to_string(), namespace.to_string(), key.to_string()),
            value.to_string(),
        );
    }

    pub fn setting(&self, serial: &str, namespace: &str, key: &str) -> Option<String> {
        let guard = self.state.lock().expect("fake adb");
        guard
            .settings
            .get(&(serial.to_string(), namespace.to_string(), key.to_string()))
            .cloned()
    }

    pub fn add_forward(&self, serial: &str, local: &str, remote: &str) {
        let mut guard = self.state.lock().expect("fake adb");
        guard
            .forwards
            .push((serial.to_string(), local.to_string(), remote.to_string()));
    }

    pub fn forwards(&self) -> Vec<(String, String, String)> {
        self.state.lock().expect("fake adb").forwards.clone()
    }

    /// Any invocation whose joined arguments contain `pattern` returns `output`.
    pub fn respond_to(&self, pattern: &str, output: CommandOutput) {
        let mut guard = self.state.lock().expect("fake adb");
        guard.responses.push((pattern.to_string(), output));
    }

    pub fn fail_on(&self, pattern: &str, stderr: &str) {
        self.respond_to(pattern, err(stderr));
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().expect("fake adb").calls.clone()
    }

    pub fn calls_matching(&self, pattern: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.contains(pattern))
            .collect()
    }

    fn dispatch(state: &mut FakeState, args: &[String]) -> CommandOutput {
        let joined = args.join(" ");
        if let Some((_, output)) = state
            .responses
            .iter()
            .find(|(pattern, _)| joined.contains(pattern.as_str()))
        {
            return output.clone();
        }

        let parts: Vec<&str> = args.iter().map(String::as_str).collect();
        match parts.as_slice() {
            ["devices", "-l"] => {
                let mut out = String::from("List of devices attached\n");
                for (index, (serial, device_state)) in state.devices.iter().enumerate() {
                    out.push_str(&format!("{serial}\t{device_state} transport_id:{}\n", index + 1));
                }
                ok(out)
            }
            ["forward", "--list"] => ok(state
                .forwards
                .iter()
                .map(|(serial, local, remote)| format!("{serial} {local} {remote}\n"))
                .collect::<String>()),
            ["pair", target, _password] => ok(format!("Successfully paired to {target} [guid=adb-FAKE]\n")),
            ["version"] => ok("Android Debug Bridge version 1.0.41\nVersion 35.0.2\n"),
            ["-s", serial, rest @ ..] => {
                let device_state = state
                    .devices
                    .iter()
                    .find(|(known, _)| known == serial)
                    .map(|(_, device_state)| device_state.clone());
                match device_state.as_deref() {
                    Some("device") => Self::dispatch_device(state, serial, rest),
                    Some("unauthorized") => err(
                        "adb: device unauthorized.\n\
                         This adb server's $ADB_VENDOR_KEYS is not set\n\
                         Try 'adb kill-server' if that seems wrong.\n\
                         Otherwise check for a confirmation dialog on your device.",
                    ),
                    Some("offline") => err("adb: device offline"),
                    Some(other) => err(format!("adb: device is {other}")),
                    None => err(format!("adb: device '{serial}' not found")),
                }
            }
            _ => err(format!("adb: unknown command {joined}")),
        }
    }

    fn dispatch_device(state: &mut FakeState, serial: &str, rest: &[&str]) -> CommandOutput {
        match rest {
            ["forward", "--remove-all"] => {
                state.forwards.retain(|(owner, _, _)| owner != serial);
                ok("")
            }
            ["forward", local, remote] => {
                // adb rebinds a local port that another device already holds.
                state.forwards.retain(|(_, bound, _)| bound != local);
                state
                    .forwards
                    .push((serial.to_string(), local.to_string(), remote.to_string()));
                ok("")
            }
            ["exec-out", "screencap", "-p"] => {
                let mut png = PNG_SIGNATURE.to_vec();
                png.extend_from_slice(b"\0\0\0\rIHDRfake-frame");
                CommandOutput {
                    stdout: png,
                    stderr: String::new(),
                    exit_code: Some(0),
                }
            }
            ["shell", "pm", "list", "packages"] => ok(state
                .packages
                .get(serial)
                .map(|packages| {
                    packages
                        .iter()
                        .map(|package| format!("package:{package}\n"))
                        .collect::<String>()
                })
                .unwrap_or_default()),
            ["shell", "settings", "get", namespace, key] => ok(format!(
                "{}\n",
                state
                    .settings
                    .get(&(serial.to_string(), namespace.to_string(), key.to_string()))
                    .cloned()
                    .unwrap_or_else(|| "null".to_string())
            )),
            ["shell", "settings", "put", namespace, key, value] => {
                state.settings.insert(
                    (serial.to_string(), namespace.to_string(), key.to_string()),
                    unquote(value),
                );
                ok("")
            }
            ["shell", "am", "start-foreground-service", component] => {
                ok(format!("Starting service: Intent {{ cmp={component} }}\n"))
            }
            _ => err(format!("adb: unsupported device command {}", rest.join(" "))),
        }
    }
}

#[async_trait]
impl CommandRunner for FakeAdb {
    fn program(&self) -> &str {
        "fake-adb"
    }

    async fn run(
        &self,
        args: &[String],
        _timeout: Duration,
        _trace_id: &str,
    ) -> Result<CommandOutput, AppError> {
        let output = {
            let mut guard = self.state.lock().expect("fake adb");
            guard.calls.push(args.join(" "));
            Self::dispatch(&mut guard, args)
        };
        tokio::task::yield_now().await;
        Ok(output)
    }
}
