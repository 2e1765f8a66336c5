use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::app::adb::runner::CommandOutput;
use crate::app::models::{Device, DeviceState, ForwardEntry, ForwardSpec};

fn error_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(error|failed|unable)\b").expect("error marker regex"))
}

fn device_missing_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(device '[^']*' not found|device offline|device not found|no devices/emulators found)")
            .expect("device missing regex")
    })
}

pub fn parse_adb_devices(output: &str) -> Vec<Device> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !line.trim_start().starts_with('*'))
        .filter(|line| !line.to_lowercase().contains("list of devices"))
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 2 {
                return None;
            }
            let mut device = Device {
                serial: tokens[0].to_string(),
                state: DeviceState::from_adb(tokens[1]),
                model: None,
                product: None,
                device: None,
                transport_id: None,
            };
            for token in tokens.iter().skip(2) {
                if let Some(value) = token.strip_prefix("model:") {
                    device.model = Some(value.to_string());
                } else if let Some(value) = token.strip_prefix("product:") {
                    device.product = Some(value.to_string());
                } else if let Some(value) = token.strip_prefix("device:") {
                    device.device = Some(value.to_string());
                } else if let Some(value) = token.strip_prefix("transport_id:") {
                    device.transport_id = Some(value.to_string());
                }
            }
            Some(device)
        })
        .collect()
}

/// `adb forward --list` prints `SERIAL LOCAL REMOTE` per line.
pub fn parse_forward_list(output: &str) -> Vec<ForwardEntry> {
    output
        .lines()
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let serial = tokens.next()?;
            let local = tokens.next()?;
            let remote = tokens.next()?;
            Some(ForwardEntry {
                serial: serial.to_string(),
                spec: ForwardSpec::new(local, remote),
            })
        })
        .collect()
}

pub fn parse_package_list(output: &str) -> HashSet<String> {
    output
        .lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix("package:"))
        .map(|payload| match payload.rsplit_once('=') {
            // `pm list packages -f` form: package:/path/base.apk=com.example
            Some((_, pkg)) => pkg.trim(),
            None => payload.trim(),
        })
        .filter(|pkg| !pkg.is_empty())
        .map(str::to_string)
        .collect()
}

/// `settings get` prints the literal `null` for unset keys.
pub fn parse_setting_value(output: &str) -> Option<String> {
    let value = output.trim();
    if value.is_empty() || value == "null" {
        None
    } else {
        Some(value.to_string())
    }
}

pub fn has_error_marker(text: &str) -> bool {
    error_marker().is_match(text)
}

pub fn mentions_missing_device(text: &str) -> bool {
    device_missing_marker().is_match(text)
}

/// Non-zero exit, or stderr with nothing on stdout.
pub fn status_indicates_failure(output: &CommandOutput) -> bool {
    if !output.success() {
        return true;
    }
    output.stdout.iter().all(u8::is_ascii_whitespace) && !output.stderr.trim().is_empty()
}

/// Status failure, or an error marker anywhere in the output. Only meaningful for commands whose
/// stdout is a status message rather than data.
pub fn output_indicates_failure(output: &CommandOutput) -> bool {
    status_indicates_failure(output)
        || has_error_marker(&output.stdout_text())
        || has_error_marker(&output.stderr)
}
