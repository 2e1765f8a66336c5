use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    Connected,
    Offline,
    Unauthorized,
    Unknown,
}

impl DeviceState {
    pub fn from_adb(value: &str) -> Self {
        match value.trim() {
            "device" => Self::Connected,
            "offline" => Self::Offline,
            "unauthorized" => Self::Unauthorized,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Device {
    pub serial: String,
    pub state: DeviceState,
    pub model: Option<String>,
    pub product: Option<String>,
    pub device: Option<String>,
    pub transport_id: Option<String>,
}

impl Device {
    pub fn is_connected(&self) -> bool {
        self.state == DeviceState::Connected
    }
}

/// Local and remote endpoints in adb notation, e.g. `tcp:38301`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ForwardSpec {
    pub local: String,
    pub remote: String,
}

impl ForwardSpec {
    pub fn new(local: impl Into<String>, remote: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            remote: remote.into(),
        }
    }
}

impl fmt::Display for ForwardSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.local, self.remote)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForwardEntry {
    pub serial: String,
    pub spec: ForwardSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DiscoveryCandidate {
    pub address: String,
    pub port: u16,
}

impl DiscoveryCandidate {
    pub fn target(&self) -> String {
        if self.address.contains(':') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapStep {
    AppCheck,
    AccessibilityEnable,
    ServiceStart,
    ForwardEstablish,
    Done,
}

impl fmt::Display for BootstrapStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AppCheck => "app_check",
            Self::AccessibilityEnable => "accessibility_enable",
            Self::ServiceStart => "service_start",
            Self::ForwardEstablish => "forward_establish",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BootstrapResult {
    AccessibilityServiceEnabled,
    AlreadyEnabled,
    ServiceStarted,
    AppNotInstalled,
    ForwardEstablished { spec: ForwardSpec },
    StepFailed { step: BootstrapStep, cause: String },
}

/// Everything the bootstrap sequence observed, in order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BootstrapReport {
    pub serial: String,
    pub results: Vec<BootstrapResult>,
    pub forward: Option<ForwardSpec>,
}

impl BootstrapReport {
    pub fn succeeded(&self) -> bool {
        self.forward.is_some()
    }

    pub fn app_missing(&self) -> bool {
        self.results.contains(&BootstrapResult::AppNotInstalled)
    }

    pub fn failed_steps(&self) -> Vec<BootstrapStep> {
        self.results
            .iter()
            .filter_map(|result| match result {
                BootstrapResult::StepFailed { step, .. } => Some(*step),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PairingSession {
    pub network_name: String,
    pub descriptor: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdbInfo {
    pub available: bool,
    pub version_output: String,
    pub command_path: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandResponse<T> {
    pub trace_id: String,
    pub data: T,
}
