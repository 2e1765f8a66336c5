//! Request/response operations offered to the UI layer.

use tracing::{info, warn};
use uuid::Uuid;

use crate::app::discovery::DiscoveryOutcome;
use crate::app::error::AppError;
use crate::app::models::{AdbInfo, BootstrapReport, CommandResponse, Device, PairingSession};
use crate::app::screenshot::png_bytes_to_base64;
use crate::app::state::AppState;


fn resolve_trace_id(input: Option<String>) -> String {
    input
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn ensure_non_empty(value: &str, field: &str, trace_id: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("{field} is required"), trace_id));
    }
    Ok(())
}

pub async fn check_adb(
    state: &AppState,
    trace_id: Option<String>,
) -> Result<CommandResponse<AdbInfo>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "check_adb");

    let services = state.services(&trace_id)?;
    let data = match services.client.version(&trace_id).await {
        Ok(version_output) => AdbInfo {
            available: true,
            version_output,
            command_path: services.adb_program.clone(),
            error: None,
        },
        Err(err) => AdbInfo {
            available: false,
            version_output: String::new(),
            command_path: services.adb_program.clone(),
            error: Some(err.error),
        },
    };
    Ok(CommandResponse { trace_id, data })
}

pub async fn list_devices(
    state: &AppState,
    trace_id: Option<String>,
) -> Result<CommandResponse<Vec<Device>>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "list_devices");

    let services = state.services(&trace_id)?;
    let devices = services.client.list_devices(&trace_id).await?;
    Ok(CommandResponse {
        trace_id,
        data: devices,
    })
}

/// Base64-encoded PNG of the device screen.
pub async fn capture_screenshot(
    state: &AppState,
    serial: String,
    trace_id: Option<String>,
) -> Result<CommandResponse<String>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    ensure_non_empty(&serial, "serial", &trace_id)?;
    info!(trace_id = %trace_id, serial = %serial, "capture_screenshot");

    let services = state.services(&trace_id)?;
    let bytes = services.client.screenshot(&serial, &trace_id).await?;
    let encoded =
        png_bytes_to_base64(&bytes).map_err(|message| AppError::system(message, &trace_id))?;
    Ok(CommandResponse {
        trace_id,
        data: encoded,
    })
}

pub async fn is_app_installed(
    state: &AppState,
    serial: String,
    trace_id: Option<String>,
) -> Result<CommandResponse<bool>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    ensure_non_empty(&serial, "serial", &trace_id)?;
    info!(trace_id = %trace_id, serial = %serial, "is_app_installed");

    let services = state.services(&trace_id)?;
    let installed = services
        .bootstrapper
        .is_app_installed(&serial, &trace_id)
        .await?;
    Ok(CommandResponse {
        trace_id,
        data: installed,
    })
}

/// Connected devices only; unauthorized or offline devices reject forward commands and cannot
/// hold forwards, while `forward --list` still names every device that does.
async fn known_serials(state: &AppState, fallback: &str, trace_id: &str) -> Result<Vec<String>, AppError> {
    let services = state.services(trace_id)?;
    match services.client.list_devices(trace_id).await {
        Ok(devices) => Ok(devices
            .into_iter()
            .filter(|device| device.is_connected())
            .map(|device| device.serial)
            .collect()),
        Err(err) => {
            // `forward --list` still covers devices holding forwards.
            warn!(trace_id = %trace_id, error = %err, "device listing failed; clearing forwards from the forward table only");
            Ok(if fallback.is_empty() {
                Vec::new()
            } else {
                vec![fallback.to_string()]
            })
        }
    }
}

/// Runs the companion bootstrap for `serial` and opens the forward.
pub async fn bootstrap_and_forward(
    state: &AppState,
    serial: String,
    trace_id: Option<String>,
) -> Result<CommandResponse<BootstrapReport>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    ensure_non_empty(&serial, "serial", &trace_id)?;
    info!(trace_id = %trace_id, serial = %serial, "bootstrap_and_forward");

    let services = state.services(&trace_id)?;
    let known = known_serials(state, &serial, &trace_id).await?;
    let report = services.bootstrapper.run(&known, &serial, &trace_id).await;
    Ok(CommandResponse {
        trace_id,
        data: report,
    })
}

pub async fn teardown_forwards(
    state: &AppState,
    trace_id: Option<String>,
) -> Result<CommandResponse<bool>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "teardown_forwards");

    let services = state.services(&trace_id)?;
    let known = known_serials(state, "", &trace_id).await?;
    services.forwards.teardown_all(&known, &trace_id).await?;
    Ok(CommandResponse {
        trace_id,
        data: true,
    })
}

/// Returns the pairing descriptor to render as a QR code; the search continues in the background.
pub async fn start_wireless_pairing(
    state: &AppState,
    trace_id: Option<String>,
) -> Result<CommandResponse<PairingSession>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "start_wireless_pairing");

    let services = state.services(&trace_id)?;
    let session = services.discovery.start(&trace_id)?;
    Ok(CommandResponse {
        trace_id,
        data: session,
    })
}

pub async fn stop_wireless_pairing(
    state: &AppState,
    trace_id: Option<String>,
) -> Result<CommandResponse<bool>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "stop_wireless_pairing");

    let services = state.services(&trace_id)?;
    let was_active = services.discovery.stop();
    Ok(CommandResponse {
        trace_id,
        data: was_active,
    })
}

pub async fn is_wireless_pairing_active(
    state: &AppState,
    trace_id: Option<String>,
) -> Result<CommandResponse<bool>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    let services = state.services(&trace_id)?;
    Ok(CommandResponse {
        trace_id,
        data: services.discovery.is_active(),
    })
}

/// Resolves when the current pairing session ends.
pub async fn wait_wireless_pairing(
    state: &AppState,
    trace_id: Option<String>,
) -> Result<CommandResponse<Option<DiscoveryOutcome>>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    let services = state.services(&trace_id)?;
    let outcome = services.discovery.wait().await;
    Ok(CommandResponse {
        trace_id,
        data: outcome,
    })
}
