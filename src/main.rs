use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use accessibility_inspector_rust_lib::app::commands::{
    bootstrap_and_forward, capture_screenshot, check_adb, is_app_installed, list_devices,
    start_wireless_pairing, stop_wireless_pairing, teardown_forwards, wait_wireless_pairing,
};
use accessibility_inspector_rust_lib::app::config::load_config;
use accessibility_inspector_rust_lib::app::logging::init_logging;
use accessibility_inspector_rust_lib::app::state::AppState;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Local;
use serde::Serialize;
use uuid::Uuid;

const USAGE: &str = "Usage: accessibility_inspector_rust [--json] [--serial SERIAL] <command>\n\
Commands:\n  \
  check                 adb availability and version\n  \
  devices               list connected devices\n  \
  screenshot [--out F]  capture the device screen as PNG\n  \
  installed             is the companion app installed\n  \
  bootstrap             enable the companion service and open the forward\n  \
  teardown              remove forwards on every device\n  \
  pair                  advertise a pairing code and pair the first device found\n";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Check,
    Devices,
    Screenshot { out: Option<PathBuf> },
    Installed,
    Bootstrap,
    Teardown,
    Pair,
}

#[derive(Debug, Clone)]
struct Args {
    command: Command,
    serial: Option<String>,
    json: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut serial = std::env::var("ANDROID_SERIAL")
        .ok()
        .filter(|s| !s.trim().is_empty());
    let mut json = false;
    let mut out: Option<PathBuf> = None;
    let mut command_name: Option<String> = None;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--serial" => {
                serial = it
                    .next()
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty());
                if serial.is_none() {
                    return Err("--serial requires a value".to_string());
                }
            }
            "--out" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--out requires a value".to_string())?;
                out = Some(PathBuf::from(value));
            }
            "--json" => {
                json = true;
            }
            "-h" | "--help" => return Err(USAGE.to_string()),
            other if other.starts_with('-') => return Err(format!("Unknown arg: {other}")),
            other => {
                if command_name.is_some() {
                    return Err(format!("Unexpected argument: {other}"));
                }
                command_name = Some(other.to_string());
            }
        }
    }

    let command = match command_name.as_deref() {
        Some("check") => Command::Check,
        Some("devices") => Command::Devices,
        Some("screenshot") => Command::Screenshot { out },
        Some("installed") => Command::Installed,
        Some("bootstrap") => Command::Bootstrap,
        Some("teardown") => Command::Teardown,
        Some("pair") => Command::Pair,
        Some(other) => return Err(format!("Unknown command: {other}\n{USAGE}")),
        None => return Err(USAGE.to_string()),
    };

    Ok(Args {
        command,
        serial,
        json,
    })
}

fn emit<T: Serialize + std::fmt::Debug>(json: bool, value: &T) {
    if json {
        match serde_json::to_string_pretty(value) {
            Ok(text) => println!("{text}"),
            Err(err) => eprintln!("Failed to serialize output: {err}"),
        }
    } else {
        println!("{value:#?}");
    }
}

async fn pick_single_device(state: &AppState, trace_id: &str) -> Result<String, String> {
    let devices = list_devices(state, Some(trace_id.to_string()))
        .await
        .map_err(|err| err.to_string())?
        .data;
    let online: Vec<_> = devices.into_iter().filter(|d| d.is_connected()).collect();
    match online.as_slice() {
        [] => Err("No online adb devices found.".to_string()),
        [only] => Ok(only.serial.clone()),
        many => {
            let serials = many
                .iter()
                .map(|d| d.serial.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            Err(format!(
                "Multiple online devices found ({serials}). Set ANDROID_SERIAL or pass --serial."
            ))
        }
    }
}

async fn resolve_serial(args: &Args, state: &AppState, trace_id: &str) -> Result<String, String> {
    match &args.serial {
        Some(serial) => Ok(serial.clone()),
        None => pick_single_device(state, trace_id).await,
    }
}

async fn run(args: Args, state: &AppState, trace_id: String) -> Result<(), String> {
    let trace = Some(trace_id.clone());
    match &args.command {
        Command::Check => {
            let response = check_adb(state, trace).await.map_err(|err| err.to_string())?;
            emit(args.json, &response);
        }
        Command::Devices => {
            let response = list_devices(state, trace).await.map_err(|err| err.to_string())?;
            emit(args.json, &response);
        }
        Command::Screenshot { out } => {
            let serial = resolve_serial(&args, state, &trace_id).await?;
            let response = capture_screenshot(state, serial.clone(), trace)
                .await
                .map_err(|err| err.to_string())?;
            let path = out.clone().unwrap_or_else(|| {
                let safe_serial: String = serial
                    .chars()
                    .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                    .collect();
                PathBuf::from(format!(
                    "screenshot_{safe_serial}_{}.png",
                    Local::now().format("%Y%m%d_%H%M%S")
                ))
            });
            let bytes = STANDARD
                .decode(response.data.as_bytes())
                .map_err(|err| format!("Failed to decode screenshot: {err}"))?;
            fs::write(&path, bytes)
                .map_err(|err| format!("Failed to write {}: {err}", path.display()))?;
            println!("{}", path.display());
        }
        Command::Installed => {
            let serial = resolve_serial(&args, state, &trace_id).await?;
            let response = is_app_installed(state, serial, trace)
                .await
                .map_err(|err| err.to_string())?;
            emit(args.json, &response);
        }
        Command::Bootstrap => {
            let serial = resolve_serial(&args, state, &trace_id).await?;
            let response = bootstrap_and_forward(state, serial, trace)
                .await
                .map_err(|err| err.to_string())?;
            let succeeded = response.data.succeeded();
            emit(args.json, &response);
            if !succeeded {
                return Err("Bootstrap did not establish a forward".to_string());
            }
        }
        Command::Teardown => {
            let response = teardown_forwards(state, trace)
                .await
                .map_err(|err| err.to_string())?;
            emit(args.json, &response);
        }
        Command::Pair => {
            let session = start_wireless_pairing(state, trace.clone())
                .await
                .map_err(|err| err.to_string())?;
            println!("Scan with Android \"Pair device with QR code\":");
            println!("{}", session.data.descriptor);

            let wait = wait_wireless_pairing(state, trace.clone());
            tokio::pin!(wait);
            let outcome = tokio::select! {
                outcome = &mut wait => outcome,
                _ = tokio::signal::ctrl_c() => {
                    let _ = stop_wireless_pairing(state, trace).await;
                    wait.await
                }
            }
            .map_err(|err| err.to_string())?;
            emit(args.json, &outcome);
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(2);
        }
    };

    let trace_id = Uuid::new_v4().to_string();
    let config = match load_config(&trace_id) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.logging.log_level);

    let state = AppState::new();
    if let Err(err) = state.initialize(&config, &trace_id) {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }

    match run(args, &state, trace_id).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}
