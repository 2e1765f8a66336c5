use std::path::Path;

use crate::app::config::AdbSettings;

pub const ADB_BIN: &str = if cfg!(windows) { "adb.exe" } else { "adb" };

pub fn normalize_command_path(value: &str) -> String {
    let trimmed = value.trim();
    if let Some(inner) = trimmed
        .strip_prefix('"')
        .and_then(|candidate| candidate.strip_suffix('"'))
    {
        return inner.trim().to_string();
    }
    if let Some(inner) = trimmed
        .strip_prefix('\'')
        .and_then(|candidate| candidate.strip_suffix('\''))
    {
        return inner.trim().to_string();
    }
    trimmed.to_string()
}

/// Explicit command path, then the bundled binary under `base_dir`, then `adb` from PATH.
pub fn resolve_adb_program(settings: &AdbSettings) -> String {
    let command_path = normalize_command_path(&settings.command_path);
    if !command_path.is_empty() {
        return command_path;
    }
    let base_dir = normalize_command_path(&settings.base_dir);
    if !base_dir.is_empty() {
        return Path::new(&base_dir).join(ADB_BIN).to_string_lossy().to_string();
    }
    "adb".to_string()
}

pub fn validate_adb_program(program: &str) -> Result<(), String> {
    if program.trim().is_empty() {
        return Err("ADB command is empty".to_string());
    }
    if program == "adb" {
        return Ok(());
    }
    let path = Path::new(program);
    if path.is_dir() {
        return Err("ADB path must point to an executable file".to_string());
    }
    if !path.exists() {
        return Err("ADB executable not found at the configured path".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(command_path: &str, base_dir: &str) -> AdbSettings {
        AdbSettings {
            command_path: command_path.to_string(),
            base_dir: base_dir.to_string(),
            ..AdbSettings::default()
        }
    }

    #[test]
    fn strips_wrapping_quotes() {
        assert_eq!(
            normalize_command_path("  \"/opt/android/platform-tools/adb\"  "),
            "/opt/android/platform-tools/adb"
        );
        assert_eq!(
            normalize_command_path("  '/opt/android/platform-tools/adb'  "),
            "/opt/android/platform-tools/adb"
        );
    }

    #[test]
    fn command_path_wins_over_base_dir() {
        assert_eq!(
            resolve_adb_program(&settings("/usr/local/bin/adb", "/opt/assets/adb")),
            "/usr/local/bin/adb"
        );
    }

    #[test]
    fn base_dir_resolves_platform_binary() {
        let resolved = resolve_adb_program(&settings("", "/opt/assets/adb"));
        let expected = Path::new("/opt/assets/adb").join(ADB_BIN);
        assert_eq!(resolved, expected.to_string_lossy());
    }

    #[test]
    fn resolves_empty_to_default_adb() {
        assert_eq!(resolve_adb_program(&settings("", "")), "adb");
        assert_eq!(resolve_adb_program(&settings("   ", "  ")), "adb");
    }

    #[test]
    fn validates_nonexistent_path() {
        let err = validate_adb_program("/this/path/should/not/exist/adb").unwrap_err();
        assert!(err.to_lowercase().contains("not found"));
    }

    #[test]
    fn rejects_directory() {
        let tmp = tempfile::TempDir::new().expect("tmp");
        let err = validate_adb_program(&tmp.path().to_string_lossy()).unwrap_err();
        assert!(err.contains("executable file"));
    }
}
