//! File logging for the monitor host and the logon agent
//!
//! Both components run without a console (session 0 service, LogonUI), so
//! events go to `%ProgramData%\WinUnlock\logs\<component>.log`.

use crate::constants::{APP_DATA_DIR, MAX_LOG_BYTES};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
struct LoggerSettings {
    path: PathBuf,
    filter: String,
    enabled: bool,
}

impl LoggerSettings {
    fn from_lookup(component: &str, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let base = lookup("ProgramData").unwrap_or_else(|| ".".to_string());
        let dir = PathBuf::from(base).join(APP_DATA_DIR).join("logs");
        let path = dir.join(format!("{}.log", component));

        let verbose = lookup("WINUNLOCK_LOG_VERBOSE")
            .map(|v| v == "1")
            .unwrap_or(false);
        let filter = match lookup("RUST_LOG") {
            Some(directives) if !directives.trim().is_empty() => directives,
            _ if verbose => "debug".to_string(),
            _ => "info".to_string(),
        };

        let enabled = !lookup("WINUNLOCK_DISABLE_LOGGING")
            .map(|v| v == "1")
            .unwrap_or(false);

        Self {
            path,
            filter,
            enabled,
        }
    }
}

/// Appends each event to the log file, rotating it past [`MAX_LOG_BYTES`]
struct RotatingFile {
    path: PathBuf,
    max_bytes: u64,
}

impl RotatingFile {
    fn rotate_if_needed(&self) {
        if let Ok(meta) = fs::metadata(&self.path) {
            if meta.len() > self.max_bytes {
                let backup = self.path.with_extension("log.bak");
                let _ = fs::remove_file(&backup);
                let _ = fs::rename(&self.path, &backup);
            }
        }
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.rotate_if_needed();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

static LOG_PATH: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Install the global subscriber for `component`
///
/// Safe to call repeatedly; only the first call has an effect. LogonUI may
/// load several agent instances into one process.
///
/// Returns the log file path, or `None` when file logging is disabled.
pub fn init_logger(component: &str) -> Option<&'static Path> {
    LOG_PATH
        .get_or_init(|| {
            let settings = LoggerSettings::from_lookup(component, |key| std::env::var(key).ok());
            install(settings)
        })
        .as_deref()
}

fn install(settings: LoggerSettings) -> Option<PathBuf> {
    let filter = EnvFilter::try_new(&settings.filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = if settings.enabled {
        if let Some(dir) = settings.path.parent() {
            let _ = fs::create_dir_all(dir);
        }
        let path = settings.path.clone();
        Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(move || RotatingFile {
                    path: path.clone(),
                    max_bytes: MAX_LOG_BYTES,
                }),
        )
    } else {
        None
    };

    // Console mirror in dev builds
    let stderr_layer = cfg!(debug_assertions)
        .then(|| tracing_subscriber::fmt::layer().with_writer(io::stderr));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init();

    settings.enabled.then_some(settings.path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_path_is_under_program_data() {
        let settings =
            LoggerSettings::from_lookup("monitor", lookup(&[("ProgramData", "C:\\ProgramData")]));
        assert_eq!(
            settings.path,
            PathBuf::from("C:\\ProgramData")
                .join("WinUnlock")
                .join("logs")
                .join("monitor.log")
        );
        assert_eq!(settings.filter, "info");
        assert!(settings.enabled);
    }

    #[test]
    fn test_missing_program_data_falls_back_to_current_dir() {
        let settings = LoggerSettings::from_lookup("agent", lookup(&[]));
        assert!(settings.path.starts_with("."));
    }

    #[test]
    fn test_verbose_and_rust_log_select_filter() {
        let verbose =
            LoggerSettings::from_lookup("agent", lookup(&[("WINUNLOCK_LOG_VERBOSE", "1")]));
        assert_eq!(verbose.filter, "debug");

        let explicit = LoggerSettings::from_lookup(
            "agent",
            lookup(&[("WINUNLOCK_LOG_VERBOSE", "1"), ("RUST_LOG", "winunlock=trace")]),
        );
        assert_eq!(explicit.filter, "winunlock=trace");
    }

    #[test]
    fn test_logging_can_be_disabled() {
        let settings =
            LoggerSettings::from_lookup("agent", lookup(&[("WINUNLOCK_DISABLE_LOGGING", "1")]));
        assert!(!settings.enabled);
    }

    #[test]
    fn test_writes_append_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.log");
        let mut file = RotatingFile {
            path: path.clone(),
            max_bytes: MAX_LOG_BYTES,
        };
        file.write_all(b"first\n").unwrap();
        file.write_all(b"second\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_oversized_file_is_rotated_to_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.log");
        fs::write(&path, vec![b'x'; 64]).unwrap();

        let mut file = RotatingFile {
            path: path.clone(),
            max_bytes: 32,
        };
        file.write_all(b"fresh\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "fresh\n");
        let backup = dir.path().join("monitor.log.bak");
        assert_eq!(fs::read(&backup).unwrap().len(), 64);
    }
}
