//! Opt-in debug file logging and the crash hook.
//!
//! Everything here is silent unless `--logs` or `--log-timings` is passed, so the
//! console stays reserved for the conversation itself.

use crate::config::AppConfig;
use std::{
    env, fs,
    io::Write,
    panic,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, OnceLock,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

const LOG_MAX_BYTES: u64 = 5 * 1024 * 1024;
const CRASH_LOG_MAX_BYTES: u64 = 256 * 1024;
static LOG_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_CONTENT_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_TIMINGS_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_SINK: OnceLock<Mutex<Option<RotatingFile>>> = OnceLock::new();

/// Path of the rotating debug log.
pub fn log_file_path() -> PathBuf {
    env::var("WALKIE_LOG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| env::temp_dir().join("walkie.log"))
}

/// Path of the crash log (metadata only unless content logging is on).
pub fn crash_log_path() -> PathBuf {
    env::temp_dir().join("walkie_crash.log")
}

/// Which log streams a run has switched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogSettings {
    pub enabled: bool,
    pub content: bool,
    pub timings: bool,
}

impl LogSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let enabled = (config.logs || config.log_timings) && !config.no_logs;
        Self {
            enabled,
            content: enabled && config.log_content,
            timings: enabled && config.log_timings,
        }
    }
}

struct RotatingFile {
    path: PathBuf,
    file: fs::File,
    max_bytes: u64,
    written: u64,
}

impl RotatingFile {
    fn open(path: PathBuf, max_bytes: u64) -> Option<Self> {
        let mut written = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        if written > max_bytes {
            let _ = fs::remove_file(&path);
            written = 0;
        }
        let file = append_handle(&path)?;
        Some(Self {
            path,
            file,
            max_bytes,
            written,
        })
    }

    fn write_line(&mut self, line: &str) {
        if self.written.saturating_add(line.len() as u64) > self.max_bytes {
            if let Some(file) = truncate_handle(&self.path) {
                self.file = file;
                self.written = 0;
            }
        }
        if self.file.write_all(line.as_bytes()).is_ok() {
            self.written = self.written.saturating_add(line.len() as u64);
        }
    }
}

fn append_handle(path: &Path) -> Option<fs::File> {
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .ok()
}

fn truncate_handle(path: &Path) -> Option<fs::File> {
    fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .ok()
}

fn sink() -> &'static Mutex<Option<RotatingFile>> {
    LOG_SINK.get_or_init(|| Mutex::new(None))
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn apply_settings(settings: LogSettings) {
    LOG_ENABLED.store(settings.enabled, Ordering::Relaxed);
    LOG_CONTENT_ENABLED.store(settings.content, Ordering::Relaxed);
    LOG_TIMINGS_ENABLED.store(settings.timings, Ordering::Relaxed);
    let mut slot = sink().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    *slot = if settings.enabled {
        RotatingFile::open(log_file_path(), LOG_MAX_BYTES)
    } else {
        None
    };
}

/// Configure file logging from CLI flags.
pub fn init_logging(config: &AppConfig) {
    apply_settings(LogSettings::from_config(config));
}

/// Append a debug line to the log file when logging is enabled.
pub fn log_debug(msg: &str) {
    if !LOG_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let line = format!("[{}] {msg}\n", unix_seconds());
    let mut slot = sink().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(file) = slot.as_mut() {
        file.write_line(&line);
    }
}

/// Log lines that may include what the operator said or what the agent replied.
pub fn log_debug_content(msg: &str) {
    if !LOG_CONTENT_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    log_debug(msg);
}

/// `timing|phase=...|ms=...` line, only with `--log-timings`.
pub fn log_timing(phase: &str, elapsed: Duration) {
    if !LOG_TIMINGS_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    log_debug(&format!("timing|phase={phase}|ms={}", elapsed.as_millis()));
}

/// Minimal crash record. Panic payloads may echo user text, so they are omitted
/// unless content logging was requested.
pub fn log_panic(info: &panic::PanicHookInfo<'_>) {
    if !LOG_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let location = info
        .location()
        .map(|loc| format!("{}:{}", loc.file(), loc.line()))
        .unwrap_or_else(|| "unknown".to_string());
    let payload = if LOG_CONTENT_ENABLED.load(Ordering::Relaxed) {
        panic_payload_text(info)
    } else {
        "payload omitted (log-content disabled)".to_string()
    };
    let line = format!(
        "[{}] panic at {location}: {payload} (v{})\n",
        unix_seconds(),
        env!("CARGO_PKG_VERSION")
    );

    let path = crash_log_path();
    let existing = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
    let handle = if existing.saturating_add(line.len() as u64) > CRASH_LOG_MAX_BYTES {
        truncate_handle(&path)
    } else {
        append_handle(&path)
    };
    if let Some(mut file) = handle {
        let _ = file.write_all(line.as_bytes());
    }
}

fn panic_payload_text(info: &panic::PanicHookInfo<'_>) -> String {
    if let Some(text) = info.payload().downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = info.payload().downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
