pub mod agent;
pub mod audio;
pub mod backend;
pub mod config;
pub mod error;
pub mod input;
pub mod interrupt;
mod lock;
pub mod logging;
pub mod playback;
pub mod recognition;
pub mod scenario;
pub mod stt;
mod telemetry;
pub mod turn;
#[cfg(feature = "vad_earshot")]
pub mod vad_earshot;

#[cfg(test)]
mod testing;

pub(crate) use lock::lock_or_recover;
pub use logging::{
    crash_log_path, init_logging, log_debug, log_debug_content, log_file_path, log_panic,
    log_timing, LogSettings,
};
pub use telemetry::init_tracing;
