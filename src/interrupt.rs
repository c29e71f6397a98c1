//! Operator interrupt: Ctrl-C / SIGTERM raise a shared flag the loop polls.
//!
//! A second Ctrl-C while the flag is still raised exits the process at once,
//! for the case where an abort itself hangs.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Exit status used when the second Ctrl-C terminates the process.
pub const FORCED_EXIT_CODE: i32 = 130;

/// Cloneable view of the process interrupt flag.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register SIGINT/SIGTERM handlers that raise this flag.
    #[cfg(unix)]
    pub fn install(&self) -> io::Result<()> {
        use signal_hook::consts::{SIGINT, SIGTERM};
        use signal_hook::flag;

        // Registered first so it sees the flag before this signal raises it.
        flag::register_conditional_shutdown(SIGINT, FORCED_EXIT_CODE, self.flag.clone())?;
        flag::register(SIGINT, self.flag.clone())?;
        flag::register(SIGTERM, self.flag.clone())?;
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn install(&self) -> io::Result<()> {
        Ok(())
    }

    pub fn raise(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    pub fn flag(&self) -> &AtomicBool {
        &self.flag
    }
}
