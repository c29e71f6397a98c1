use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub(crate) fn lock_or_recover<'a, T>(lock: &'a Mutex<T>, context: &str) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            crate::log_debug(&format!("Mutex poisoned in {context}; recovering"));
            poisoned.into_inner()
        }
    }
}

/// Outcome of a bounded join on a worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    Panicked,
    /// The thread was still running at the deadline and has been detached.
    Abandoned,
}

/// Join `handle`, giving up after `timeout`. An abandoned thread keeps running
/// detached; callers are expected to have signalled it to stop already.
pub(crate) fn join_with_timeout<T>(
    handle: JoinHandle<T>,
    timeout: Duration,
    poll: Duration,
) -> JoinOutcome {
    let deadline = Instant::now() + timeout;
    loop {
        if handle.is_finished() {
            return match handle.join() {
                Ok(_) => JoinOutcome::Joined,
                Err(_) => JoinOutcome::Panicked,
            };
        }
        let now = Instant::now();
        if now >= deadline {
            return JoinOutcome::Abandoned;
        }
        thread::sleep(poll.min(deadline - now));
    }
}

/// Which kind of resource a claim guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ClaimKind {
    Capture,
    Recognition,
}

static CLAIMS: OnceLock<Mutex<HashSet<(ClaimKind, String)>>> = OnceLock::new();

fn claims() -> &'static Mutex<HashSet<(ClaimKind, String)>> {
    CLAIMS.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Process-wide exclusive hold on a named resource. Released on drop.
#[derive(Debug)]
pub(crate) struct ExclusiveClaim {
    kind: ClaimKind,
    name: String,
}

impl ExclusiveClaim {
    /// Returns `None` when another holder already owns `(kind, name)`.
    pub(crate) fn acquire(kind: ClaimKind, name: &str) -> Option<Self> {
        let mut held = lock_or_recover(claims(), "ExclusiveClaim::acquire");
        if !held.insert((kind, name.to_string())) {
            return None;
        }
        Some(Self {
            kind,
            name: name.to_string(),
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    #[cfg(test)]
    pub(crate) fn is_held(kind: ClaimKind, name: &str) -> bool {
        lock_or_recover(claims(), "ExclusiveClaim::is_held").contains(&(kind, name.to_string()))
    }
}

impl Drop for ExclusiveClaim {
    fn drop(&mut self) {
        let mut held = lock_or_recover(claims(), "ExclusiveClaim::drop");
        held.remove(&(self.kind, std::mem::take(&mut self.name)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn claim_is_exclusive_until_dropped() {
        let first = ExclusiveClaim::acquire(ClaimKind::Capture, "lock-test-mic")
            .expect("first claim succeeds");
        assert!(ExclusiveClaim::acquire(ClaimKind::Capture, "lock-test-mic").is_none());
        // Same name under a different kind is a separate resource.
        let other = ExclusiveClaim::acquire(ClaimKind::Recognition, "lock-test-mic");
        assert!(other.is_some());
        drop(first);
        assert!(!ExclusiveClaim::is_held(ClaimKind::Capture, "lock-test-mic"));
        assert!(ExclusiveClaim::acquire(ClaimKind::Capture, "lock-test-mic").is_some());
    }

    #[test]
    fn join_with_timeout_joins_finished_thread() {
        let handle = thread::spawn(|| 7);
        let outcome = join_with_timeout(
            handle,
            Duration::from_millis(500),
            Duration::from_millis(5),
        );
        assert_eq!(outcome, JoinOutcome::Joined);
    }

    #[test]
    fn join_with_timeout_abandons_stuck_thread() {
        let release = Arc::new(AtomicBool::new(false));
        let flag = release.clone();
        let handle = thread::spawn(move || {
            while !flag.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(5));
            }
        });
        let start = Instant::now();
        let outcome = join_with_timeout(
            handle,
            Duration::from_millis(60),
            Duration::from_millis(5),
        );
        assert_eq!(outcome, JoinOutcome::Abandoned);
        assert!(start.elapsed() < Duration::from_millis(500));
        release.store(true, Ordering::Relaxed);
    }

    #[test]
    fn join_with_timeout_reports_panics() {
        let handle = thread::spawn(|| panic!("worker exploded"));
        let outcome = join_with_timeout(handle, Duration::from_secs(2), Duration::from_millis(5));
        assert_eq!(outcome, JoinOutcome::Panicked);
    }
}
