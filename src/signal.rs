//! Cancellation for pipeline runs.
//!
//! A [`CancelToken`] is shared by every worker unit. It trips when Ctrl+C
//! sets the shared flag or when an optional deadline passes. Units check
//! the token before starting work; units already running are allowed to
//! finish.
//!
//! ```rust,no_run
//! use chunksim::signal::install_handler;
//! use std::time::Duration;
//!
//! let handler = install_handler().expect("Failed to install signal handler");
//! let token = handler.token().with_timeout(Duration::from_secs(30));
//! assert!(!token.is_cancelled());
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// Why a run stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// Ctrl+C or an explicit [`CancelToken::cancel`].
    Interrupted,
    /// The configured deadline passed.
    TimedOut,
}

/// Shared stop signal checked by worker units.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// A token that only trips when [`cancel`](Self::cancel) is called.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A token backed by an existing flag (e.g. the Ctrl+C flag).
    #[must_use]
    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self {
            flag,
            deadline: None,
        }
    }

    /// Trip the token once `timeout` has elapsed from now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// True once the flag is set or the deadline has passed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// The reason the token tripped, if it has.
    ///
    /// An explicit cancel wins over an expired deadline.
    #[must_use]
    pub fn reason(&self) -> Option<CancelReason> {
        if self.flag.load(Ordering::SeqCst) {
            Some(CancelReason::Interrupted)
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(CancelReason::TimedOut)
        } else {
            None
        }
    }
}

/// Process-wide Ctrl+C flag.
///
/// `ShutdownHandler` is `Send` and `Sync`; clones share the same flag.
#[derive(Debug, Clone)]
pub struct ShutdownHandler {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandler {
    /// Create a new shutdown handler with the flag initially set to `false`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Manually request a shutdown.
    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Reset the flag to `false`.
    ///
    /// Used when a process runs several pipelines (tests mostly).
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// A cancel token observing this handler's flag.
    #[must_use]
    pub fn token(&self) -> CancelToken {
        CancelToken::from_flag(Arc::clone(&self.flag))
    }
}

impl Default for ShutdownHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Error type for signal handler installation.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Failed to install the Ctrl+C handler.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

static GLOBAL_HANDLER: OnceLock<ShutdownHandler> = OnceLock::new();

/// Install a Ctrl+C handler that sets the shutdown flag on interrupt.
///
/// Repeated calls return the already-installed handler with its flag reset,
/// so several runs in one process (tests) can each call `run_app()`.
///
/// # Errors
///
/// Never fails in practice: if the ctrlc hook was registered elsewhere an
/// unhooked handler is returned instead.
pub fn install_handler() -> Result<ShutdownHandler, SignalError> {
    if let Some(handler) = GLOBAL_HANDLER.get() {
        handler.reset();
        return Ok(handler.clone());
    }

    let handler = ShutdownHandler::new();
    let flag = Arc::clone(&handler.flag);

    match ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);

        let _ = writeln!(std::io::stderr(), "\nInterrupted. Finishing in-flight work...");
        let _ = std::io::stderr().flush();

        log::info!("Shutdown signal received");
    }) {
        Ok(()) => {
            let _ = GLOBAL_HANDLER.set(handler.clone());
            Ok(handler)
        }
        Err(_) => {
            if let Some(handler) = GLOBAL_HANDLER.get() {
                handler.reset();
                Ok(handler.clone())
            } else {
                log::debug!("Ctrl+C handler already registered, using unhooked handler");
                let fallback = ShutdownHandler::new();
                let _ = GLOBAL_HANDLER.set(fallback.clone());
                Ok(fallback)
            }
        }
    }
}
