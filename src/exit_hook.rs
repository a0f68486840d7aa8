use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Ctrl+C handling for a long run.
///
/// The first Ctrl+C only raises a flag; the run loop checks it between pairs
/// and shuts the browser down cleanly. A second Ctrl+C exits immediately.
#[derive(Debug, Clone, Default)]
pub struct ExitHook {
    interrupted: Arc<AtomicBool>,
}

impl ExitHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the process-wide Ctrl+C handler. Can only succeed once per process.
    pub fn register(&self) -> Result<(), ctrlc::Error> {
        let flag = self.interrupted.clone();
        ctrlc::set_handler(move || {
            if flag.swap(true, Ordering::SeqCst) {
                eprintln!("Interrupted twice, exiting now");
                std::process::exit(130);
            }
            log::warn!("Interrupted: stopping after the current page (Ctrl+C again to abort)");
        })
    }

    /// Requests a stop, as the first Ctrl+C would.
    pub fn trigger(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_is_seen_by_clones() {
        let hook = ExitHook::new();
        let seen_by_loop = hook.clone();
        assert!(!seen_by_loop.is_interrupted());
        hook.trigger();
        assert!(seen_by_loop.is_interrupted());
    }
}
