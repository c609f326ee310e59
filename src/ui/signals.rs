use crate::error::{Result, TagCsvError};
use crate::extractor::CancellationToken;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Ctrl+C handling: the first signal cancels the shared token so the running
/// task can kill its extractors and clean up, the second exits at once.
pub struct GracefulShutdown {
    token: CancellationToken,
    shutdown_message_shown: Arc<AtomicBool>,
}

impl GracefulShutdown {
    pub fn new() -> Result<Self> {
        let token = CancellationToken::new();
        let shutdown_message_shown = Arc::new(AtomicBool::new(false));

        let token_clone = token.clone();
        let message_shown_clone = shutdown_message_shown.clone();

        ctrlc::set_handler(move || {
            token_clone.cancel();

            if !message_shown_clone.swap(true, Ordering::SeqCst) {
                eprintln!("\n🛑 Cancelling conversion... (press Ctrl+C again to force exit)");
            } else {
                eprintln!("\n💀 Force stopping...");
                std::process::exit(130);
            }
        })
        .map_err(|e| TagCsvError::Config {
            message: format!("Failed to set signal handler: {}", e),
        })?;

        Ok(Self {
            token,
            shutdown_message_shown,
        })
    }

    /// No signal handler registration.
    pub fn new_for_test() -> Self {
        Self {
            token: CancellationToken::new(),
            shutdown_message_shown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled()
    }

    pub fn check_shutdown(&self) -> Result<()> {
        self.token.check()
    }

    pub fn request_shutdown(&self) {
        self.token.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new().unwrap_or_else(|e| {
            tracing::warn!("{}", e);
            Self::new_for_test()
        })
    }
}
