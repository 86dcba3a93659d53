//! User-facing failure reporting.

use tracing::error;

/// Surfaces a failure to the user. Implemented by the presentation layer.
pub trait UserNotifier: Send + Sync {
    /// `blocking` failures halt startup; the rest are informational.
    fn show_error(&self, title: &str, message: &str, blocking: bool);
}

/// Notifier that only writes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl UserNotifier for LogNotifier {
    fn show_error(&self, title: &str, message: &str, blocking: bool) {
        error!(title, blocking, "{}", message);
    }
}
