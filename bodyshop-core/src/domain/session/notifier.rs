//! User-facing feedback for session-guarded operations.

use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ToastLevel {
    Loading,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub level: ToastLevel,
    pub message: String,
}

/// Sink for toasts. Delivery is fire-and-forget.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, toast: Toast);
}

/// Which toasts an operation wants. `None` means stay quiet for that phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToastOptions {
    pub loading: Option<String>,
    pub success: Option<String>,
    pub error: Option<String>,
}

impl ToastOptions {
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn with_loading(mut self, message: impl Into<String>) -> Self {
        self.loading = Some(message.into());
        self
    }

    pub fn with_success(mut self, message: impl Into<String>) -> Self {
        self.success = Some(message.into());
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }
}

/// Writes toasts to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, toast: Toast) {
        match toast.level {
            ToastLevel::Loading => tracing::debug!(toast = %toast.message, "loading"),
            ToastLevel::Success => tracing::info!(toast = %toast.message, "success"),
            ToastLevel::Warning => tracing::warn!(toast = %toast.message, "warning"),
            ToastLevel::Error => tracing::error!(toast = %toast.message, "error"),
        }
    }
}

#[cfg(test)]
pub use recording::RecordingNotifier;

#[cfg(test)]
mod recording {
    use std::sync::{Arc, Mutex};

    use super::{Notifier, Toast, ToastLevel};

    /// Keeps every toast for later assertions.
    #[derive(Clone, Default)]
    pub struct RecordingNotifier {
        toasts: Arc<Mutex<Vec<Toast>>>,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn toasts(&self) -> Vec<Toast> {
            self.toasts.lock().unwrap().clone()
        }

        pub fn levels(&self) -> Vec<ToastLevel> {
            self.toasts().into_iter().map(|t| t.level).collect()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, toast: Toast) {
            self.toasts.lock().unwrap().push(toast);
        }
    }
}
