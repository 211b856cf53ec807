use console::style;

use crate::config::NotifyConfig;

/// A message about a failure the build recovered from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    /// Task or pipeline that raised it.
    pub task: String,
    pub message: String,
}

/// Surfaces recoverable errors to the developer.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Prints notifications to the terminal, optionally ringing the bell.
#[derive(Debug, Clone)]
pub struct ConsoleNotifier {
    bell: bool,
}

impl ConsoleNotifier {
    pub fn new(config: &NotifyConfig) -> Self {
        Self { bell: config.bell }
    }
}

impl Notifier for ConsoleNotifier {
    fn notify(&self, notification: &Notification) {
        tracing::warn!(
            task = notification.task,
            "{} {}",
            style(&notification.title).red().bold(),
            notification.message
        );

        if self.bell {
            eprint!("\x07");
        }
    }
}
