use std::sync::Arc;

/// How a [`Notification`] should be presented.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NotificationLevel {
    /// Neutral information.
    Info,
    /// An operation succeeded.
    Success,
    /// An operation failed.
    Error,
}

/// A transient, user-facing message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Notification {
    /// How the message should be presented.
    pub level: NotificationLevel,
    /// The text to show.
    pub message: String,
}

impl Notification {
    /// Creates an informational notification.
    #[inline]
    pub fn info<S: Into<String>>(message: S) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
        }
    }

    /// Creates a success notification.
    #[inline]
    pub fn success<S: Into<String>>(message: S) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.into(),
        }
    }

    /// Creates an error notification.
    #[inline]
    pub fn error<S: Into<String>>(message: S) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

/// Delivers notifications to an optional callback.
#[derive(Clone, Default)]
pub(crate) struct Notifier(Option<Arc<dyn Fn(Notification) + Send + Sync>>);

impl Notifier {
    #[inline]
    pub fn new(f: impl Fn(Notification) + Send + Sync + 'static) -> Self {
        Self(Some(Arc::new(f)))
    }

    pub fn notify(&self, notification: Notification) {
        debug!("notify: {notification:?}");
        if let Some(f) = &self.0 {
            f(notification);
        }
    }
}
