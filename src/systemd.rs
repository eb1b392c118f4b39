//! sd_notify integration for running the worker as a `Type=notify` unit.
//!
//! Every method is a no-op when disabled or off Linux, so callers need no
//! `#[cfg]` of their own.

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SystemdNotifier {
    enabled: bool,
}

impl SystemdNotifier {
    pub(crate) fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// `READY=1`: the store is open and the first cycle is about to start.
    pub(crate) fn notify_ready(&self) {
        self.send(Message::Ready);
    }

    /// `STATUS=<msg>`: shown by `systemctl status`.
    pub(crate) fn notify_status(&self, msg: &str) {
        self.send(Message::Status(msg));
    }

    /// `STOPPING=1`
    pub(crate) fn notify_stopping(&self) {
        self.send(Message::Stopping);
    }

    fn send(&self, message: Message<'_>) {
        if self.enabled {
            message.deliver();
        }
    }
}

enum Message<'a> {
    Ready,
    Status(&'a str),
    Stopping,
}

impl Message<'_> {
    #[cfg(target_os = "linux")]
    fn deliver(&self) {
        use sd_notify::NotifyState;
        let state = match self {
            Message::Ready => NotifyState::Ready,
            Message::Status(msg) => NotifyState::Status(*msg),
            Message::Stopping => NotifyState::Stopping,
        };
        if let Err(e) = sd_notify::notify(false, &[state]) {
            tracing::debug!(error = %e, "sd_notify failed");
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn deliver(&self) {}
}
