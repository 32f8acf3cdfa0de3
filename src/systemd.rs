//! sd_notify integration for running the backup as a systemd service.
//!
//! Every method is a no-op when disabled or when not built for Linux, so
//! callers never need `#[cfg]` guards.

#[derive(Debug, Clone, Copy)]
pub struct SystemdNotifier {
    enabled: bool,
}

impl SystemdNotifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// `READY=1`: the run has started processing categories.
    pub fn notify_ready(&self) {
        if self.enabled {
            send(&[NotifyMessage::Ready]);
        }
    }

    /// `STOPPING=1`: shutdown was requested or the run is ending.
    pub fn notify_stopping(&self) {
        if self.enabled {
            send(&[NotifyMessage::Stopping]);
        }
    }

    /// `STATUS=<msg>`: free-form progress shown by `systemctl status`.
    pub fn notify_status(&self, msg: &str) {
        if self.enabled {
            send(&[NotifyMessage::Status(msg)]);
        }
    }
}

enum NotifyMessage<'a> {
    Ready,
    Stopping,
    Status(&'a str),
}

#[cfg(target_os = "linux")]
fn send(messages: &[NotifyMessage<'_>]) {
    let states: Vec<sd_notify::NotifyState<'_>> = messages
        .iter()
        .map(|m| match m {
            NotifyMessage::Ready => sd_notify::NotifyState::Ready,
            NotifyMessage::Stopping => sd_notify::NotifyState::Stopping,
            NotifyMessage::Status(msg) => sd_notify::NotifyState::Status(*msg),
        })
        .collect();
    if let Err(e) = sd_notify::notify(false, &states) {
        tracing::debug!(error = %e, "sd_notify failed");
    }
}

#[cfg(not(target_os = "linux"))]
fn send(_messages: &[NotifyMessage<'_>]) {}
