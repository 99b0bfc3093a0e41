//! Connectivity observable: whether the peer session is currently reachable.
//! Current value only; the sync protocol's event handler is the only writer.

use tokio::sync::watch;

/// Snapshot of the session's reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectivityStatus {
    pub is_reachable: bool,
}

/// Writer half. Not exported from the crate root; held by `SyncProtocol`.
pub(crate) struct ConnectivityWriter {
    tx: watch::Sender<ConnectivityStatus>,
}

impl ConnectivityWriter {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectivityStatus::default());
        Self { tx }
    }

    /// Publish a new value. Subscribers are only woken when it differs.
    pub(crate) fn set_reachable(&self, reachable: bool) {
        self.tx.send_if_modified(|status| {
            if status.is_reachable == reachable {
                false
            } else {
                status.is_reachable = reachable;
                true
            }
        });
    }

    pub(crate) fn subscribe(&self) -> Connectivity {
        Connectivity {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read-only handle for UI and glue code. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Connectivity {
    rx: watch::Receiver<ConnectivityStatus>,
}

impl Connectivity {
    pub fn status(&self) -> ConnectivityStatus {
        *self.rx.borrow()
    }

    pub fn is_reachable(&self) -> bool {
        self.status().is_reachable
    }

    /// Wait for the next change. Returns `None` once the protocol is dropped.
    pub async fn changed(&mut self) -> Option<ConnectivityStatus> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }
}
