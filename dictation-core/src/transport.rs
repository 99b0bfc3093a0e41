//! Transport seam: the paired session as seen by the sync protocol.
//! Outbound calls are fire-and-forget; `Ok` means queued, not delivered.

use std::path::Path;

use crate::protocol::{ActivationState, FileMetadata, MessageDict, UserInfo};

/// Platform session between the two endpoints. One per process, owned by the
/// application and handed to [`crate::SyncProtocol`].
pub trait Transport {
    fn activation_state(&self) -> ActivationState;

    /// True if the counterpart app is installed and paired on the other end.
    fn is_counterpart_installed(&self) -> bool;

    /// Ask the session to (re)activate. Completion arrives as an event.
    fn activate(&mut self);

    fn send_message(&mut self, message: MessageDict) -> Result<(), TransportError>;

    fn transfer_user_info(&mut self, info: UserInfo) -> Result<(), TransportError>;

    fn transfer_file(&mut self, path: &Path, metadata: FileMetadata) -> Result<(), TransportError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("session not activated or counterpart not installed")]
    Unavailable,
    #[error("session closed")]
    Closed,
    #[error("encode error: {0}")]
    Encode(#[from] crate::wire::FrameEncodeError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
