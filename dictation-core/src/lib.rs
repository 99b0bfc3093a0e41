//! Dictation Link: companion (recorder) to host (receiver) transfer protocol.
//! Host-driven: no sockets or files here; the platform passes transport events
//! in and provides the transport and recording store behind traits.

pub mod connectivity;
pub mod integrity;
pub mod payload;
pub mod protocol;
pub mod recording;
pub mod store;
pub mod sync;
pub mod transport;
pub mod wire;

pub use connectivity::{Connectivity, ConnectivityStatus};
pub use payload::{decode_payload, encode_payload, AudioTransferPayload, CodecError};
pub use protocol::{
    ActivationState, Command, FileMetadata, MessageDict, Packet, Role, TransportEvent, UserInfo,
    AUDIO_EXTENSION, DELETE_AUDIO_FILES, PROTOCOL_VERSION,
};
pub use store::{RecordingStore, StorageError};
pub use sync::{EventOutcome, Phase, SendOutcome, SyncError, SyncProtocol};
pub use transport::{Transport, TransportError};
pub use wire::{decode_frame, encode_frame, FrameDecodeError, FrameEncodeError};
