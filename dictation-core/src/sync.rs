//! Sync protocol: companion sends recordings, host stores them and answers with
//! the delete command, companion frees its storage on that command.
//!
//! Delivery is at-most-once and best-effort. Nothing here retries, queues or
//! waits for an acknowledgement; failures are logged and reported to the caller
//! as an outcome, never sent back across the transport.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};

use crate::connectivity::{Connectivity, ConnectivityWriter};
use crate::payload::{self, AudioTransferPayload, CodecError};
use crate::protocol::{
    ActivationState, Command, FileMetadata, MessageDict, Role, TransportEvent, UserInfo,
    AUDIO_EXTENSION, DATA_KEY, FILE_EXTENSION_KEY, FILE_NAME_KEY,
};
use crate::recording;
use crate::store::{RecordingStore, StorageError};
use crate::transport::{Transport, TransportError};

/// Where this endpoint is in the recording lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    /// Companion: captured and stored locally, not yet sent.
    Recorded,
    /// Companion: handed to the transport, waiting for the delete command.
    SendAttempted,
    /// Host: payload accepted, being persisted.
    Received,
    /// Companion: delete command received, removing local recordings.
    DeleteRequested,
}

/// Result of an outbound call.
#[derive(Debug)]
pub enum SendOutcome {
    /// Queued on the transport. Not a delivery guarantee.
    Sent,
    /// Preconditions failed; nothing was attempted.
    Skipped,
    /// The transport refused the call.
    Failed(SyncError),
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent)
    }

    pub fn into_result(self) -> Result<(), SyncError> {
        match self {
            SendOutcome::Sent => Ok(()),
            SendOutcome::Skipped => Err(SyncError::TransportUnavailable),
            SendOutcome::Failed(e) => Err(e),
        }
    }
}

/// What handling one inbound event did.
#[derive(Debug)]
pub enum EventOutcome {
    ConnectivityUpdated(bool),
    /// Session deactivated; reactivation was requested.
    Reactivating,
    /// Host stored a recording. `confirmed` is whether the delete command was queued.
    RecordingReceived {
        name: String,
        path: PathBuf,
        confirmed: bool,
    },
    /// Companion removed this many local recordings.
    RecordingsDeleted(usize),
    Rejected(SyncError),
    Ignored,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("transport unavailable")]
    TransportUnavailable,
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] CodecError),
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

/// One endpoint of the pairing. Constructed once by the application and driven
/// from a single dispatch loop.
pub struct SyncProtocol<T, S> {
    role: Role,
    transport: T,
    store: S,
    connectivity: ConnectivityWriter,
    phase: Phase,
}

impl<T: Transport, S: RecordingStore> SyncProtocol<T, S> {
    pub fn new(role: Role, transport: T, store: S) -> Self {
        Self {
            role,
            transport,
            store,
            connectivity: ConnectivityWriter::new(),
            phase: Phase::Idle,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn connectivity(&self) -> Connectivity {
        self.connectivity.subscribe()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Stored recordings with the audio extension.
    pub fn recordings(&self) -> Result<Vec<String>, SyncError> {
        Ok(self.store.list(AUDIO_EXTENSION)?)
    }

    /// Companion: keep a finished capture under its timestamp name.
    pub fn record<Tz: TimeZone>(
        &mut self,
        at: &DateTime<Tz>,
        audio_data: Vec<u8>,
    ) -> Result<AudioTransferPayload, SyncError>
    where
        Tz::Offset: std::fmt::Display,
    {
        let name = recording::file_name_for(at);
        self.store.persist(&name, &audio_data)?;
        tracing::info!(file = %name, bytes = audio_data.len(), "recording stored");
        self.phase = Phase::Recorded;
        Ok(AudioTransferPayload::new(name, audio_data))
    }

    fn session_ready(&self) -> bool {
        self.transport.activation_state() == ActivationState::Activated
            && self.transport.is_counterpart_installed()
    }

    fn finish_send(&self, what: &str, result: Result<(), TransportError>) -> SendOutcome {
        match result {
            Ok(()) => SendOutcome::Sent,
            Err(e) => {
                tracing::warn!(error = %e, "cannot send {}", what);
                SendOutcome::Failed(e.into())
            }
        }
    }

    /// Companion: hand one recording to the transport's user-info channel.
    pub fn send_recording(&mut self, payload: &AudioTransferPayload) -> SendOutcome {
        if !self.session_ready() {
            tracing::debug!(file = %payload.file_name, "session unavailable, recording not sent");
            return SendOutcome::Skipped;
        }
        let bytes = match payload::encode_payload(payload) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(file = %payload.file_name, error = %e, "cannot encode recording");
                return SendOutcome::Failed(e.into());
            }
        };
        let mut info = UserInfo::new();
        info.insert(DATA_KEY.to_string(), bytes);
        let result = self.transport.transfer_user_info(info);
        let outcome = self.finish_send("recording", result);
        if outcome.is_sent() {
            tracing::info!(file = %payload.file_name, bytes = payload.audio_data.len(), "recording sent");
            self.phase = Phase::SendAttempted;
        }
        outcome
    }

    /// Companion: send a stored recording through the file channel instead.
    pub fn send_recording_file(&mut self, path: &Path) -> SendOutcome {
        if !self.session_ready() {
            tracing::debug!(path = %path.display(), "session unavailable, file not sent");
            return SendOutcome::Skipped;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            tracing::warn!(path = %path.display(), "recording path has no file name");
            return SendOutcome::Failed(CodecError::EmptyFileName.into());
        };
        let mut metadata = FileMetadata::new();
        metadata.insert(FILE_NAME_KEY.to_string(), name.to_string());
        metadata.insert(FILE_EXTENSION_KEY.to_string(), AUDIO_EXTENSION.to_string());
        let result = self.transport.transfer_file(path, metadata);
        let outcome = self.finish_send("file", result);
        if outcome.is_sent() {
            tracing::info!(file = %name, "recording file sent");
            self.phase = Phase::SendAttempted;
        }
        outcome
    }

    /// Send a command over the message channel.
    pub fn send_command(&mut self, command: Command) -> SendOutcome {
        if !self.session_ready() {
            tracing::debug!(command = command.as_str(), "session unavailable, command not sent");
            return SendOutcome::Skipped;
        }
        let result = self.transport.send_message(command.to_message());
        self.finish_send("command", result)
    }

    /// Apply one transport event. The only writer of connectivity state.
    pub fn handle_event(&mut self, event: TransportEvent) -> EventOutcome {
        match event {
            TransportEvent::ActivationCompleted { state, error } => {
                if let Some(e) = error {
                    tracing::warn!(error = %e, "session activation failed");
                }
                let reachable = state == ActivationState::Activated;
                self.connectivity.set_reachable(reachable);
                EventOutcome::ConnectivityUpdated(reachable)
            }
            TransportEvent::ReachabilityChanged(reachable) => {
                tracing::debug!(reachable, "reachability changed");
                self.connectivity.set_reachable(reachable);
                EventOutcome::ConnectivityUpdated(reachable)
            }
            TransportEvent::SessionInactive => {
                self.connectivity.set_reachable(false);
                EventOutcome::ConnectivityUpdated(false)
            }
            TransportEvent::SessionDeactivated => {
                self.connectivity.set_reachable(false);
                tracing::info!("session deactivated, reactivating");
                self.transport.activate();
                EventOutcome::Reactivating
            }
            TransportEvent::MessageReceived(message) => self.on_message(&message),
            TransportEvent::UserInfoReceived(info) => self.on_user_info(info),
            TransportEvent::FileReceived { path, metadata } => self.on_file(&path, &metadata),
        }
    }

    fn on_message(&mut self, message: &MessageDict) -> EventOutcome {
        if self.role != Role::Companion {
            return EventOutcome::Ignored;
        }
        match Command::from_message(message) {
            Some(Command::DeleteAudioFiles) => {
                self.phase = Phase::DeleteRequested;
                let result = self.delete_all_recordings();
                self.phase = Phase::Idle;
                match result {
                    Ok(n) => EventOutcome::RecordingsDeleted(n),
                    Err(e) => EventOutcome::Rejected(e),
                }
            }
            Some(Command::Unknown(text)) => {
                tracing::debug!(command = %text, "ignoring unknown command");
                EventOutcome::Ignored
            }
            None => EventOutcome::Ignored,
        }
    }

    /// Companion: remove every local recording. Safe to call repeatedly.
    pub fn delete_all_recordings(&mut self) -> Result<usize, SyncError> {
        match self.store.delete_all(AUDIO_EXTENSION) {
            Ok(n) => {
                tracing::info!(deleted = n, "local recordings removed");
                Ok(n)
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot remove local recordings");
                Err(e.into())
            }
        }
    }

    fn on_user_info(&mut self, mut info: UserInfo) -> EventOutcome {
        if self.role != Role::Host {
            return EventOutcome::Ignored;
        }
        let Some(bytes) = info.remove(DATA_KEY) else {
            tracing::debug!("user info without recording data");
            return EventOutcome::Ignored;
        };
        let payload = match payload::decode_payload(&bytes).and_then(|p| p.validate().map(|_| p)) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, bytes = bytes.len(), "rejected recording");
                return EventOutcome::Rejected(e.into());
            }
        };
        self.phase = Phase::Received;
        let name = payload.stored_name();
        let stored = self.store.persist(&name, &payload.audio_data);
        self.confirm_stored(name, stored)
    }

    fn on_file(&mut self, path: &Path, metadata: &FileMetadata) -> EventOutcome {
        if self.role != Role::Host {
            return EventOutcome::Ignored;
        }
        let name = metadata
            .get(FILE_NAME_KEY)
            .cloned()
            .or_else(|| path.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .unwrap_or_default();
        if let Err(e) = self.check_file(&name, path) {
            tracing::warn!(file = %name, error = %e, "rejected recording file");
            self.store.discard(path);
            return EventOutcome::Rejected(e);
        }
        self.phase = Phase::Received;
        let stored = self.store.import(&name, path);
        if stored.is_err() {
            self.store.discard(path);
        }
        self.confirm_stored(name, stored)
    }

    /// Same acceptance rules as the user-info channel, applied to a staged file.
    fn check_file(&self, name: &str, path: &Path) -> Result<(), SyncError> {
        if !recording::is_safe_file_name(name) {
            return Err(CodecError::Malformed("unsafe file name").into());
        }
        if !recording::has_extension(name, AUDIO_EXTENSION) {
            return Err(CodecError::Malformed("not an audio recording").into());
        }
        if self.store.staged_len(path)? == 0 {
            return Err(CodecError::EmptyAudio.into());
        }
        Ok(())
    }

    /// Host: the delete command goes out only after a durable write.
    fn confirm_stored(
        &mut self,
        name: String,
        stored: Result<PathBuf, StorageError>,
    ) -> EventOutcome {
        self.phase = Phase::Idle;
        let path = match stored {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(file = %name, error = %e, "cannot store received recording");
                return EventOutcome::Rejected(e.into());
            }
        };
        tracing::info!(file = %name, path = %path.display(), "received recording from companion");
        let confirmed = self.send_command(Command::DeleteAudioFiles).is_sent();
        EventOutcome::RecordingReceived {
            name,
            path,
            confirmed,
        }
    }
}
