//! Session vocabulary shared by both endpoints: roles, command strings,
//! dictionary keys, transport events and the packets of the reference transport.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Current session protocol version. Exchanged in the transport handshake.
pub const PROTOCOL_VERSION: u8 = 1;

/// Container extension of every recording.
pub const AUDIO_EXTENSION: &str = ".m4a";

/// The one command the companion acts on: host has durably stored the recording.
pub const DELETE_AUDIO_FILES: &str = "Delete Audio Files";

/// Key of the command text in a message dictionary.
pub const MESSAGE_KEY: &str = "message";

/// Key of the encoded payload in a user-info dictionary.
pub const DATA_KEY: &str = "data";

/// File transfer metadata keys.
pub const FILE_NAME_KEY: &str = "fileName";
pub const FILE_EXTENSION_KEY: &str = "fileExtension";

/// Short string dictionary carried by `send_message`.
pub type MessageDict = BTreeMap<String, String>;

/// Bytes-bearing dictionary carried by `transfer_user_info`.
pub type UserInfo = BTreeMap<String, Vec<u8>>;

/// Metadata attached to a file transfer.
pub type FileMetadata = BTreeMap<String, String>;

/// Which side of the pairing this process is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Wearable: records, sends, deletes on confirmation.
    Companion,
    /// Phone: receives, stores, confirms.
    Host,
}

impl Role {
    pub fn counterpart(self) -> Role {
        match self {
            Role::Companion => Role::Host,
            Role::Host => Role::Companion,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Role::Companion => 1,
            Role::Host => 2,
        }
    }

    pub fn from_byte(b: u8) -> Option<Role> {
        match b {
            1 => Some(Role::Companion),
            2 => Some(Role::Host),
            _ => None,
        }
    }
}

/// Activation state reported by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivationState {
    #[default]
    NotActivated,
    Inactive,
    Activated,
}

/// Parsed command text. Anything outside the vocabulary is `Unknown` and ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    DeleteAudioFiles,
    Unknown(String),
}

impl Command {
    pub fn parse(text: &str) -> Command {
        if text == DELETE_AUDIO_FILES {
            Command::DeleteAudioFiles
        } else {
            Command::Unknown(text.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Command::DeleteAudioFiles => DELETE_AUDIO_FILES,
            Command::Unknown(s) => s,
        }
    }

    /// Wrap the command text in a message dictionary.
    pub fn to_message(&self) -> MessageDict {
        let mut dict = MessageDict::new();
        dict.insert(MESSAGE_KEY.to_string(), self.as_str().to_string());
        dict
    }

    /// Extract the command from a message dictionary. `None` if the key is absent.
    pub fn from_message(dict: &MessageDict) -> Option<Command> {
        dict.get(MESSAGE_KEY).map(|s| Command::parse(s))
    }
}

/// Inbound events from the transport. Delivered on the transport's own tasks
/// and consumed by a single dispatch loop.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    ActivationCompleted {
        state: ActivationState,
        error: Option<String>,
    },
    ReachabilityChanged(bool),
    MessageReceived(MessageDict),
    UserInfoReceived(UserInfo),
    FileReceived {
        path: PathBuf,
        metadata: FileMetadata,
    },
    SessionInactive,
    SessionDeactivated,
}

/// Packets of the reference transport. Encoding is bincode; framing is length-prefix (see wire module).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    Message(MessageDict),
    UserInfo(UserInfo),
    File {
        name: String,
        metadata: FileMetadata,
        contents: Vec<u8>,
    },
}
