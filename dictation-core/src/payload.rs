//! Payload codec: one recording as a self-contained, checksummed byte sequence.
//!
//! Layout: `version (1 byte) ‖ bincode body ‖ SHA-256(body)`. The body holds the
//! three fields with fixed-width u64 length prefixes, so field boundaries are
//! recoverable without any external schema.

use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::integrity::{self, DIGEST_LEN};
use crate::protocol::AUDIO_EXTENSION;
use crate::recording;

/// Current payload layout version.
pub const PAYLOAD_VERSION: u8 = 1;

/// Largest encoded body accepted in either direction.
pub const MAX_PAYLOAD_LEN: u64 = 16 * 1024 * 1024; // 16 MiB

const VERSION_LEN: usize = 1;

/// Unit exchanged from companion to host: one finished recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioTransferPayload {
    /// Timestamp-derived name including the extension, e.g. `2024-01-01_10-00-00.m4a`.
    pub file_name: String,
    /// Container tag, always [`AUDIO_EXTENSION`] for recordings made here.
    pub file_extension: String,
    pub audio_data: Vec<u8>,
}

impl AudioTransferPayload {
    pub fn new(file_name: impl Into<String>, audio_data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            file_extension: AUDIO_EXTENSION.to_string(),
            audio_data,
        }
    }

    /// Name the host stores the recording under. `file_name` already carries
    /// the extension for recordings named by this crate; older senders may
    /// omit it, in which case `file_extension` is appended.
    pub fn stored_name(&self) -> String {
        if self.file_extension.is_empty() || self.file_name.ends_with(&self.file_extension) {
            self.file_name.clone()
        } else {
            format!("{}{}", self.file_name, self.file_extension)
        }
    }

    /// Receiver-side checks run before anything touches disk.
    pub fn validate(&self) -> Result<(), CodecError> {
        if self.audio_data.is_empty() {
            return Err(CodecError::EmptyAudio);
        }
        if !recording::is_safe_file_name(&self.stored_name()) {
            return Err(CodecError::Malformed("unsafe file name"));
        }
        Ok(())
    }
}

fn body_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_limit(MAX_PAYLOAD_LEN)
        .with_fixint_encoding()
        .with_little_endian()
        .reject_trailing_bytes()
}

/// Encode a payload. Fails only on an empty file name or an oversized body.
pub fn encode_payload(payload: &AudioTransferPayload) -> Result<Vec<u8>, CodecError> {
    if payload.file_name.is_empty() {
        return Err(CodecError::EmptyFileName);
    }
    let body = body_options().serialize(payload).map_err(|e| {
        if matches!(*e, bincode::ErrorKind::SizeLimit) {
            CodecError::TooLarge
        } else {
            CodecError::Encode(e)
        }
    })?;
    let mut out = Vec::with_capacity(VERSION_LEN + body.len() + DIGEST_LEN);
    out.push(PAYLOAD_VERSION);
    out.extend_from_slice(&body);
    out.extend_from_slice(&integrity::digest(&body));
    Ok(out)
}

/// Decode a payload. Any structural problem is `Malformed`; never panics.
pub fn decode_payload(bytes: &[u8]) -> Result<AudioTransferPayload, CodecError> {
    if bytes.len() < VERSION_LEN + DIGEST_LEN {
        return Err(CodecError::Malformed("truncated"));
    }
    if bytes[0] != PAYLOAD_VERSION {
        return Err(CodecError::Malformed("unsupported payload version"));
    }
    let (body, digest) = bytes[VERSION_LEN..].split_at(bytes.len() - VERSION_LEN - DIGEST_LEN);
    if !integrity::verify(body, digest) {
        return Err(CodecError::Malformed("digest mismatch"));
    }
    body_options()
        .deserialize::<AudioTransferPayload>(body)
        .map_err(|_| CodecError::Malformed("body does not match payload structure"))
}

/// Error encoding or decoding a payload.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed payload: {0}")]
    Malformed(&'static str),
    #[error("payload has no audio data")]
    EmptyAudio,
    #[error("payload has no file name")]
    EmptyFileName,
    #[error("payload too large")]
    TooLarge,
    #[error("encode error: {0}")]
    Encode(bincode::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AudioTransferPayload {
        AudioTransferPayload {
            file_name: "2024-01-01_10-00-00.m4a".to_string(),
            file_extension: ".m4a".to_string(),
            audio_data: vec![0x01, 0x02, 0x03],
        }
    }

    #[test]
    fn roundtrip_is_exact() {
        let p = sample();
        let bytes = encode_payload(&p).unwrap();
        assert_eq!(bytes[0], PAYLOAD_VERSION);
        assert_eq!(decode_payload(&bytes).unwrap(), p);
    }

    #[test]
    fn roundtrip_binary_audio_and_unicode_name() {
        let p = AudioTransferPayload {
            file_name: "größe_2024.m4a".to_string(),
            file_extension: ".m4a".to_string(),
            audio_data: (0..=255u8).cycle().take(70_000).collect(),
        };
        let decoded = decode_payload(&encode_payload(&p).unwrap()).unwrap();
        assert_eq!(decoded.audio_data, p.audio_data);
        assert_eq!(decoded, p);
    }

    #[test]
    fn empty_audio_still_encodes() {
        let mut p = sample();
        p.audio_data.clear();
        let decoded = decode_payload(&encode_payload(&p).unwrap()).unwrap();
        assert!(decoded.audio_data.is_empty());
        assert!(matches!(decoded.validate(), Err(CodecError::EmptyAudio)));
    }

    #[test]
    fn encode_rejects_empty_name() {
        let mut p = sample();
        p.file_name.clear();
        assert!(matches!(encode_payload(&p), Err(CodecError::EmptyFileName)));
    }

    #[test]
    fn every_truncation_is_malformed() {
        let bytes = encode_payload(&sample()).unwrap();
        for n in 0..bytes.len() {
            assert!(
                matches!(decode_payload(&bytes[..n]), Err(CodecError::Malformed(_))),
                "prefix of {} bytes decoded",
                n
            );
        }
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            decode_payload(&[0xff; 64]),
            Err(CodecError::Malformed(_))
        ));
        let mut bytes = encode_payload(&sample()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x55;
        assert!(matches!(
            decode_payload(&bytes),
            Err(CodecError::Malformed("digest mismatch"))
        ));
    }

    #[test]
    fn valid_digest_over_wrong_structure_is_malformed() {
        // Structurally invalid body (string length runs past the end) with a correct digest.
        let body = [0xffu8; 12];
        let mut bytes = vec![PAYLOAD_VERSION];
        bytes.extend_from_slice(&body);
        bytes.extend_from_slice(&integrity::digest(&body));
        assert!(matches!(
            decode_payload(&bytes),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn stored_name_appends_missing_extension() {
        let p = AudioTransferPayload {
            file_name: "2024-01-01_10-00-00".to_string(),
            file_extension: ".m4a".to_string(),
            audio_data: vec![1],
        };
        assert_eq!(p.stored_name(), "2024-01-01_10-00-00.m4a");
        assert_eq!(sample().stored_name(), "2024-01-01_10-00-00.m4a");
    }

    #[test]
    fn validate_rejects_traversal() {
        let p = AudioTransferPayload::new("../escape.m4a", vec![1]);
        assert!(matches!(p.validate(), Err(CodecError::Malformed(_))));
        assert!(sample().validate().is_ok());
    }
}
