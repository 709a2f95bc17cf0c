//! The call record handed to the downstream archival pipeline.
//!
//! A [`Call`] is built per ingestion attempt by a dialect strategy, then
//! checked against the validity gate before it is allowed onto the ingest
//! channel.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A radio unit heard on a call, with its position in the recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CallSource {
    /// Offset within the recording, in seconds.
    pub pos: u32,
    /// Radio unit id.
    pub src: u32,
}

/// A single radio transmission: audio plus extracted metadata.
///
/// `system == 0` or `talkgroup == 0` means unset; such calls never pass
/// [`Call::validate`].
#[derive(Debug, Clone, Serialize)]
pub struct Call {
    /// Basename of the audio file.
    pub audio_name: String,
    /// MIME type guessed from the audio file extension.
    pub audio_type: String,
    /// Raw audio bytes.
    #[serde(skip)]
    pub audio: Vec<u8>,
    /// Call start, UTC. Defaults to arrival time.
    pub date_time: DateTime<Utc>,
    /// Frequency in hertz.
    pub frequency: Option<u64>,
    /// Numeric system id.
    pub system: u32,
    /// Numeric talkgroup id.
    pub talkgroup: u32,
    /// Radio units heard on the call.
    pub sources: Vec<CallSource>,
    /// System label hint for downstream registry creation.
    pub system_label: Option<String>,
    /// Talkgroup label hint.
    pub talkgroup_label: Option<String>,
    /// Talkgroup group hint.
    pub talkgroup_group: Option<String>,
    /// Talkgroup tag hint.
    pub talkgroup_tag: Option<String>,
}

impl Call {
    /// Create an empty call stamped with the current time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            audio_name: String::new(),
            audio_type: String::new(),
            audio: Vec::new(),
            date_time: Utc::now(),
            frequency: None,
            system: 0,
            talkgroup: 0,
            sources: Vec::new(),
            system_label: None,
            talkgroup_label: None,
            talkgroup_group: None,
            talkgroup_tag: None,
        }
    }

    /// Create a call named after `path`, with the MIME type guessed from its
    /// extension.
    #[must_use]
    pub fn for_file(path: &Path) -> Self {
        let mut call = Self::new();
        call.audio_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        call.audio_type = mime_for(path);
        call
    }

    /// Check the validity gate: system and talkgroup resolved, audio and
    /// name present.
    ///
    /// # Errors
    ///
    /// Returns the name of the first failing field.
    pub fn validate(&self) -> std::result::Result<(), &'static str> {
        if self.audio_name.is_empty() {
            return Err("audio_name");
        }
        if self.audio.is_empty() {
            return Err("audio");
        }
        if self.system == 0 {
            return Err("system");
        }
        if self.talkgroup == 0 {
            return Err("talkgroup");
        }
        Ok(())
    }
}

impl Default for Call {
    fn default() -> Self {
        Self::new()
    }
}

/// Guess the MIME type for a file from its extension.
#[must_use]
pub fn mime_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string()
}
