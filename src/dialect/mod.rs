//! Per-recorder ingestion strategies.
//!
//! Every dialect shares one skeleton: gate on the file extension, build a
//! [`Call`] from the path, read the audio bytes, extract dialect-specific
//! metadata, fill watch defaults, and pass the validity gate before the call
//! is enqueued and the source files optionally deleted.

mod dsdplus;
mod sdrtrunk;
mod trunk_recorder;

use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::call::Call;
use crate::error::IngestError;
use crate::ingest::Ingestor;
use crate::mask;
use crate::watch::Dirwatch;

/// Recording-tool convention a watch ingests with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DialectKind {
    /// Plain audio drops, optionally described by a filename mask.
    #[default]
    #[serde(rename = "default")]
    Default,
    /// DSDPlus per-call recordings.
    #[serde(rename = "dsdplus")]
    DsdPlus,
    /// SDRTrunk recordings carrying ID3 tags.
    #[serde(rename = "sdr-trunk")]
    SdrTrunk,
    /// Trunk-Recorder audio with a JSON sidecar.
    #[serde(rename = "trunk-recorder")]
    TrunkRecorder,
}

impl DialectKind {
    /// The string form used in persistence and admin payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::DsdPlus => "dsdplus",
            Self::SdrTrunk => "sdr-trunk",
            Self::TrunkRecorder => "trunk-recorder",
        }
    }

    /// Parse the persisted string form. Unknown values fall back to
    /// [`DialectKind::Default`].
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "dsdplus" => Self::DsdPlus,
            "sdr-trunk" => Self::SdrTrunk,
            "trunk-recorder" => Self::TrunkRecorder,
            _ => Self::Default,
        }
    }
}

/// Ingest the file at `path` according to the watch's dialect.
///
/// A path whose extension does not match the dialect is a silent no-op, as
/// is a call that fails the validity gate.
///
/// # Errors
///
/// Returns an error for I/O failures and malformed sidecar metadata; the
/// watch engine logs these and leaves the file on disk.
pub async fn ingest(
    watch: &Dirwatch,
    ingestor: &Ingestor,
    path: &Path,
) -> std::result::Result<(), IngestError> {
    match watch.kind {
        DialectKind::Default => ingest_default(watch, ingestor, path).await,
        DialectKind::DsdPlus => ingest_dsdplus(watch, ingestor, path).await,
        DialectKind::SdrTrunk => ingest_sdrtrunk(watch, ingestor, path).await,
        DialectKind::TrunkRecorder => trunk_recorder::ingest(watch, ingestor, path).await,
    }
}

async fn ingest_default(
    watch: &Dirwatch,
    ingestor: &Ingestor,
    path: &Path,
) -> std::result::Result<(), IngestError> {
    if !extension_matches(path, watch.audio_extension("wav")) {
        return Ok(());
    }

    let mut call = Call::for_file(path);
    call.frequency = watch.frequency;
    call.date_time = Utc::now();
    call.audio = fs::read(path)
        .await
        .map_err(|e| IngestError::read(path, &e))?;

    if let Some(m) = watch.mask.as_deref() {
        mask::apply(m, &mut call, &ingestor.systems);
    }

    finish(watch, ingestor, call, &[path]).await
}

async fn ingest_dsdplus(
    watch: &Dirwatch,
    ingestor: &Ingestor,
    path: &Path,
) -> std::result::Result<(), IngestError> {
    if !extension_matches(path, watch.audio_extension("mp3")) {
        return Ok(());
    }

    let mut call = Call::for_file(path);
    call.frequency = watch.frequency;
    call.audio = fs::read(path)
        .await
        .map_err(|e| IngestError::read(path, &e))?;

    dsdplus::apply_meta(&mut call, path);

    finish(watch, ingestor, call, &[path]).await
}

async fn ingest_sdrtrunk(
    watch: &Dirwatch,
    ingestor: &Ingestor,
    path: &Path,
) -> std::result::Result<(), IngestError> {
    if !extension_matches(path, "mp3") {
        return Ok(());
    }

    let mut call = Call::for_file(path);
    call.frequency = watch.frequency;
    call.audio = fs::read(path)
        .await
        .map_err(|e| IngestError::read(path, &e))?;

    sdrtrunk::apply_meta(&mut call, path, &ingestor.systems);

    finish(watch, ingestor, call, &[path]).await
}

/// Finish the shared skeleton: watch defaults, validity gate, enqueue,
/// optional deletion of the source files.
async fn finish(
    watch: &Dirwatch,
    ingestor: &Ingestor,
    mut call: Call,
    files: &[&Path],
) -> std::result::Result<(), IngestError> {
    if call.system == 0 {
        if let Some(id) = watch.system_id {
            call.system = id;
        }
    }
    if call.talkgroup == 0 {
        if let Some(id) = watch.talkgroup_id {
            call.talkgroup = id;
        }
    }

    match call.validate() {
        Ok(()) => {
            let name = call.audio_name.clone();
            ingestor.enqueue(call)?;
            tracing::debug!(audio = %name, "call enqueued");

            if watch.delete_after {
                for file in files {
                    fs::remove_file(file)
                        .await
                        .map_err(|e| IngestError::remove(file, &e))?;
                }
            }
            Ok(())
        }
        Err(field) => {
            // Expected noise in a watched tree; dropped, never retried.
            tracing::warn!(audio = %call.audio_name, missing = field, "dropping invalid call");
            Ok(())
        }
    }
}

fn extension_matches(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}
