//! Trunk-Recorder JSON sidecar ingestion.
//!
//! Trunk-Recorder deposits an audio file and a JSON sidecar per call; the
//! sidecar's appearance triggers the ingest. The audio sibling is derived by
//! swapping the `.json` extension for the watch's audio extension.

#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use std::path::Path;

use chrono::DateTime;
use serde::Deserialize;
use tokio::fs;

use crate::call::{Call, CallSource};
use crate::error::IngestError;
use crate::ingest::Ingestor;
use crate::watch::Dirwatch;

/// The subset of the Trunk-Recorder sidecar this engine consumes.
#[derive(Debug, Deserialize)]
struct Sidecar {
    #[serde(default)]
    freq: Option<f64>,
    #[serde(default)]
    start_time: Option<i64>,
    #[serde(default)]
    talkgroup: Option<u32>,
    #[serde(default)]
    talkgroup_tag: Option<String>,
    #[serde(default, rename = "srcList")]
    src_list: Vec<SidecarSource>,
}

#[derive(Debug, Deserialize)]
struct SidecarSource {
    #[serde(default)]
    src: i64,
    #[serde(default)]
    pos: f64,
}

pub(super) async fn ingest(
    watch: &Dirwatch,
    ingestor: &Ingestor,
    path: &Path,
) -> std::result::Result<(), IngestError> {
    if !path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
    {
        return Ok(());
    }

    let audio_path = path.with_extension(watch.audio_extension("wav"));

    let mut call = Call::for_file(&audio_path);
    call.frequency = watch.frequency;

    // The recorder may still be writing the audio sibling; skip quietly and
    // let a later event retry.
    let Ok(audio) = fs::read(&audio_path).await else {
        return Ok(());
    };
    call.audio = audio;

    let sidecar = fs::read(path)
        .await
        .map_err(|e| IngestError::read(path, &e))?;
    apply_meta(&mut call, &sidecar).map_err(|e| IngestError::meta(path, e.to_string()))?;

    super::finish(watch, ingestor, call, &[path, audio_path.as_path()]).await
}

/// Apply sidecar metadata to the call.
fn apply_meta(call: &mut Call, sidecar: &[u8]) -> serde_json::Result<()> {
    let meta: Sidecar = serde_json::from_slice(sidecar)?;

    if let Some(freq) = meta.freq {
        if freq > 0.0 {
            call.frequency = Some(freq as u64);
        }
    }

    if let Some(secs) = meta.start_time {
        if let Some(date_time) = DateTime::from_timestamp(secs, 0) {
            call.date_time = date_time;
        }
    }

    if let Some(tg) = meta.talkgroup {
        call.talkgroup = tg;
    }

    if let Some(tag) = meta.talkgroup_tag {
        if !tag.is_empty() {
            call.talkgroup_tag = Some(tag);
        }
    }

    for source in meta.src_list {
        if source.src > 0 {
            call.sources.push(CallSource {
                pos: source.pos as u32,
                src: source.src as u32,
            });
        }
    }

    Ok(())
}
