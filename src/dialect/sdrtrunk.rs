//! SDRTrunk recording metadata.
//!
//! SDRTrunk stamps its mp3 recordings with ID3 tags: the album names the
//! radio system, the title the talkgroup, the artist the source radio, and
//! the date-recorded frame the call start. Recordings without usable tags
//! fall back to the filename convention
//! `YYYYMMDD_HHMMSS<System Label>__TO_<tg>_FROM_<src>`.

use std::path::Path;

use chrono::{Local, NaiveDate, TimeZone, Utc};
use id3::{Tag, TagLike};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::call::{Call, CallSource};
use crate::ingest::SystemRegistry;

static FILENAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{8})_(\d{6})(.*?)__TO_(\d+)(?:_FROM_(\d+))?").unwrap()
});

/// Extract SDRTrunk metadata from the recording's ID3 tags, falling back to
/// the filename convention when no tag yields a talkgroup.
pub(super) fn apply_meta(call: &mut Call, path: &Path, systems: &SystemRegistry) {
    if let Ok(tag) = Tag::read_from_path(path) {
        apply_tag(call, &tag, systems);
    }

    if call.talkgroup == 0 {
        apply_filename(call, path, systems);
    }
}

fn apply_tag(call: &mut Call, tag: &Tag, systems: &SystemRegistry) {
    if let Some(album) = tag.album() {
        let album = album.trim();
        if !album.is_empty() {
            resolve_system(call, album, systems);
        }
    }

    if let Some(title) = tag.title() {
        let title = title.trim();
        if let Some(tg) = leading_digits(title) {
            call.talkgroup = tg;
        }
        if !title.is_empty() {
            call.talkgroup_label = Some(title.to_string());
        }
    }

    if let Some(artist) = tag.artist() {
        if let Some(src) = leading_digits(artist.trim()) {
            call.sources.push(CallSource { pos: 0, src });
        }
    }

    if let Some(ts) = tag.date_recorded() {
        if let Some(date_time) = timestamp_to_utc(&ts) {
            call.date_time = date_time;
        }
    }
}

fn apply_filename(call: &mut Call, path: &Path, systems: &SystemRegistry) {
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        return;
    };
    let Some(caps) = FILENAME.captures(stem) else {
        return;
    };

    if let (Some(date), Some(time)) = (caps.get(1), caps.get(2)) {
        if let Some(date_time) = parse_local_stamp(date.as_str(), time.as_str()) {
            call.date_time = date_time;
        }
    }

    if let Some(label) = caps.get(3) {
        let label = label.as_str().trim_matches('_').replace('_', " ");
        if !label.is_empty() {
            resolve_system(call, &label, systems);
        }
    }

    if let Some(tg) = caps.get(4).and_then(|m| m.as_str().parse::<u32>().ok()) {
        call.talkgroup = tg;
    }

    if let Some(src) = caps.get(5).and_then(|m| m.as_str().parse::<u32>().ok()) {
        call.sources.push(CallSource { pos: 0, src });
    }
}

/// Resolve a system label through the registry, allocating a fresh id and
/// leaving the label hint on a miss.
fn resolve_system(call: &mut Call, label: &str, systems: &SystemRegistry) {
    if let Some(id) = systems.get_system(label) {
        call.system = id;
    } else {
        call.system = systems.new_system_id();
        call.system_label = Some(label.to_string());
    }
}

fn leading_digits(s: &str) -> Option<u32> {
    let digits: String = s.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

fn timestamp_to_utc(ts: &id3::Timestamp) -> Option<chrono::DateTime<Utc>> {
    let naive = NaiveDate::from_ymd_opt(
        ts.year,
        u32::from(ts.month?),
        u32::from(ts.day?),
    )?
    .and_hms_opt(
        u32::from(ts.hour.unwrap_or(0)),
        u32::from(ts.minute.unwrap_or(0)),
        u32::from(ts.second.unwrap_or(0)),
    )?;
    Some(
        Local
            .from_local_datetime(&naive)
            .earliest()?
            .with_timezone(&Utc),
    )
}

/// Parse `YYYYMMDD` + `HHMMSS` as local wall-clock time, converted to UTC.
fn parse_local_stamp(date: &str, time: &str) -> Option<chrono::DateTime<Utc>> {
    let naive = NaiveDate::from_ymd_opt(
        date[..4].parse().ok()?,
        date[4..6].parse().ok()?,
        date[6..].parse().ok()?,
    )?
    .and_hms_opt(
        time[..2].parse().ok()?,
        time[2..4].parse().ok()?,
        time[4..].parse().ok()?,
    )?;
    Some(
        Local
            .from_local_datetime(&naive)
            .earliest()?
            .with_timezone(&Utc),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_filename_fallback() {
        let systems = SystemRegistry::new();
        let mut call = Call::new();
        apply_filename(
            &mut call,
            &PathBuf::from("20220115_123045County_TRS__TO_2701_FROM_4521.mp3"),
            &systems,
        );

        assert_eq!(call.talkgroup, 2701);
        assert_eq!(call.sources, vec![CallSource { pos: 0, src: 4521 }]);
        assert_eq!(call.system_label.as_deref(), Some("County TRS"));
        assert!(call.system > 0);
    }

    #[test]
    fn test_filename_fallback_without_source() {
        let systems = SystemRegistry::new();
        let mut call = Call::new();
        apply_filename(
            &mut call,
            &PathBuf::from("20220115_123045County__TO_2701.mp3"),
            &systems,
        );
        assert_eq!(call.talkgroup, 2701);
        assert!(call.sources.is_empty());
    }

    #[test]
    fn test_known_label_resolves_to_existing_id() {
        let systems = SystemRegistry::new();
        systems.insert("County TRS", 7);
        let mut call = Call::new();
        apply_filename(
            &mut call,
            &PathBuf::from("20220115_123045County_TRS__TO_2701_FROM_4521.mp3"),
            &systems,
        );
        assert_eq!(call.system, 7);
        assert!(call.system_label.is_none());
    }

    #[test]
    fn test_unrelated_filename_is_ignored() {
        let systems = SystemRegistry::new();
        let mut call = Call::new();
        apply_filename(&mut call, &PathBuf::from("ambient-noise.mp3"), &systems);
        assert_eq!(call.talkgroup, 0);
        assert_eq!(call.system, 0);
    }

    #[test]
    fn test_leading_digits() {
        assert_eq!(leading_digits("2701 Sheriff Dispatch"), Some(2701));
        assert_eq!(leading_digits("Sheriff"), None);
        assert_eq!(leading_digits(""), None);
    }
}
