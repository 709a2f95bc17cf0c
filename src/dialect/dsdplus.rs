//! DSDPlus per-call filename metadata.
//!
//! DSDPlus names per-call recordings with underscore-separated segments:
//! a `YYYYMMDD_HHMMSS` prefix, optionally followed by the frequency in
//! hertz, a `TG<id>` segment and a `SRC<unit>` segment, e.g.
//! `20220115_123045_462550000_TG100_SRC4521.mp3`. Unrecognized segments are
//! ignored.

use std::path::Path;

use chrono::{Local, NaiveDate, TimeZone, Utc};

use crate::call::{Call, CallSource};

/// Extract DSDPlus metadata from the filename and apply it to the call.
/// Fields that do not parse are left untouched.
pub(super) fn apply_meta(call: &mut Call, path: &Path) {
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        return;
    };

    let mut segments = stem.split('_');

    let date = segments.next().unwrap_or_default();
    let time = segments.next().unwrap_or_default();
    if let Some(date_time) = parse_local_stamp(date, time) {
        call.date_time = date_time;
    }

    for segment in segments {
        if let Some(tg) = segment.strip_prefix("TG") {
            if let Ok(id) = tg.parse::<u32>() {
                call.talkgroup = id;
            }
        } else if let Some(src) = segment.strip_prefix("SRC") {
            if let Ok(unit) = src.parse::<u32>() {
                call.sources.push(CallSource { pos: 0, src: unit });
            }
        } else if segment.len() >= 6 && segment.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(hz) = segment.parse::<u64>() {
                call.frequency = Some(hz);
            }
        }
    }
}

/// Parse `YYYYMMDD` + `HHMMSS` as local wall-clock time, converted to UTC.
fn parse_local_stamp(date: &str, time: &str) -> Option<chrono::DateTime<Utc>> {
    if date.len() != 8 || time.len() != 6 {
        return None;
    }
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

    fn parse(name: &str) -> Call {
        let mut call = Call::new();
        apply_meta(&mut call, &PathBuf::from(name));
        call
    }

    #[test]
    fn test_full_filename() {
        let call = parse("/calls/20220115_123045_462550000_TG100_SRC4521.mp3");
        assert_eq!(call.talkgroup, 100);
        assert_eq!(call.frequency, Some(462_550_000));
        assert_eq!(call.sources, vec![CallSource { pos: 0, src: 4521 }]);

        let expected = Local
            .from_local_datetime(
                &NaiveDate::from_ymd_opt(2022, 1, 15)
                    .unwrap()
                    .and_hms_opt(12, 30, 45)
                    .unwrap(),
            )
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(call.date_time, expected);
    }

    #[test]
    fn test_minimal_filename() {
        let call = parse("20220115_123045_TG8.mp3");
        assert_eq!(call.talkgroup, 8);
        assert_eq!(call.frequency, None);
        assert!(call.sources.is_empty());
    }

    #[test]
    fn test_unrecognized_segments_ignored() {
        let call = parse("20220115_123045_P25_TG8_extra.mp3");
        assert_eq!(call.talkgroup, 8);
        assert_eq!(call.frequency, None);
    }

    #[test]
    fn test_garbage_filename_leaves_call_untouched() {
        let before = Call::new();
        let call = parse("not-a-dsdplus-name.mp3");
        assert_eq!(call.talkgroup, before.talkgroup);
        assert!(call.sources.is_empty());
    }
}
