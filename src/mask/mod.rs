//! Filename-mask metadata parser.
//!
//! A mask is a user-supplied template such as `SYS#SYS_TG#TG_#DATE-#TIME`.
//! Each `#`-token names a metadata field and is substituted with a capture
//! expression; the compiled expression is then matched against the
//! extension-stripped filename and the captures are applied to a call.
//!
//! The parser is infallible: an unparseable field leaves the corresponding
//! call attribute untouched, and a mask that fails to match leaves the call
//! unmodified.

#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use std::collections::HashMap;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::call::{Call, CallSource};
use crate::ingest::SystemRegistry;

/// Token table: key, literal token, capture expression.
///
/// Substitution is attempted in this order. Longer tokens precede their
/// prefixes, so `#SYSLBL` wins over `#SYS` and the `#TG…` family over `#TG`.
const TOKENS: &[(&str, &str, &str)] = &[
    ("date", "#DATE", r"\d{4}[-_]{0,1}\d{2}[-_]{0,1}\d{2}"),
    ("group", "#GROUP", r"[a-zA-Z0-9. -]+"),
    ("hz", "#HZ", r"\d+"),
    ("khz", "#KHZ", r"[\d.]+"),
    ("mhz", "#MHZ", r"[\d.]+"),
    ("syslbl", "#SYSLBL", r"[a-zA-Z0-9,. -]+"),
    ("sys", "#SYS", r"\d+"),
    ("tag", "#TAG", r"[a-zA-Z0-9. -]+"),
    ("tgafs", "#TGAFS", r"\d{2}-\d{3}"),
    ("tghz", "#TGHZ", r"\d+"),
    ("tgkhz", "#TGKHZ", r"[\d.]+"),
    ("tglbl", "#TGLBL", r"[a-zA-Z0-9,. -]+"),
    ("tgmhz", "#TGMHZ", r"[\d.]+"),
    ("tg", "#TG", r"\d+"),
    ("time", "#TIME", r"\d{2}[-:]{0,1}\d{2}[-:]{0,1}\d{2}"),
    ("unit", "#UNIT", r"\d+"),
    ("ztime", "#ZTIME", r"\d{2}[-:]{0,1}\d{2}[-:]{0,1}\d{2}"),
];

static COMPACT_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{4})(\d{2})(\d{2})").unwrap());
static TIME_PARTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{2})[^\d]*(\d{2})[^\d]*(\d{2})").unwrap());
static NON_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\d]").unwrap());

/// Extract metadata from `call.audio_name` according to `mask` and apply it.
///
/// Unknown system labels are allocated a fresh id from `systems` and leave a
/// label hint on the call for downstream registration.
pub fn apply(mask: &str, call: &mut Call, systems: &SystemRegistry) {
    if mask.is_empty() || call.audio_name.is_empty() {
        return;
    }

    // Substitute the first occurrence of each token with its capture
    // expression, remembering where in the template it sat. Capture order in
    // the compiled expression is template position order, not table order.
    let mut pattern = mask.to_string();
    let mut positions: Vec<(&str, usize)> = Vec::new();
    for &(key, token, capture) in TOKENS {
        if let Some(i) = pattern.find(token) {
            positions.push((key, i));
            pattern.replace_range(i..i + token.len(), &format!("({capture})"));
        }
    }
    positions.sort_by_key(|&(_, i)| i);

    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(err) => {
            tracing::warn!(mask, error = %err, "invalid mask expression");
            return;
        }
    };

    let base = strip_extension(&call.audio_name);
    let Some(caps) = re.captures(base) else {
        return;
    };

    let mut values: HashMap<&str, String> = HashMap::new();
    for (i, &(key, _)) in positions.iter().enumerate() {
        if let Some(m) = caps.get(i + 1) {
            values.insert(key, m.as_str().to_string());
        }
    }

    apply_values(&values, call, systems);
}

fn apply_values(values: &HashMap<&str, String>, call: &mut Call, systems: &SystemRegistry) {
    // Precedence chains are presence-based: a captured-but-unparseable field
    // consumes its branch without falling through.
    if let Some(date) = values.get("date") {
        let date = COMPACT_DATE.replace_all(date, "$1-$2-$3").into_owned();
        if let Some(time) = values.get("time") {
            let time = TIME_PARTS.replace_all(time, "$1:$2:$3");
            if let Ok(naive) =
                NaiveDateTime::parse_from_str(&format!("{date}T{time}"), "%Y-%m-%dT%H:%M:%S")
            {
                if let Some(local) = Local.from_local_datetime(&naive).earliest() {
                    call.date_time = local.with_timezone(&Utc);
                }
            }
        } else if let Some(ztime) = values.get("ztime") {
            let ztime = TIME_PARTS.replace_all(ztime, "$1:$2:$3");
            if let Ok(naive) =
                NaiveDateTime::parse_from_str(&format!("{date}T{ztime}"), "%Y-%m-%dT%H:%M:%S")
            {
                call.date_time = Utc.from_utc_datetime(&naive);
            }
        } else {
            let digits = NON_DIGITS.replace_all(&date, "");
            if let Ok(secs) = digits.parse::<i64>() {
                if let Some(dt) = DateTime::from_timestamp(secs, 0) {
                    call.date_time = dt;
                }
            }
        }
    }

    if let Some(group) = values.get("group") {
        if !group.is_empty() && group != "-" {
            call.talkgroup_group = Some(group.clone());
        }
    }

    if let Some(v) = values.get("hz") {
        if let Ok(hz) = v.parse::<f64>() {
            call.frequency = Some(hz as u64);
        }
    } else if let Some(v) = values.get("khz") {
        if let Ok(khz) = v.parse::<f64>() {
            call.frequency = Some((khz * 1e3) as u64);
        }
    } else if let Some(v) = values.get("mhz") {
        if let Ok(mhz) = v.parse::<f64>() {
            call.frequency = Some((mhz * 1e6) as u64);
        }
    }

    if let Some(v) = values.get("sys") {
        if let Ok(id) = v.parse::<u32>() {
            call.system = id;
        }
    } else if let Some(label) = values.get("syslbl") {
        if let Some(id) = systems.get_system(label) {
            call.system = id;
        } else {
            call.system = systems.new_system_id();
            call.system_label = Some(label.clone());
        }
    }

    if let Some(tag) = values.get("tag") {
        if !tag.is_empty() && tag != "-" {
            call.talkgroup_tag = Some(tag.clone());
        }
    }

    if let Some(v) = values.get("tg") {
        if let Ok(id) = v.parse::<u32>() {
            call.talkgroup = id;
        }
    } else if let Some(v) = values.get("tgafs") {
        call.talkgroup = decode_afs(v).unwrap_or(call.talkgroup);
    } else if let Some(v) = values.get("tghz") {
        if let Ok(hz) = v.parse::<f64>() {
            call.frequency = Some(hz as u64);
            call.talkgroup = (hz / 1e3) as u32;
        }
    } else if let Some(v) = values.get("tgkhz") {
        if let Ok(khz) = v.parse::<f64>() {
            call.frequency = Some((khz * 1e3) as u64);
            call.talkgroup = khz as u32;
        }
    } else if let Some(v) = values.get("tgmhz") {
        if let Ok(mhz) = v.parse::<f64>() {
            call.frequency = Some((mhz * 1e6) as u64);
            call.talkgroup = (mhz * 1e3) as u32;
        }
    }

    if let Some(label) = values.get("tglbl") {
        if !label.is_empty() {
            call.talkgroup_label = Some(label.clone());
        }
    }

    if let Some(v) = values.get("unit") {
        if let Ok(src) = v.parse::<u32>() {
            call.sources.push(CallSource { pos: 0, src });
        }
    }
}

/// Decode an APCO AFS talkgroup of the form `NN-NNN` as
/// `(a << 7) | (b << 3) | c`. No range validation is performed on the
/// captured digits.
fn decode_afs(v: &str) -> Option<u32> {
    if v.len() != 6 || v.as_bytes()[2] != b'-' {
        return None;
    }
    let a: u32 = v[..2].parse().ok()?;
    let b: u32 = v[3..5].parse().ok()?;
    let c: u32 = v[5..].parse().ok()?;
    Some((a << 7) | (b << 3) | c)
}

fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(i) => &name[..i],
        None => name,
    }
}
