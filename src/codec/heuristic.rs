//! Best-effort field extraction from unrecognized binary payloads.
//!
//! Some firmware generations emit ad-hoc text fragments or binary blobs with
//! embedded label/value pairs. The scan works over the lossy UTF-8 decoding
//! of the bytes with an explicit grammar:
//!
//! ```text
//! match  := label sep* value
//! label  := known field label, not preceded or followed by [A-Za-z0-9_]
//! sep    := ':' | '=' | '"' | whitespace
//! value  := number | 'true' | 'false'
//! number := ['-'] digits ['.' digits] [('e'|'E') ['-'|'+'] digits]
//! ```
//!
//! The first match per label wins. A scan that finds nothing is still a
//! successful (empty) result.

use crate::robot::Channel;
use serde_json::{Map, Number, Value};

/// Expected value shape for a scanned label.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FieldKind {
    Number,
    Bool,
}

/// Labels worth scanning for, per channel. Aliases are listed individually;
/// the field normalizer folds them onto canonical names.
pub(crate) fn labels_for(channel: Channel) -> &'static [(&'static str, FieldKind)] {
    match channel {
        Channel::Status => &[
            ("status", FieldKind::Number),
            ("operation_state", FieldKind::Number),
            ("drive_state", FieldKind::Number),
            ("delivery_state", FieldKind::Number),
            ("cruise_state", FieldKind::Number),
            ("lid_status", FieldKind::Number),
        ],
        Channel::Battery => &[
            ("battery_percent", FieldKind::Number),
            ("percentage", FieldKind::Number),
            ("soc", FieldKind::Number),
            ("voltage", FieldKind::Number),
            ("current", FieldKind::Number),
            ("charging", FieldKind::Bool),
        ],
        Channel::Gps => &[
            ("latitude", FieldKind::Number),
            ("lat", FieldKind::Number),
            ("longitude", FieldKind::Number),
            ("lon", FieldKind::Number),
            ("accuracy", FieldKind::Number),
        ],
        Channel::Speed => &[
            ("speed", FieldKind::Number),
            ("velocity", FieldKind::Number),
            ("heading", FieldKind::Number),
        ],
    }
}

/// Scan text for known labels and extract best-effort values.
pub(crate) fn scan(text: &str, labels: &[(&str, FieldKind)]) -> Map<String, Value> {
    let mut fields = Map::new();

    for (label, kind) in labels {
        if let Some(value) = find_labelled_value(text, label, *kind) {
            fields.insert((*label).to_string(), value);
        }
    }

    fields
}

fn find_labelled_value(text: &str, label: &str, kind: FieldKind) -> Option<Value> {
    let bytes = text.as_bytes();
    let mut search_from = 0;

    while let Some(offset) = text[search_from..].find(label) {
        let start = search_from + offset;
        let end = start + label.len();
        search_from = start + 1;

        // Label must stand alone as a token: `lat` must not match `plate`
        // or `latitude`.
        let before_ok = start == 0 || !is_word_byte(bytes[start - 1]);
        let after_ok = end == bytes.len() || !is_word_byte(bytes[end]);
        if !before_ok || !after_ok {
            continue;
        }

        let rest = skip_separators(&text[end..]);
        let parsed = match kind {
            FieldKind::Number => parse_number(rest),
            FieldKind::Bool => parse_bool(rest),
        };
        if parsed.is_some() {
            return parsed;
        }
    }

    None
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn skip_separators(text: &str) -> &str {
    text.trim_start_matches(|c: char| c == ':' || c == '=' || c == '"' || c.is_whitespace())
}

fn parse_bool(text: &str) -> Option<Value> {
    if text.starts_with("true") {
        Some(Value::Bool(true))
    } else if text.starts_with("false") {
        Some(Value::Bool(false))
    } else {
        // 0/1 encodings of boolean flags
        match parse_number(text) {
            Some(Value::Number(n)) => n.as_i64().map(|i| Value::Bool(i != 0)),
            _ => None,
        }
    }
}

fn parse_number(text: &str) -> Option<Value> {
    let bytes = text.as_bytes();
    let mut i = 0;

    if i < bytes.len() && bytes[i] == b'-' {
        i += 1;
    }
    let digits_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i == digits_start {
        return None;
    }

    let mut is_float = false;
    if i < bytes.len() && bytes[i] == b'.' {
        let frac_start = i + 1;
        let mut j = frac_start;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > frac_start {
            is_float = true;
            i = j;
        }
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'-' || bytes[j] == b'+') {
            j += 1;
        }
        let exp_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            is_float = true;
            i = j;
        }
    }

    let literal = &text[..i];
    if is_float {
        literal
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
    } else {
        literal.parse::<i64>().ok().map(|v| Value::Number(v.into()))
    }
}
