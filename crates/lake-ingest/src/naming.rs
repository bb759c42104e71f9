//! File naming convention
//!
//! Files dropped into a watched location must be named
//! `label_source_location_YYYYMMDD_HHMMSS.ext`:
//!
//! - `label`: one or more ASCII letters
//! - `source`, `location`: exactly three ASCII letters
//! - `YYYYMMDD`: a real calendar date (no April 31st, February 29th only in
//!   leap years)
//! - `HHMMSS`: a 24-hour time; the hour pair may be omitted (`MMSS`)
//! - `ext`: `csv` or `txt`, and only one dotted suffix
//!
//! [`classify`] is pure. A rejection carries the reason so callers can log
//! it; it never has side effects.

use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use thiserror::Error;

#[allow(clippy::expect_used)]
static LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]+$").expect("label pattern is a literal"));

#[allow(clippy::expect_used)]
static CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]{3}$").expect("code pattern is a literal"));

/// Accepted data file suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Extension {
    Csv,
    Txt,
}

impl Extension {
    fn parse(ext: &str) -> Option<Self> {
        match ext {
            "csv" => Some(Extension::Csv),
            "txt" => Some(Extension::Txt),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Extension::Csv => "csv",
            Extension::Txt => "txt",
        }
    }

    /// Content type used when the file is put into the object store
    pub fn content_type(self) -> &'static str {
        match self {
            Extension::Csv => "text/csv",
            Extension::Txt => "text/plain",
        }
    }
}

/// A file name that satisfied every rule of the convention
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDescriptor {
    pub raw_name: String,
    pub label: String,
    pub source: String,
    pub location: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub extension: Extension,
}

/// Why a name was turned away
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("more than one dotted suffix")]
    MultipleExtensions,

    #[error("no extension")]
    MissingExtension,

    #[error("extension '{0}' is not csv or txt")]
    UnsupportedExtension(String),

    #[error("expected 5 underscore-separated fields, found {0}")]
    SegmentCount(usize),

    #[error("label must be one or more letters")]
    Label,

    #[error("source must be exactly three letters")]
    Source,

    #[error("location must be exactly three letters")]
    Location,

    #[error("'{0}' is not a calendar date (YYYYMMDD)")]
    Date(String),

    #[error("'{0}' is not a 24-hour time (HHMMSS)")]
    Time(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rejected '{name}': {reason}")]
pub struct Rejected {
    pub name: String,
    pub reason: RejectReason,
}

/// Parse `name` against the naming convention.
pub fn classify(name: &str) -> Result<FileDescriptor, Rejected> {
    parse(name).map_err(|reason| Rejected {
        name: name.to_string(),
        reason,
    })
}

/// Shorthand for callers that only filter
pub fn is_accepted(name: &str) -> bool {
    classify(name).is_ok()
}

fn parse(name: &str) -> Result<FileDescriptor, RejectReason> {
    let (stem, ext) = match name.matches('.').count() {
        0 => return Err(RejectReason::MissingExtension),
        1 => name.split_once('.').ok_or(RejectReason::MissingExtension)?,
        _ => return Err(RejectReason::MultipleExtensions),
    };

    if ext.is_empty() {
        return Err(RejectReason::MissingExtension);
    }
    let extension =
        Extension::parse(ext).ok_or_else(|| RejectReason::UnsupportedExtension(ext.to_string()))?;

    let fields: Vec<&str> = stem.split('_').collect();
    let [label, source, location, date, time] = fields[..] else {
        return Err(RejectReason::SegmentCount(fields.len()));
    };

    if !LABEL.is_match(label) {
        return Err(RejectReason::Label);
    }
    if !CODE.is_match(source) {
        return Err(RejectReason::Source);
    }
    if !CODE.is_match(location) {
        return Err(RejectReason::Location);
    }

    let date = parse_date(date).ok_or_else(|| RejectReason::Date(date.to_string()))?;
    let time = parse_time(time).ok_or_else(|| RejectReason::Time(time.to_string()))?;

    Ok(FileDescriptor {
        raw_name: name.to_string(),
        label: label.to_string(),
        source: source.to_string(),
        location: location.to_string(),
        date,
        time,
        extension,
    })
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    if s.len() != 8 || !all_digits(s) {
        return None;
    }
    let year = s[0..4].parse().ok()?;
    let month = s[4..6].parse().ok()?;
    let day = s[6..8].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    if !all_digits(s) {
        return None;
    }
    let (hour, rest) = match s.len() {
        6 => (s[0..2].parse().ok()?, &s[2..]),
        4 => (0, s),
        _ => return None,
    };
    let minute = rest[0..2].parse().ok()?;
    let second = rest[2..4].parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, second)
}
