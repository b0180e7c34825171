//! Valid-time periods and instant sentinels.
//!
//! Valid time is the period during which one version of a feature
//! description is authoritative. Either end of a [`TimeExtent`] may be open.

use core::fmt;

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::{datetime, format_description};
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime};

/// Earliest instant the backing database can represent (4700 BC).
///
/// Instants at or before this are treated as "no time".
pub const MIN_INSTANT: OffsetDateTime = match Date::from_calendar_date(-4699, Month::January, 1) {
    Ok(date) => date.midnight().assume_utc(),
    Err(_) => panic!("invalid minimum instant"),
};

/// Latest instant persisted as a literal timestamp; later ones become `infinity`.
pub const MAX_INSTANT: OffsetDateTime = datetime!(3000-01-01 0:00 UTC);

/// Sentinel valid-start for features without temporal versioning.
pub const TIMELESS: OffsetDateTime = PrimitiveDateTime::MIN.assume_utc();

/// Sentinel for an unbounded end of validity.
pub const FAR_FUTURE: OffsetDateTime = PrimitiveDateTime::MAX.assume_utc();

/// Drop the sub-second part of an instant.
pub fn truncate_to_seconds(t: OffsetDateTime) -> OffsetDateTime {
    t.replace_nanosecond(0).unwrap_or(t)
}

/// A period of validity; `None` on either side means open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeExtent {
    /// Start of validity, `None` when unbounded.
    pub begin: Option<OffsetDateTime>,
    /// End of validity, `None` when still valid.
    pub end: Option<OffsetDateTime>,
}

impl TimeExtent {
    /// A closed period.
    pub fn period(begin: OffsetDateTime, end: OffsetDateTime) -> Self {
        Self {
            begin: Some(begin),
            end: Some(end),
        }
    }

    /// A period starting at `begin` with no end.
    pub fn beginning_at(begin: OffsetDateTime) -> Self {
        Self {
            begin: Some(begin),
            end: None,
        }
    }

    /// A period with no start, ending at `end`.
    pub fn ending_at(end: OffsetDateTime) -> Self {
        Self {
            begin: None,
            end: Some(end),
        }
    }

    /// A single instant.
    pub fn instant(at: OffsetDateTime) -> Self {
        Self::period(at, at)
    }

    /// Always valid.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// The begin instant if it is after [`MIN_INSTANT`].
    ///
    /// Only such features get discrete historical versions.
    pub fn explicit_begin(&self) -> Option<OffsetDateTime> {
        self.begin.filter(|b| *b > MIN_INSTANT)
    }

    /// Whether the end is before the begin.
    pub fn is_inverted(&self) -> bool {
        matches!((self.begin, self.end), (Some(b), Some(e)) if e < b)
    }

    /// Whether `at` falls inside this period (ends inclusive).
    pub fn contains(&self, at: OffsetDateTime) -> bool {
        self.begin.is_none_or(|b| b <= at) && self.end.is_none_or(|e| at <= e)
    }
}

const OPEN_BOUND: &str = "..";

// RFC 3339 has no years before 0000; earlier UTC instants use a signed year.
const SIGNED_YEAR_FORMAT: &[BorrowedFormatItem<'_>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z");
const SIGNED_YEAR_SUBSEC_FORMAT: &[BorrowedFormatItem<'_>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]Z");

/// Format an instant as RFC 3339, or as `-YYYY-MM-DDTHH:MM:SSZ` (UTC) for
/// years before 0000.
pub fn format_instant(t: OffsetDateTime) -> Result<String, time::error::Format> {
    if t.year() >= 0 {
        return t.format(&Rfc3339);
    }
    let utc = t.to_offset(time::UtcOffset::UTC);
    if utc.nanosecond() == 0 {
        utc.format(SIGNED_YEAR_FORMAT)
    } else {
        utc.format(SIGNED_YEAR_SUBSEC_FORMAT)
    }
}

/// Parse the output of [`format_instant`].
pub fn parse_instant(s: &str) -> Result<OffsetDateTime, time::error::Parse> {
    OffsetDateTime::parse(s, &Rfc3339).or_else(|e| {
        PrimitiveDateTime::parse(s, SIGNED_YEAR_FORMAT)
            .or_else(|_| PrimitiveDateTime::parse(s, SIGNED_YEAR_SUBSEC_FORMAT))
            .map(PrimitiveDateTime::assume_utc)
            .map_err(|_| e)
    })
}

fn write_bound<S: Serializer>(bound: Option<OffsetDateTime>) -> Result<String, S::Error> {
    match bound {
        None => Ok(OPEN_BOUND.to_string()),
        Some(t) => format_instant(t).map_err(serde::ser::Error::custom),
    }
}

fn read_bound<E: de::Error>(value: Option<&str>) -> Result<Option<OffsetDateTime>, E> {
    match value {
        None | Some(OPEN_BOUND) | Some("now") => Ok(None),
        Some(s) => parse_instant(s)
            .map(Some)
            .map_err(|e| E::custom(format!("invalid time '{}': {}", s, e))),
    }
}

// Serialized as a two-element array, open ends as "..".
impl Serialize for TimeExtent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&write_bound::<S>(self.begin)?)?;
        tuple.serialize_element(&write_bound::<S>(self.end)?)?;
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for TimeExtent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ExtentVisitor;

        impl<'de> Visitor<'de> for ExtentVisitor {
            type Value = TimeExtent;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an array [begin, end] of RFC 3339 times or \"..\"")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<TimeExtent, A::Error> {
                let begin: Option<String> = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let end: Option<String> = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                Ok(TimeExtent {
                    begin: read_bound(begin.as_deref())?,
                    end: read_bound(end.as_deref())?,
                })
            }
        }

        deserializer.deserialize_tuple(2, ExtentVisitor)
    }
}
