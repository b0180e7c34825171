//! Persisted valid-time ranges.
//!
//! A version's validity is stored as text in the closed-interval form
//! `[2024-01-01T00:00:00Z,infinity]`, with `[-infinity,infinity]` for
//! features that have no temporal versioning. The same bounds are also
//! stored as integer seconds so that temporal predicates stay in SQL.

use core::fmt;
use std::str::FromStr;

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use featstore_types::{FAR_FUTURE, FeatureKey, MAX_INSTANT, MIN_INSTANT, TIMELESS, TimeExtent};

use crate::error::{Error, Result};

const INSTANT_FORMAT: &[BorrowedFormatItem<'_>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

const NEG_INFINITY: &str = "-infinity";
const INFINITY: &str = "infinity";

/// Seconds value stored for an unbounded start.
pub const UNBOUNDED_BEGIN: i64 = i64::MIN;
/// Seconds value stored for an unbounded end.
pub const UNBOUNDED_END: i64 = i64::MAX;

/// A closed valid-time interval normalized for persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidRange {
    begin: OffsetDateTime,
    end: OffsetDateTime,
}

impl ValidRange {
    /// The always-valid range.
    pub const UNBOUNDED: ValidRange = ValidRange {
        begin: TIMELESS,
        end: FAR_FUTURE,
    };

    /// Build a range, converting to UTC seconds.
    ///
    /// A begin at or before [`MIN_INSTANT`] becomes `-infinity`; an end at
    /// or after [`MAX_INSTANT`] becomes `infinity`.
    pub fn new(begin: OffsetDateTime, end: OffsetDateTime) -> Self {
        let begin = if begin <= MIN_INSTANT {
            TIMELESS
        } else {
            utc_seconds(begin)
        };
        let end = if end >= MAX_INSTANT {
            FAR_FUTURE
        } else {
            utc_seconds(end)
        };
        Self { begin, end }
    }

    /// Range persisted for a feature's valid time.
    ///
    /// Only an explicit begin produces a bounded range; without one the
    /// feature is always valid whatever its end says.
    pub fn from_extent(extent: Option<&TimeExtent>) -> Self {
        match extent.and_then(|e| e.explicit_begin().map(|b| (b, e.end))) {
            Some((begin, end)) => Self::new(begin, end.unwrap_or(FAR_FUTURE)),
            None => Self::UNBOUNDED,
        }
    }

    /// Range persisted for `key`, taking the end from the feature's valid time.
    ///
    /// The begin always matches the key start so that the row stays
    /// addressable by its primary key.
    pub fn for_key(key: &FeatureKey, extent: Option<&TimeExtent>) -> Self {
        if key.is_timeless() {
            return Self::UNBOUNDED;
        }
        let end = extent.and_then(|e| e.end).unwrap_or(FAR_FUTURE);
        Self::new(key.valid_start_time(), end)
    }

    /// Start of validity, [`TIMELESS`] when unbounded.
    pub fn begin(&self) -> OffsetDateTime {
        self.begin
    }

    /// End of validity, [`FAR_FUTURE`] when unbounded.
    pub fn end(&self) -> OffsetDateTime {
        self.end
    }

    pub fn is_unbounded(&self) -> bool {
        *self == Self::UNBOUNDED
    }

    /// Begin as stored in the `valid_begin` column.
    pub fn begin_seconds(&self) -> i64 {
        start_seconds(self.begin)
    }

    /// End as stored in the `valid_end` column.
    pub fn end_seconds(&self) -> i64 {
        if self.end == FAR_FUTURE {
            UNBOUNDED_END
        } else {
            self.end.unix_timestamp()
        }
    }

    /// Open-ended period equivalent to this range.
    pub fn to_extent(&self) -> TimeExtent {
        TimeExtent {
            begin: (self.begin != TIMELESS).then_some(self.begin),
            end: (self.end != FAR_FUTURE).then_some(self.end),
        }
    }
}

/// Key start as stored in the `valid_begin` column.
pub fn start_seconds(start: OffsetDateTime) -> i64 {
    if start == TIMELESS {
        UNBOUNDED_BEGIN
    } else {
        start.unix_timestamp()
    }
}

fn utc_seconds(t: OffsetDateTime) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(t.unix_timestamp()).unwrap_or(t)
}

fn write_instant(f: &mut fmt::Formatter<'_>, t: OffsetDateTime) -> fmt::Result {
    let text = t.format(INSTANT_FORMAT).map_err(|_| fmt::Error)?;
    write!(f, "{}Z", text)
}

impl fmt::Display for ValidRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        if self.begin == TIMELESS {
            f.write_str(NEG_INFINITY)?;
        } else {
            write_instant(f, self.begin)?;
        }
        f.write_str(",")?;
        if self.end == FAR_FUTURE {
            f.write_str(INFINITY)?;
        } else {
            write_instant(f, self.end)?;
        }
        f.write_str("]")
    }
}

impl FromStr for ValidRange {
    type Err = Error;

    /// Parse the persisted form. PostgreSQL `tstzrange` output is accepted too.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidTimeRange(s.to_string());
        let inner = s
            .trim()
            .trim_matches('"')
            .strip_prefix(|c: char| c == '[' || c == '(')
            .and_then(|rest| rest.strip_suffix(|c: char| c == ']' || c == ')'))
            .ok_or_else(invalid)?;
        let (begin, end) = inner.split_once(',').ok_or_else(invalid)?;

        let begin = match unquote(begin) {
            "" | NEG_INFINITY => TIMELESS,
            text => parse_instant(text).ok_or_else(invalid)?,
        };
        let end = match unquote(end) {
            "" | INFINITY => FAR_FUTURE,
            text => parse_instant(text).ok_or_else(invalid)?,
        };
        Ok(ValidRange::new(begin, end))
    }
}

fn unquote(s: &str) -> &str {
    s.trim().trim_matches('"')
}

/// Parse `2024-01-01T10:00:00Z` as well as `2024-01-01 10:00:00.25+02`.
fn parse_instant(text: &str) -> Option<OffsetDateTime> {
    let text = text.strip_suffix('Z').unwrap_or(text);
    let split = text.find(['T', ' '])?;
    let (date, rest) = (&text[..split], &text[split + 1..]);
    let (clock, offset) = match rest.find(['+', '-']) {
        Some(i) => (&rest[..i], Some(&rest[i..])),
        None => (rest, None),
    };
    let clock = clock.split('.').next()?;
    let local = PrimitiveDateTime::parse(&format!("{}T{}", date, clock), INSTANT_FORMAT).ok()?;
    let offset = match offset {
        Some(o) => parse_offset(o)?,
        None => UtcOffset::UTC,
    };
    OffsetDateTime::from_unix_timestamp(local.assume_offset(offset).unix_timestamp()).ok()
}

fn parse_offset(text: &str) -> Option<UtcOffset> {
    let (sign, digits) = match text.split_at_checked(1)? {
        ("+", d) => (1i8, d),
        ("-", d) => (-1i8, d),
        _ => return None,
    };
    let digits: String = digits.chars().filter(|c| *c != ':').collect();
    if digits.len() != 2 && digits.len() != 4 {
        return None;
    }
    let hours: i8 = digits.get(0..2)?.parse().ok()?;
    let minutes: i8 = match digits.get(2..4) {
        Some(m) => m.parse().ok()?,
        None => 0,
    };
    UtcOffset::from_hms(sign * hours, sign * minutes, 0).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use featstore_types::BigId;
    use proptest::prelude::*;
    use time::macros::datetime;

    #[test]
    fn test_unbounded_encoding() {
        assert_eq!(ValidRange::UNBOUNDED.to_string(), "[-infinity,infinity]");
        assert_eq!(ValidRange::from_extent(None), ValidRange::UNBOUNDED);
        assert_eq!(
            ValidRange::from_extent(Some(&TimeExtent::unbounded())),
            ValidRange::UNBOUNDED
        );
    }

    #[test]
    fn test_end_without_begin_is_unbounded() {
        let extent = TimeExtent::ending_at(datetime!(2024-06-01 0:00 UTC));
        assert_eq!(ValidRange::from_extent(Some(&extent)), ValidRange::UNBOUNDED);
    }

    #[test]
    fn test_min_instant_begin_is_unbounded() {
        let extent = TimeExtent::beginning_at(MIN_INSTANT);
        assert!(ValidRange::from_extent(Some(&extent)).is_unbounded());
    }

    #[test]
    fn test_open_end_encoding() {
        let extent = TimeExtent::beginning_at(datetime!(2024-01-01 10:00:00.900 UTC));
        let range = ValidRange::from_extent(Some(&extent));
        assert_eq!(range.to_string(), "[2024-01-01T10:00:00Z,infinity]");
        assert_eq!(range.end_seconds(), UNBOUNDED_END);
    }

    #[test]
    fn test_closed_encoding() {
        let extent = TimeExtent::period(
            datetime!(2024-01-01 10:00 UTC),
            datetime!(2024-02-01 12:30:15 +02:00),
        );
        assert_eq!(
            ValidRange::from_extent(Some(&extent)).to_string(),
            "[2024-01-01T10:00:00Z,2024-02-01T10:30:15Z]"
        );
    }

    #[test]
    fn test_far_end_becomes_infinity() {
        let extent = TimeExtent::period(datetime!(2024-01-01 0:00 UTC), MAX_INSTANT);
        assert_eq!(
            ValidRange::from_extent(Some(&extent)).to_string(),
            "[2024-01-01T00:00:00Z,infinity]"
        );
    }

    #[test]
    fn test_for_key_uses_key_start() {
        let key = FeatureKey::new(BigId::new(1, 3), datetime!(2024-03-01 0:00 UTC));
        let extent = TimeExtent::period(
            datetime!(2024-01-01 0:00 UTC),
            datetime!(2024-12-31 0:00 UTC),
        );
        let range = ValidRange::for_key(&key, Some(&extent));
        assert_eq!(range.begin(), datetime!(2024-03-01 0:00 UTC));
        assert_eq!(range.end(), datetime!(2024-12-31 0:00 UTC));

        let timeless = FeatureKey::timeless(BigId::new(1, 3));
        assert!(ValidRange::for_key(&timeless, Some(&extent)).is_unbounded());
    }

    #[test]
    fn test_parse_own_output() {
        let range: ValidRange = "[2024-01-01T10:00:00Z,infinity]".parse().unwrap();
        assert_eq!(range.begin(), datetime!(2024-01-01 10:00 UTC));
        assert_eq!(range.end(), FAR_FUTURE);

        let range: ValidRange = "[-infinity,infinity]".parse().unwrap();
        assert!(range.is_unbounded());
        assert_eq!(range.to_extent(), TimeExtent::unbounded());
    }

    #[test]
    fn test_parse_postgres_output() {
        let range: ValidRange = r#"["2024-01-01 10:00:00.5+00","2024-01-02 00:00:00+02:00")"#
            .parse()
            .unwrap();
        assert_eq!(range.begin(), datetime!(2024-01-01 10:00 UTC));
        assert_eq!(range.end(), datetime!(2024-01-01 22:00 UTC));

        let range: ValidRange = "[2024-01-01 10:00:00-05,)".parse().unwrap();
        assert_eq!(range.begin(), datetime!(2024-01-01 15:00 UTC));
        assert_eq!(range.end(), FAR_FUTURE);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("2024-01-01".parse::<ValidRange>().is_err());
        assert!("[2024-01-01T10:00:00Z]".parse::<ValidRange>().is_err());
        assert!("[yesterday,infinity]".parse::<ValidRange>().is_err());
        assert!("[2024-01-01T10:00:00+0x,infinity]".parse::<ValidRange>().is_err());
    }

    #[test]
    fn test_start_seconds() {
        assert_eq!(start_seconds(TIMELESS), UNBOUNDED_BEGIN);
        let t = datetime!(2024-01-01 0:00 UTC);
        assert_eq!(start_seconds(t), 1_704_067_200);
    }

    proptest! {
        #[test]
        fn prop_encoding_is_parsed_back(
            begin in 0i64..4_000_000_000,
            length in 0i64..100_000_000,
        ) {
            let begin = OffsetDateTime::from_unix_timestamp(begin).unwrap();
            let end = begin + time::Duration::seconds(length);
            let range = ValidRange::new(begin, end);
            let parsed: ValidRange = range.to_string().parse().unwrap();
            prop_assert_eq!(parsed, range);
        }
    }
}
