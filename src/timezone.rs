//! Conversion of track log timestamps to local wall-clock time.
//!
//! One [`TimeNormalizer`] lives for one import session. The UTC offset is
//! computed once, from the first timestamp the session sees, and then applied
//! to every later timestamp. A session spanning a daylight-saving change is
//! therefore converted with a single offset; a first point falling on a DST
//! boundary fixes that boundary's reading for the whole session. This is a
//! known limitation.

use std::sync::OnceLock;

use chrono::{LocalResult, NaiveDate, Offset, TimeZone};
use chrono_tz::{OffsetComponents, Tz};
use time::{Duration, PrimitiveDateTime, UtcOffset};
use tracing::{debug, warn};

use crate::error::TimezoneError;

#[derive(Debug)]
pub struct TimeNormalizer {
    zone: Tz,
    offset: OnceLock<UtcOffset>,
}

impl TimeNormalizer {
    pub fn new(zone: &str) -> Result<Self, TimezoneError> {
        let zone: Tz = zone
            .parse()
            .map_err(|_| TimezoneError::UnknownZone(zone.to_owned()))?;
        Ok(TimeNormalizer {
            zone,
            offset: OnceLock::new(),
        })
    }

    pub fn zone_name(&self) -> &str {
        self.zone.name()
    }

    /// The session offset, if one has been established.
    pub fn offset(&self) -> Option<UtcOffset> {
        self.offset.get().copied()
    }

    /// Establishes the session offset from `first` unless one already exists,
    /// and returns the session offset.
    pub fn establish_offset(&self, first: PrimitiveDateTime) -> Result<UtcOffset, TimezoneError> {
        if let Some(offset) = self.offset.get() {
            return Ok(*offset);
        }
        let offset = utc_offset_at(self.zone, first)?;
        let offset = *self.offset.get_or_init(|| offset);
        debug!(zone = self.zone.name(), %offset, "established session offset");
        Ok(offset)
    }

    /// Shifts a naive UTC timestamp into the zone's local wall-clock time.
    pub fn localize(&self, raw: PrimitiveDateTime) -> PrimitiveDateTime {
        let offset = match self.establish_offset(raw) {
            Ok(offset) => offset,
            Err(e) => {
                warn!(zone = self.zone.name(), "{e}, using UTC");
                UtcOffset::UTC
            }
        };
        raw.saturating_add(Duration::seconds(offset.whole_seconds().into()))
    }
}

/// Offset of `zone` at the wall-clock time `at`. Ambiguous and skipped local
/// times are resolved to standard time, never to the daylight-saving reading.
fn utc_offset_at(zone: Tz, at: PrimitiveDateTime) -> Result<UtcOffset, TimezoneError> {
    let naive = NaiveDate::from_ymd_opt(at.year(), u8::from(at.month()).into(), at.day().into())
        .and_then(|d| d.and_hms_opt(at.hour().into(), at.minute().into(), at.second().into()))
        .ok_or_else(|| TimezoneError::OutOfRange(at.to_string()))?;

    let seconds = match zone.offset_from_local_datetime(&naive) {
        LocalResult::Single(offset) => offset.fix().local_minus_utc(),
        LocalResult::Ambiguous(earlier, later) => {
            let standard = if earlier.dst_offset().num_seconds() == 0 {
                earlier
            } else {
                later
            };
            standard.fix().local_minus_utc()
        }
        LocalResult::None => {
            let offset = zone.offset_from_utc_datetime(&naive);
            i32::try_from(offset.base_utc_offset().num_seconds()).unwrap_or(i32::MAX)
        }
    };

    UtcOffset::from_whole_seconds(seconds).map_err(|_| TimezoneError::InvalidOffset(seconds))
}
