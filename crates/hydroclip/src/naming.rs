//! Deterministic, human-readable artifact names.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{ClipError, Result};

/// The zone abbreviation keeps names distinct across a DST fall-back hour.
const NAME_FORMAT: &str = "%Y_%m_%d_%H_%M_%S_%Z";

/// Renders clip names as `<station>_YYYY_MM_DD_HH_MM_SS_<zone>` in a fixed zone.
#[derive(Debug, Clone)]
pub struct ClipNamer {
    station_id: String,
    timezone: Tz,
}

impl ClipNamer {
    pub fn new(station_id: impl Into<String>, timezone: Tz) -> Self {
        Self {
            station_id: station_id.into(),
            timezone,
        }
    }

    pub fn station_id(&self) -> &str {
        &self.station_id
    }

    pub fn name_for(&self, time: DateTime<Utc>) -> String {
        let local = time.with_timezone(&self.timezone);
        format!("{}_{}", self.station_id, local.format(NAME_FORMAT))
    }

    pub fn name_for_unix(&self, unix_secs: i64) -> Result<String> {
        Ok(self.name_for(utc_from_unix(unix_secs)?))
    }
}

pub fn utc_from_unix(unix_secs: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(unix_secs, 0)
        .single()
        .ok_or_else(|| ClipError::internal(format!("timestamp {unix_secs} is out of range")))
}

/// ISO-8601 UTC label with a trailing `Z`, second precision.
pub fn clip_label(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_rendered_in_local_zone() {
        let namer = ClipNamer::new("test-hydrophone", chrono_tz::America::Los_Angeles);
        assert_eq!(
            namer.name_for_unix(1_700_000_000).unwrap(),
            "test-hydrophone_2023_11_14_14_13_20_PST"
        );
    }

    #[test]
    fn summer_names_use_daylight_offset() {
        let namer = ClipNamer::new("node", chrono_tz::America::Los_Angeles);
        // 2023-07-01T12:00:00Z is 05:00 PDT
        assert_eq!(
            namer.name_for_unix(1_688_212_800).unwrap(),
            "node_2023_07_01_05_00_00_PDT"
        );
    }

    #[test]
    fn utc_zone_keeps_wall_clock() {
        let namer = ClipNamer::new("node", chrono_tz::UTC);
        assert_eq!(namer.name_for_unix(0).unwrap(), "node_1970_01_01_00_00_00_UTC");
    }

    #[test]
    fn repeated_fall_back_hour_gets_distinct_names() {
        let namer = ClipNamer::new("node", chrono_tz::America::Los_Angeles);
        // 2023-11-05 01:30 local happens twice: 08:30Z (PDT) and 09:30Z (PST)
        let first = namer.name_for_unix(1_699_173_000).unwrap();
        let second = namer.name_for_unix(1_699_176_600).unwrap();
        assert_eq!(first, "node_2023_11_05_01_30_00_PDT");
        assert_eq!(second, "node_2023_11_05_01_30_00_PST");
        assert_ne!(first, second);
    }

    #[test]
    fn label_is_iso_utc() {
        let t = utc_from_unix(1_700_000_000).unwrap();
        assert_eq!(clip_label(t), "2023-11-14T22:13:20Z");
    }
}
