use std::fmt;
use std::str::FromStr;

use snafu::{ResultExt as _, Snafu};
use time::format_description::well_known::Rfc2822;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

/// Feed dates are RFC 2822, which has no room for earlier years
pub const MIN_YEAR: i32 = 1900;

#[derive(Debug, Snafu)]
pub enum DayKeyParseError {
    #[snafu(display("Invalid day `{input}`, expected YYYY-MM-DD"))]
    Format {
        input: String,
        source: time::error::Parse,
    },
    #[snafu(display("Day `{input}` is before the year {MIN_YEAR}"))]
    TooEarly { input: String },
}

/// A calendar day, formatted as `YYYY-MM-DD`.
///
/// Used both as the date a comic was published on and, in
/// [`crate::store::KeyMode::Date`], as the identity key of a publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DayKey(Date);

impl DayKey {
    pub fn today_utc() -> Self {
        Self(OffsetDateTime::now_utc().date())
    }

    pub fn date(self) -> Date {
        self.0
    }

    /// Number of days since the julian epoch, used to seed per-day candidate
    /// ordering.
    pub fn day_number(self) -> u64 {
        u64::try_from(self.0.to_julian_day()).unwrap_or_default()
    }

    /// Midnight UTC of this day in the RFC 2822 form RSS uses for `pubDate`.
    pub fn to_rfc2822(self) -> Result<String, time::error::Format> {
        self.0.midnight().assume_utc().format(&Rfc2822)
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}",
            self.0.year(),
            u8::from(self.0.month()),
            self.0.day()
        )
    }
}

impl FromStr for DayKey {
    type Err = DayKeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let date = Date::parse(s.trim(), format_description!("[year]-[month]-[day]"))
            .context(FormatSnafu { input: s })?;
        snafu::ensure!(date.year() >= MIN_YEAR, TooEarlySnafu { input: s });
        Ok(Self(date))
    }
}

impl serde::Serialize for DayKey {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        s.collect_str(self)
    }
}

impl<'de> serde::de::Deserialize<'de> for DayKey {
    fn deserialize<D>(d: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let str = <String>::deserialize(d)?;
        str.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays_iso_day() {
        let day: DayKey = "2024-01-02".parse().unwrap();
        assert_eq!(day.to_string(), "2024-01-02");
        assert_eq!(day.date().day(), 2);
    }

    #[test]
    fn rejects_garbage() {
        assert!("yesterday".parse::<DayKey>().is_err());
        assert!("2024-13-01".parse::<DayKey>().is_err());
    }

    #[test]
    fn ordering_follows_calendar() {
        let a: DayKey = "2023-12-31".parse().unwrap();
        let b: DayKey = "2024-01-01".parse().unwrap();
        assert!(a < b);
        assert_eq!(a.day_number() + 1, b.day_number());
    }

    #[test]
    fn rfc2822_is_midnight_utc() {
        let day: DayKey = "2024-01-02".parse().unwrap();
        assert_eq!(day.to_rfc2822().unwrap(), "Tue, 02 Jan 2024 00:00:00 +0000");
    }

    #[test]
    fn rejects_days_feeds_cannot_date() {
        assert!(matches!(
            "1899-12-31".parse::<DayKey>(),
            Err(DayKeyParseError::TooEarly { .. })
        ));
        assert!(serde_json::from_str::<DayKey>("\"0042-01-01\"").is_err());
        let first: DayKey = "1900-01-01".parse().unwrap();
        assert_eq!(first.to_rfc2822().unwrap(), "Mon, 01 Jan 1900 00:00:00 +0000");
    }

    #[test]
    fn serde_uses_string_form() {
        let day: DayKey = "2024-01-02".parse().unwrap();
        let json = serde_json::to_string(&day).unwrap();
        assert_eq!(json, "\"2024-01-02\"");
        let back: DayKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, day);
    }
}
