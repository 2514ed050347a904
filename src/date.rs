use crate::error::{Result, SimulationError};
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Years below this value are read as relative year offsets (`0000-10-01`, `0001-07-20`).
pub const RELATIVE_YEAR_LIMIT: i32 = 100;

/// A work-step date, either bound to a concrete calendar year or relative to the year a cultivation
/// method is (re)started in.
///
/// A relative date keeps its offset in the year field: `0000-10-01` is the first of October of the
/// start year, `0001-07-20` is the 20th of July of the following year. Relative dates have no place
/// on the simulation clock until they are resolved with [`Date::to_absolute`] or [`Date::resolve_from`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date {
    date: NaiveDate,
    relative: bool,
}

impl Date {
    /// Wraps a concrete calendar date.
    pub fn absolute(date: NaiveDate) -> Date {
        Date {
            date,
            relative: false,
        }
    }

    /// Creates an absolute date from its parts.
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Result<Date> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Date::absolute)
            .ok_or_else(|| SimulationError::InvalidDate(format!("{year:04}-{month:02}-{day:02}")))
    }

    /// Creates a relative date.
    ///
    /// # Parameters
    ///
    /// - `day`: Day of month.
    /// - `month`: Month of year.
    /// - `year_offset`: Number of years after the year the cultivation method is anchored in.
    ///
    /// # Returns
    ///
    /// The relative date, or `InvalidDate` if the day does not exist (29 February only exists at offset 0).
    pub fn relative(day: u32, month: u32, year_offset: i32) -> Result<Date> {
        if !(0..RELATIVE_YEAR_LIMIT).contains(&year_offset) {
            return Err(SimulationError::InvalidDate(format!(
                "relative year offset {year_offset} out of range"
            )));
        }
        NaiveDate::from_ymd_opt(year_offset, month, day)
            .map(|date| Date {
                date,
                relative: true,
            })
            .ok_or_else(|| {
                SimulationError::InvalidDate(format!("{year_offset:04}-{month:02}-{day:02}"))
            })
    }

    pub fn is_relative(&self) -> bool {
        self.relative
    }

    pub fn month(&self) -> u32 {
        self.date.month()
    }

    pub fn day(&self) -> u32 {
        self.date.day()
    }

    /// Year offset of a relative date, calendar year of an absolute one.
    pub fn year(&self) -> i32 {
        self.date.year()
    }

    /// Day of year. Relative dates count against a non-leap year so that the value does not depend
    /// on the offset they carry.
    pub fn day_of_year(&self) -> u32 {
        if self.relative {
            NaiveDate::from_ymd_opt(2001, self.month(), self.day_in_common_year())
                .map(|d| d.ordinal())
                .unwrap_or(59)
        } else {
            self.date.ordinal()
        }
    }

    fn day_in_common_year(&self) -> u32 {
        if self.month() == 2 && self.day() == 29 {
            28
        } else {
            self.day()
        }
    }

    /// The wrapped calendar date of an absolute date; `None` for relative dates.
    pub fn as_absolute(&self) -> Option<NaiveDate> {
        if self.relative {
            None
        } else {
            Some(self.date)
        }
    }

    /// Binds the date to a concrete year.
    ///
    /// Absolute dates are returned unchanged. A relative date lands in `year + offset`; a 29 February
    /// that lands in a common year becomes the 28th.
    pub fn to_absolute(&self, year: i32) -> NaiveDate {
        if !self.relative {
            return self.date;
        }
        let target_year = year + self.date.year();
        NaiveDate::from_ymd_opt(target_year, self.month(), self.day())
            .or_else(|| NaiveDate::from_ymd_opt(target_year, self.month(), 28))
            .unwrap_or(self.date)
    }

    /// Resolves the date against an anchor date.
    ///
    /// A relative date is anchored in the anchor's year, or in the following year when it would fall
    /// before the anchor (its day has already passed that year). Dates on the anchor day resolve to
    /// the anchor's year.
    ///
    /// # Returns
    ///
    /// `(resolved date, anchor year)`. Later relative dates of the same schedule resolve with
    /// `to_absolute(anchor year)`.
    pub fn resolve_from(&self, anchor: NaiveDate) -> (NaiveDate, i32) {
        if !self.relative {
            return (self.date, self.date.year());
        }
        let mut year = anchor.year();
        let mut resolved = self.to_absolute(year);
        if resolved < anchor {
            year += 1;
            resolved = self.to_absolute(year);
        }
        (resolved, year)
    }

    /// Shifts the date by a number of days, keeping it relative or absolute.
    pub fn add_days(&self, days: i64) -> Date {
        Date {
            date: self
                .date
                .checked_add_signed(Duration::days(days))
                .unwrap_or(self.date),
            relative: self.relative,
        }
    }
}

impl From<NaiveDate> for Date {
    fn from(date: NaiveDate) -> Self {
        Date::absolute(date)
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}",
            self.date.year(),
            self.date.month(),
            self.date.day()
        )
    }
}

impl FromStr for Date {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Date> {
        let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map_err(|e| SimulationError::InvalidDate(format!("{s}: {e}")))?;
        if (0..RELATIVE_YEAR_LIMIT).contains(&date.year()) {
            Date::relative(date.day(), date.month(), date.year())
        } else {
            Ok(Date::absolute(date))
        }
    }
}

impl Serialize for Date {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Date {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Date, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
