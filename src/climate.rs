use crate::error::{Result, SimulationError};
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Weather of one simulated day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClimateData {
    pub tmin: f64, // Minimum air temperature [°C]
    pub tavg: f64, // Mean air temperature [°C]
    pub tmax: f64, // Maximum air temperature [°C]
    pub precip: f64, // Precipitation [mm]
    pub globrad: f64, // Global radiation [MJ m-2 d-1]
    pub wind: f64, // Wind speed [m s-1]
    pub relhumid: Option<f64>, // Relative humidity [%]
}

/// Climate series materialized in memory, indexed by day offset from its start date.
#[derive(Debug, Clone)]
pub struct ClimateSeries {
    start: NaiveDate,
    days: Vec<ClimateData>,
}

impl ClimateSeries {
    /// Creates a validated climate series.
    ///
    /// Validates:
    /// - the series is non-empty
    /// - no NaN in any field
    pub fn new(start: NaiveDate, days: Vec<ClimateData>) -> Result<Self> {
        if days.is_empty() {
            return Err(SimulationError::EmptyClimate);
        }
        for (day, d) in days.iter().enumerate() {
            let fields = [
                ("tmin", d.tmin),
                ("tavg", d.tavg),
                ("tmax", d.tmax),
                ("precip", d.precip),
                ("globrad", d.globrad),
                ("wind", d.wind),
                ("relhumid", d.relhumid.unwrap_or(0.0)),
            ];
            if let Some((field, _)) = fields.iter().find(|(_, v)| v.is_nan()) {
                return Err(SimulationError::InvalidClimate { day, field });
            }
        }
        Ok(Self { start, days })
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start
    }

    /// Date of the last day with data.
    pub fn end_date(&self) -> NaiveDate {
        self.date_for_step(self.days.len() - 1)
    }

    pub fn date_for_step(&self, step: usize) -> NaiveDate {
        self.start + Duration::days(step as i64)
    }

    /// Weather for a day offset, `None` once the series is exhausted.
    pub fn get(&self, step: usize) -> Option<&ClimateData> {
        self.days.get(step)
    }

    /// Number of days that can be simulated.
    pub fn len(&self) -> usize {
        self.days.len()
    }

    /// Returns `true` if there are no days.
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

fn days_in_year(year: i32) -> f64 {
    if NaiveDate::from_ymd_opt(year, 2, 29).is_some() {
        366.0
    } else {
        365.0
    }
}

/// Atmospheric CO2 concentration for a date [ppm].
///
/// Empirical fit of the historical Mauna Loa record plus a seasonal term, used when no fixed
/// concentration is configured.
pub fn co2_for_date(date: NaiveDate) -> f64 {
    let decimal_date = date.year() as f64 + date.ordinal() as f64 / days_in_year(date.year());
    222.0 + (0.0119 * (decimal_date - 1580.0)).exp() + 2.5 * ((decimal_date - 0.5) / 0.1592).sin()
}

/// Groundwater depth for a date [m].
///
/// Follows a sinusoid between `min_depth` and `max_depth` with its shallowest point in
/// `min_depth_month`. A negative result means no groundwater influence and is reported as 20 m.
pub fn groundwater_depth_for_date(
    max_depth: f64,
    min_depth: f64,
    min_depth_month: u32,
    date: NaiveDate,
) -> f64 {
    let days = days_in_year(date.year());
    let mean_depth = (max_depth + min_depth) / 2.0;
    let amplitude = (max_depth - min_depth) / 2.0;

    let angle = (date.ordinal() as f64 / days * 360.0) - 90.0 - ((min_depth_month as f64 * 30.0) - 15.0);
    let depth = mean_depth + angle.to_radians().sin() * amplitude;

    if depth < 0.0 {
        20.0
    } else {
        depth
    }
}
