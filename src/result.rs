use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

/// Identifiers of every value a run reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ResultId {
    // Per cultivation method lifecycle
    PrimaryYield,
    SecondaryYield,
    PrimaryYieldFresh,
    SecondaryYieldFresh,
    SumFertiliser,
    SumIrrigation,
    PrimaryYieldN,
    AbovegroundBiomassN,
    DaysWithCrop,
    TotalNUptake,
    CropHeight,
    SumEtaPerCrop,
    WaterStress,
    NStress,
    HeatStress,
    OxygenStress,

    // General, monthly
    Avg10cmMonthlyCorg,
    Avg30cmMonthlyCorg,
    Mean90cmMonthlyWaterContent,
    MonthlyGroundwaterRecharge,
    MonthlyNLeaching,
    MonthlySurfaceRunoff,
    MonthlyPrecip,
    MonthlyEta,

    // General, yearly
    YearlyGroundwaterRecharge,
    YearlyNLeaching,

    // General, 31 March snapshots
    Sum90cmNminMarch,
    Sum90cmNo3March,
    Avg30cmSoilTemperatureMarch,
    NLeachingMarch,

    // General, daily
    DevelopmentStage,
}

/// Result of one finished cultivation method lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PvResult {
    pub cultivation_method: String,
    pub crop_name: Option<String>,
    pub values: BTreeMap<ResultId, f64>,
}

impl PvResult {
    pub fn new(cultivation_method: &str, crop_name: Option<String>) -> PvResult {
        PvResult {
            cultivation_method: cultivation_method.to_string(),
            crop_name,
            values: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, id: ResultId, value: f64) {
        self.values.insert(id, value);
    }

    pub fn get(&self, id: ResultId) -> Option<f64> {
        self.values.get(&id).copied()
    }
}

/// The soil and water state of one simulated day that enters the general results.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DailySample {
    pub corg_10cm: f64, // [kg C kg-1]
    pub corg_30cm: f64, // [kg C kg-1]
    pub water_content_90cm: f64, // [m3 m-3]
    pub recharge: f64, // [mm]
    pub n_leaching: f64, // [kg N ha-1]
    pub runoff: f64, // [mm]
    pub precip: f64, // [mm]
    pub eta: f64, // [mm]
    pub nmin_90cm: f64, // [kg N ha-1]
    pub no3_90cm: f64, // [kg N ha-1]
    pub soil_temperature_30cm: f64, // [°C]
    pub development_stage: usize,
}

#[derive(Debug, Clone, Default)]
struct MonthlySums {
    days: u32,
    corg_10cm: f64,
    corg_30cm: f64,
    water_content_90cm: f64,
    recharge: f64,
    n_leaching: f64,
    runoff: f64,
    precip: f64,
    eta: f64,
}

#[derive(Debug, Clone, Default)]
struct YearlySums {
    recharge: f64,
    n_leaching: f64,
}

/// Aggregates daily samples into monthly and yearly general results.
///
/// A month is flushed when the first sample of another month arrives or on [`ResultAccumulator::finish`];
/// years likewise. Monthly values are stored on the first day of their month, yearly values on
/// 1 January.
#[derive(Debug, Clone, Default)]
pub struct ResultAccumulator {
    month_start: Option<NaiveDate>,
    year_start: Option<NaiveDate>,
    monthly: MonthlySums,
    yearly: YearlySums,
    general: BTreeMap<ResultId, Vec<(NaiveDate, f64)>>,
}

impl ResultAccumulator {
    pub fn new() -> ResultAccumulator {
        ResultAccumulator::default()
    }

    /// Adds the sample of `date`. Samples must arrive in date order, one per day.
    pub fn add(&mut self, date: NaiveDate, sample: &DailySample) {
        let month_start = date - Duration::days(date.day0() as i64);
        let year_start = date - Duration::days(date.ordinal0() as i64);

        if self.month_start.is_some_and(|m| m != month_start) {
            self.flush_month();
        }
        if self.year_start.is_some_and(|y| y != year_start) {
            self.flush_year();
        }
        self.month_start = Some(month_start);
        self.year_start = Some(year_start);

        let m = &mut self.monthly;
        m.days += 1;
        m.corg_10cm += sample.corg_10cm;
        m.corg_30cm += sample.corg_30cm;
        m.water_content_90cm += sample.water_content_90cm;
        m.recharge += sample.recharge;
        m.n_leaching += sample.n_leaching;
        m.runoff += sample.runoff;
        m.precip += sample.precip;
        m.eta += sample.eta;

        self.yearly.recharge += sample.recharge;
        self.yearly.n_leaching += sample.n_leaching;

        if date.month() == 3 && date.day() == 31 {
            self.push(ResultId::Sum90cmNminMarch, date, sample.nmin_90cm);
            self.push(ResultId::Sum90cmNo3March, date, sample.no3_90cm);
            self.push(ResultId::Avg30cmSoilTemperatureMarch, date, sample.soil_temperature_30cm);
            self.push(ResultId::NLeachingMarch, date, self.yearly.n_leaching);
        }
        self.push(ResultId::DevelopmentStage, date, sample.development_stage as f64);
    }

    /// Flushes the open month and year and returns every general series.
    pub fn finish(mut self) -> BTreeMap<ResultId, Vec<(NaiveDate, f64)>> {
        self.flush_month();
        self.flush_year();
        self.general
    }

    /// General series collected so far, without the open month and year.
    pub fn general(&self) -> &BTreeMap<ResultId, Vec<(NaiveDate, f64)>> {
        &self.general
    }

    fn push(&mut self, id: ResultId, date: NaiveDate, value: f64) {
        self.general.entry(id).or_default().push((date, value));
    }

    fn flush_month(&mut self) {
        let Some(date) = self.month_start.take() else {
            return;
        };
        let m = std::mem::take(&mut self.monthly);
        if m.days == 0 {
            return;
        }
        let days = m.days as f64;
        self.push(ResultId::Avg10cmMonthlyCorg, date, m.corg_10cm / days);
        self.push(ResultId::Avg30cmMonthlyCorg, date, m.corg_30cm / days);
        self.push(ResultId::Mean90cmMonthlyWaterContent, date, m.water_content_90cm / days);
        self.push(ResultId::MonthlyGroundwaterRecharge, date, m.recharge);
        self.push(ResultId::MonthlyNLeaching, date, m.n_leaching);
        self.push(ResultId::MonthlySurfaceRunoff, date, m.runoff);
        self.push(ResultId::MonthlyPrecip, date, m.precip);
        self.push(ResultId::MonthlyEta, date, m.eta);
    }

    fn flush_year(&mut self) {
        let Some(date) = self.year_start.take() else {
            return;
        };
        let y = std::mem::take(&mut self.yearly);
        self.push(ResultId::YearlyGroundwaterRecharge, date, y.recharge);
        self.push(ResultId::YearlyNLeaching, date, y.n_leaching);
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationResult {
    pub pv_results: Vec<PvResult>,
    pub general: BTreeMap<ResultId, Vec<(NaiveDate, f64)>>,
    pub cancelled: bool,
    pub simulated_days: usize,
}

impl SimulationResult {
    /// A general series, empty if the run never produced it.
    pub fn series(&self, id: ResultId) -> &[(NaiveDate, f64)] {
        self.general.get(&id).map(|s| s.as_slice()).unwrap_or(&[])
    }
}

/// State of one simulated day, streamed to observers while the run continues.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub crop: Option<String>,
    pub development_stage: usize,
    pub n_leaching: f64, // [kg N ha-1]
    pub recharge: f64, // [mm]
    pub eta: f64, // [mm]
    pub precip: f64, // [mm]
    pub no3: Vec<f64>, // Per layer [kg N m-3]
    pub moisture: Vec<f64>, // Per layer [m3 m-3]
}

/// Receives a [`DailyRecord`] after every simulated day.
pub trait DailyObserver {
    fn on_day(&mut self, record: &DailyRecord);
}

impl<F: FnMut(&DailyRecord)> DailyObserver for F {
    fn on_day(&mut self, record: &DailyRecord) {
        self(record)
    }
}
