use crate::crop::{CropArena, CropHandle};
use crate::date::Date;
use crate::error::{Result, SimulationError};
use crate::model::SimulationModel;
use crate::result::{PvResult, ResultId};
use crate::workstep::{FollowerStep, WorkStep, WorkStepKind};
use chrono::{Datelike, NaiveDate};
use log::{debug, warn};

/// The scheduled lifecycle of one crop (or of a fallow period): its work steps ordered by date.
///
/// Several steps may share a date; they run in the order they were added. Relative dates are bound to
/// a year each time the method is anchored, see [`CultivationMethod::anchor`].
#[derive(Debug, Clone)]
pub struct CultivationMethod {
    name: String,
    crop: Option<CropHandle>,
    work_steps: Vec<WorkStep>,
    anchor_year: Option<i32>,
    result: Option<PvResult>,
}

impl CultivationMethod {
    /// Creates a cultivation method for a crop.
    ///
    /// Seed, harvest and cutting steps are added from the crop's dates. A crop without harvest date
    /// that is harvested automatically gets a harvest step on its latest harvest day, so the lifecycle
    /// lasts until the crop left the field.
    ///
    /// # Parameters
    ///
    /// - `name`: Name used in logs and results.
    /// - `crop`: The crop grown, `None` for a fallow method.
    /// - `crops`: The arena owning `crop`.
    ///
    /// # Errors
    ///
    /// [`SimulationError::MissingHarvest`] for a crop with neither a harvest date nor an automatic
    /// harvest.
    pub fn new(name: &str, crop: Option<CropHandle>, crops: &CropArena) -> Result<CultivationMethod> {
        let mut method = CultivationMethod::fallow(name);
        let Some(handle) = crop else {
            return Ok(method);
        };
        method.crop = Some(handle);

        let c = crops.get(handle);
        let harvest = match (c.harvest_date(), c.params().automatic_harvest) {
            (Some(date), _) => Some(date),
            (None, Some(auto)) => latest_harvest_date(c.seed_date(), auto.latest_harvest_doy),
            (None, None) => None,
        };
        let Some(harvest) = harvest else {
            return Err(SimulationError::MissingHarvest {
                name: name.to_string(),
            });
        };
        method.add_application(WorkStep::new(c.seed_date(), WorkStepKind::Seed { crop: handle }));
        method.add_application(WorkStep::new(harvest, WorkStepKind::Harvest { crop: handle }));
        for cutting in c.cutting_dates() {
            method.add_application(WorkStep::new(*cutting, WorkStepKind::Cutting { crop: handle }));
        }
        Ok(method)
    }

    /// A method without crop. Its work steps are added with [`CultivationMethod::add_application`].
    pub fn fallow(name: &str) -> CultivationMethod {
        CultivationMethod {
            name: name.to_string(),
            crop: None,
            work_steps: Vec::new(),
            anchor_year: None,
            result: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn crop(&self) -> Option<CropHandle> {
        self.crop
    }

    pub fn is_fallow(&self) -> bool {
        self.crop.is_none()
    }

    pub fn work_steps(&self) -> &[WorkStep] {
        &self.work_steps
    }

    /// Result of the finished lifecycle, `None` while running.
    pub fn result(&self) -> Option<&PvResult> {
        self.result.as_ref()
    }

    /// Adds a work step behind all steps with the same or an earlier date.
    pub fn add_application(&mut self, step: WorkStep) {
        let position = self.work_steps.partition_point(|s| s.date() <= step.date());
        self.work_steps.insert(position, step);
    }

    /// First scheduled date, `None` without work steps.
    pub fn start_date(&self) -> Option<Date> {
        self.work_steps.first().map(|s| s.date())
    }

    /// Last scheduled date, `None` without work steps.
    pub fn end_date(&self) -> Option<Date> {
        self.work_steps.last().map(|s| s.date())
    }

    /// Smallest scheduled date strictly after `date`, `None` past the last one.
    pub fn next_date(&self, date: Date) -> Option<Date> {
        self.work_steps
            .iter()
            .map(|s| s.date())
            .find(|d| *d > date)
    }

    /// Binds the method's dates to a year for the lifecycle starting at `at`.
    ///
    /// Relative start dates that already passed in `at`'s year go to the following year, later steps
    /// keep their year offset from the start. The result of an earlier lifecycle is cleared.
    ///
    /// # Returns
    ///
    /// The first date due on or after `at`, `None` when every date has passed.
    pub fn anchor(&mut self, at: NaiveDate) -> Option<NaiveDate> {
        self.result = None;
        let start = self.start_date()?;
        let (_, year) = start.resolve_from(at);
        self.anchor_year = Some(year);

        let skipped = self
            .work_steps
            .iter()
            .filter(|s| self.absolute_date(s.date()) < at)
            .count();
        if skipped > 0 {
            warn!(
                "{}: {} work step(s) dated before {} are skipped",
                self.name, skipped, at
            );
        }
        self.work_steps
            .iter()
            .map(|s| self.absolute_date(s.date()))
            .find(|d| *d >= at)
    }

    /// Calendar date of a work-step date in the current lifecycle.
    pub fn absolute_date(&self, date: Date) -> NaiveDate {
        date.to_absolute(self.anchor_year.unwrap_or(0))
    }

    /// First calendar date strictly after `today` with a work step, `None` past the last one.
    pub fn next_absolute_date(&self, today: NaiveDate) -> Option<NaiveDate> {
        self.work_steps
            .iter()
            .map(|s| self.absolute_date(s.date()))
            .find(|d| *d > today)
    }

    /// Applies every work step due on `today`, in insertion order.
    ///
    /// Steps scheduled by the applied steps are added once all of today's steps ran.
    pub fn apply(&mut self, today: NaiveDate, model: &mut SimulationModel) {
        let mut followers = Vec::new();
        for step in &self.work_steps {
            if self.absolute_date(step.date()) == today {
                step.apply(today, model, &mut followers);
            }
        }
        for FollowerStep { date, kind } in followers {
            let key = self.key_for(date);
            debug!("{}: scheduled follow-up on {}", self.name, key);
            self.add_application(WorkStep::new(key, kind));
        }
    }

    // Work-step date that resolves to `date` in the current lifecycle
    fn key_for(&self, date: NaiveDate) -> Date {
        match (self.start_date(), self.anchor_year) {
            (Some(start), Some(year)) if start.is_relative() => {
                Date::relative(date.day(), date.month(), date.year() - year).unwrap_or(Date::absolute(date))
            }
            _ => Date::absolute(date),
        }
    }

    /// Moves the work step at `index` to `date`, keeping the crop's seed and harvest dates in sync.
    ///
    /// # Returns
    ///
    /// `false` if there is no work step at `index`.
    pub fn set_work_step_date(&mut self, index: usize, date: Date, crops: &mut CropArena) -> bool {
        if index >= self.work_steps.len() {
            return false;
        }
        let mut step = self.work_steps.remove(index);
        step.set_date(date);
        match step.kind() {
            WorkStepKind::Seed { crop } => crops.get_mut(*crop).set_seed_date(date),
            WorkStepKind::Harvest { crop } => crops.get_mut(*crop).set_harvest_date(Some(date)),
            _ => {}
        }
        self.add_application(step);
        true
    }

    /// A copy with its own crop instance, a fresh result and no work steps.
    pub fn deep_clone_and_clear_worksteps(&self, crops: &mut CropArena) -> CultivationMethod {
        let crop = self.crop.map(|handle| {
            let mut copy = crops.get(handle).clone();
            copy.reset();
            crops.add(copy)
        });
        CultivationMethod {
            name: self.name.clone(),
            crop,
            work_steps: Vec::new(),
            anchor_year: None,
            result: None,
        }
    }

    /// A copy whose absolute dates are moved by `years`. Relative dates are kept.
    ///
    /// Used to repeat a rotation given in calendar years over earlier or later years.
    pub fn with_years_shifted(&self, years: i32, crops: &mut CropArena) -> CultivationMethod {
        let mut shifted = self.deep_clone_and_clear_worksteps(crops);
        for step in &self.work_steps {
            let date = match step.date().as_absolute() {
                Some(d) => {
                    let target = d.year() + years;
                    NaiveDate::from_ymd_opt(target, d.month(), d.day())
                        .or_else(|| NaiveDate::from_ymd_opt(target, d.month(), 28))
                        .map(Date::absolute)
                        .unwrap_or(step.date())
                }
                None => step.date(),
            };
            let kind = match (step.kind(), shifted.crop) {
                (WorkStepKind::Seed { .. }, Some(c)) => WorkStepKind::Seed { crop: c },
                (WorkStepKind::Harvest { .. }, Some(c)) => WorkStepKind::Harvest { crop: c },
                (WorkStepKind::Cutting { .. }, Some(c)) => WorkStepKind::Cutting { crop: c },
                (other, _) => other.clone(),
            };
            match &kind {
                WorkStepKind::Seed { crop } => crops.get_mut(*crop).set_seed_date(date),
                WorkStepKind::Harvest { crop } => crops.get_mut(*crop).set_harvest_date(Some(date)),
                _ => {}
            }
            shifted.add_application(WorkStep::new(date, kind));
        }
        shifted
    }

    /// Closes the lifecycle: collects the crop's accumulators and the fertiliser applied since the last
    /// lifecycle, then resets the crop for the next one.
    pub fn finalize(&mut self, model: &mut SimulationModel) -> PvResult {
        let mut result = PvResult::new(&self.name, None);
        result.set(ResultId::SumFertiliser, model.sum_fertiliser());
        model.reset_fertiliser_counter();

        if let Some(handle) = self.crop {
            let crop = model.crops_mut().get_mut(handle);
            result.crop_name = Some(crop.name().to_string());
            let a = crop.accumulators();
            result.set(ResultId::PrimaryYield, a.primary_yield);
            result.set(ResultId::SecondaryYield, a.secondary_yield);
            result.set(ResultId::PrimaryYieldFresh, a.primary_yield_fresh);
            result.set(ResultId::SecondaryYieldFresh, a.secondary_yield_fresh);
            result.set(ResultId::PrimaryYieldN, a.primary_yield_n);
            result.set(ResultId::AbovegroundBiomassN, a.aboveground_biomass_n);
            result.set(ResultId::TotalNUptake, a.total_n_uptake);
            result.set(ResultId::CropHeight, a.crop_height);
            result.set(ResultId::SumEtaPerCrop, a.evapotranspiration);
            result.set(ResultId::SumIrrigation, a.irrigation);
            result.set(ResultId::DaysWithCrop, a.days_with_crop as f64);
            result.set(ResultId::WaterStress, a.water_stress);
            result.set(ResultId::NStress, a.n_stress);
            result.set(ResultId::HeatStress, a.heat_stress);
            result.set(ResultId::OxygenStress, a.oxygen_stress);
            crop.reset();
        }

        self.result = Some(result.clone());
        result
    }
}

// Day `doy` after the sowing day, in the sowing year or the next. Relative dates count `doy` in a
// common year.
fn latest_harvest_date(seed: Date, doy: u32) -> Option<Date> {
    let offset = if doy <= seed.day_of_year() { 1 } else { 0 };
    if seed.is_relative() {
        let day = NaiveDate::from_yo_opt(2001, doy.min(365))?;
        Date::relative(day.day(), day.month(), seed.year() + offset).ok()
    } else {
        let year = seed.year() + offset;
        NaiveDate::from_yo_opt(year, doy)
            .or_else(|| NaiveDate::from_yo_opt(year, 365))
            .map(Date::absolute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crop::tests::maize_params;
    use crate::crop::Crop;
    use crate::params::{AutomaticHarvestParameters, IrrigationParameters};

    fn rel(day: u32, month: u32, offset: i32) -> Date {
        Date::relative(day, month, offset).unwrap()
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tillage(date: Date, depth: f64) -> WorkStep {
        WorkStep::new(date, WorkStepKind::TillageApplication { depth })
    }

    fn maize_method(crops: &mut CropArena) -> CultivationMethod {
        let crop = Crop::new(maize_params(), rel(20, 4, 0), Some(rel(10, 10, 0)))
            .with_cutting_dates(vec![rel(1, 8, 0)]);
        let handle = crops.add(crop);
        CultivationMethod::new("maize", Some(handle), crops).unwrap()
    }

    #[test]
    // Should turn the crop's dates into seed, cutting and harvest steps in date order
    fn test_new_adds_crop_steps() {
        let mut crops = CropArena::new();
        let method = maize_method(&mut crops);
        let names: Vec<&str> = method.work_steps().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["Seed", "Cutting", "Harvest"]);
        assert_eq!(method.start_date(), Some(rel(20, 4, 0)));
        assert_eq!(method.end_date(), Some(rel(10, 10, 0)));
        assert!(!method.is_fallow());
    }

    #[test]
    // Should schedule the harvest on the latest harvest day, in the next year when it precedes sowing
    fn test_automatic_harvest_crop_gets_latest_harvest_step() {
        let mut crops = CropArena::new();
        let maize = crops.add(Crop::new(maize_params(), rel(20, 4, 0), None));
        let method = CultivationMethod::new("maize", Some(maize), &crops).unwrap();
        let names: Vec<&str> = method.work_steps().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["Seed", "Harvest"]);
        assert_eq!(method.end_date(), Some(rel(17, 10, 0)));

        let mut winter = maize_params();
        winter.automatic_harvest = Some(AutomaticHarvestParameters {
            latest_harvest_doy: 200,
        });
        let wheat = crops.add(Crop::new(winter, rel(10, 10, 0), None));
        let method = CultivationMethod::new("wheat", Some(wheat), &crops).unwrap();
        assert_eq!(method.end_date(), Some(rel(19, 7, 1)));

        let absolute = crops.add(Crop::new(maize_params(), Date::absolute(ymd(2004, 4, 20)), None));
        let method = CultivationMethod::new("maize 2004", Some(absolute), &crops).unwrap();
        assert_eq!(method.end_date(), Some(Date::absolute(ymd(2004, 10, 16))));
    }

    #[test]
    fn test_crop_without_any_harvest_is_rejected() {
        let mut crops = CropArena::new();
        let mut params = maize_params();
        params.automatic_harvest = None;
        let handle = crops.add(Crop::new(params, rel(20, 4, 0), None));
        let err = CultivationMethod::new("grass", Some(handle), &crops).unwrap_err();
        assert!(matches!(err, SimulationError::MissingHarvest { name } if name == "grass"));
    }

    #[test]
    // Should keep insertion order for steps on the same date and sort the rest
    fn test_add_application_orders_by_date_then_insertion() {
        let mut method = CultivationMethod::fallow("fallow");
        method.add_application(tillage(rel(1, 9, 0), 0.3));
        method.add_application(tillage(rel(1, 4, 0), 0.1));
        method.add_application(tillage(rel(1, 9, 0), 0.2));
        method.add_application(tillage(rel(1, 4, 0), 0.15));

        let depths: Vec<f64> = method
            .work_steps()
            .iter()
            .map(|s| match s.kind() {
                WorkStepKind::TillageApplication { depth } => *depth,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(depths, vec![0.1, 0.15, 0.3, 0.2]);
        assert!(method.is_fallow());
    }

    #[test]
    // Should return increasing dates and stop exactly once, at the last date
    fn test_next_date_sequence() {
        let mut method = CultivationMethod::fallow("fallow");
        for d in [rel(1, 3, 0), rel(1, 5, 0), rel(1, 5, 0), rel(1, 2, 1)] {
            method.add_application(tillage(d, 0.1));
        }
        let mut current = method.start_date().unwrap();
        let mut seen = vec![current];
        while let Some(next) = method.next_date(current) {
            assert!(next > current);
            seen.push(next);
            current = next;
        }
        assert_eq!(seen, vec![rel(1, 3, 0), rel(1, 5, 0), rel(1, 2, 1)]);
        assert_eq!(current, method.end_date().unwrap());
        assert_eq!(method.next_date(current), None);
    }

    #[test]
    fn test_empty_method_has_no_dates() {
        let method = CultivationMethod::fallow("empty");
        assert_eq!(method.start_date(), None);
        assert_eq!(method.end_date(), None);
        assert_eq!(method.next_date(rel(1, 1, 0)), None);
    }

    #[test]
    // Anchoring is recomputed for every lifecycle
    fn test_anchor_resolves_relative_dates() {
        let mut method = CultivationMethod::fallow("winter wheat");
        method.add_application(tillage(rel(1, 10, 0), 0.2));
        method.add_application(tillage(rel(20, 7, 1), 0.1));

        assert_eq!(method.anchor(ymd(2001, 1, 1)), Some(ymd(2001, 10, 1)));
        assert_eq!(method.next_absolute_date(ymd(2001, 10, 1)), Some(ymd(2002, 7, 20)));
        assert_eq!(method.next_absolute_date(ymd(2002, 7, 20)), None);

        // restarting after the start day has passed rolls into the next year
        assert_eq!(method.anchor(ymd(2002, 10, 2)), Some(ymd(2003, 10, 1)));
        assert_eq!(method.next_absolute_date(ymd(2003, 10, 1)), Some(ymd(2004, 7, 20)));
    }

    #[test]
    // A start key with an offset starts that many years after the anchor year
    fn test_anchor_with_offset_start() {
        let mut method = CultivationMethod::fallow("late start");
        method.add_application(tillage(rel(1, 3, 1), 0.2));
        method.add_application(tillage(rel(1, 9, 1), 0.2));
        assert_eq!(method.anchor(ymd(2010, 1, 1)), Some(ymd(2011, 3, 1)));
        assert_eq!(method.next_absolute_date(ymd(2011, 3, 1)), Some(ymd(2011, 9, 1)));
    }

    #[test]
    fn test_anchor_skips_passed_absolute_dates() {
        let mut method = CultivationMethod::fallow("calendar");
        method.add_application(tillage(Date::absolute(ymd(2000, 3, 1)), 0.2));
        method.add_application(tillage(Date::absolute(ymd(2000, 9, 1)), 0.2));
        assert_eq!(method.anchor(ymd(2000, 5, 1)), Some(ymd(2000, 9, 1)));
        assert_eq!(method.anchor(ymd(2001, 1, 1)), None);
    }

    #[test]
    // Should keep the crop's seed date in sync and re-sort the steps
    fn test_set_work_step_date_syncs_crop() {
        let mut crops = CropArena::new();
        let mut method = maize_method(&mut crops);
        let handle = method.crop().unwrap();

        assert!(method.set_work_step_date(0, rel(15, 8, 0), &mut crops));
        assert_eq!(crops.get(handle).seed_date(), rel(15, 8, 0));
        let names: Vec<&str> = method.work_steps().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["Cutting", "Seed", "Harvest"]);

        assert!(method.set_work_step_date(2, rel(20, 10, 0), &mut crops));
        assert_eq!(crops.get(handle).harvest_date(), Some(rel(20, 10, 0)));
        assert!(!method.set_work_step_date(7, rel(1, 1, 0), &mut crops));
    }

    #[test]
    // The clone gets its own, reset crop and no work steps
    fn test_deep_clone_and_clear_worksteps() {
        let mut crops = CropArena::new();
        let method = maize_method(&mut crops);
        let original = method.crop().unwrap();
        crops.get_mut(original).accumulators_mut().primary_yield = 5000.0;

        let clone = method.deep_clone_and_clear_worksteps(&mut crops);
        let copy = clone.crop().unwrap();
        assert_ne!(copy, original);
        assert_eq!(crops.get(copy).name(), "maize");
        assert_eq!(crops.get(copy).accumulators().primary_yield, 0.0);
        assert_eq!(crops.get(original).accumulators().primary_yield, 5000.0);
        assert!(clone.work_steps().is_empty());
        assert!(clone.result().is_none());
        assert_eq!(clone.name(), "maize");
    }

    #[test]
    fn test_with_years_shifted() {
        let mut crops = CropArena::new();
        let crop = Crop::new(
            maize_params(),
            Date::absolute(ymd(2005, 4, 20)),
            Some(Date::absolute(ymd(2005, 10, 1))),
        );
        let handle = crops.add(crop);
        let mut method = CultivationMethod::new("maize 2005", Some(handle), &crops).unwrap();
        method.add_application(WorkStep::new(
            Date::absolute(ymd(2005, 6, 1)),
            WorkStepKind::IrrigationApplication {
                amount: 20.0,
                params: IrrigationParameters::default(),
            },
        ));

        let shifted = method.with_years_shifted(-3, &mut crops);
        assert_eq!(shifted.start_date(), Some(Date::absolute(ymd(2002, 4, 20))));
        assert_eq!(shifted.end_date(), Some(Date::absolute(ymd(2002, 10, 1))));
        assert_eq!(shifted.work_steps().len(), 3);
        let copy = shifted.crop().unwrap();
        assert_ne!(copy, handle);
        assert_eq!(crops.get(copy).seed_date(), Date::absolute(ymd(2002, 4, 20)));
        assert_eq!(crops.get(handle).seed_date(), Date::absolute(ymd(2005, 4, 20)));
    }
}
