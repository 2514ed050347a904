use crate::cultivation_method::CultivationMethod;
use crate::error::{Result, SimulationError};
use crate::model::SimulationModel;
use crate::result::PvResult;
use chrono::{Duration, NaiveDate};
use log::{info, warn};

/// An ordered sequence of cultivation methods, cycled through for the whole run.
///
/// One method is active at a time. When its last work step has been applied the method is finalized
/// and the next one starts, wrapping to the first after the last. Every lifecycle runs on a fresh
/// copy of the method, so work steps added during one cycle do not carry over.
#[derive(Debug, Clone)]
pub struct CropRotation {
    templates: Vec<CultivationMethod>,
    active: CultivationMethod,
    index: usize,
    next_date: Option<NaiveDate>,
    exhausted: bool,
}

impl CropRotation {
    /// Creates a rotation.
    ///
    /// # Errors
    ///
    /// [`SimulationError::EmptyRotation`] without methods, [`SimulationError::InvalidStartDate`] for a
    /// method without work steps.
    pub fn new(methods: Vec<CultivationMethod>) -> Result<CropRotation> {
        let Some(first) = methods.first() else {
            return Err(SimulationError::EmptyRotation);
        };
        if let Some(method) = methods.iter().find(|m| m.start_date().is_none()) {
            return Err(SimulationError::InvalidStartDate {
                name: method.name().to_string(),
            });
        }
        Ok(CropRotation {
            active: first.clone(),
            templates: methods,
            index: 0,
            next_date: None,
            exhausted: false,
        })
    }

    /// Starts the first method on `run_start`.
    pub fn start(&mut self, run_start: NaiveDate) {
        self.index = 0;
        self.exhausted = false;
        self.activate(run_start);
    }

    // Anchors the method at `index` on `at`. Methods without dates left are skipped; if none has any,
    // the rotation is exhausted.
    fn activate(&mut self, at: NaiveDate) {
        for _ in 0..self.templates.len() {
            self.active = self.templates[self.index].clone();
            self.next_date = self.active.anchor(at);
            if let Some(date) = self.next_date {
                info!("{}: starting {} on {}", at, self.active.name(), date);
                return;
            }
            warn!("{}: {} has no dates left, skipped", at, self.active.name());
            self.index = (self.index + 1) % self.templates.len();
        }
        warn!("{}: no cultivation method has dates left, rotation stops", at);
        self.exhausted = true;
    }

    /// Applies the active method's work steps due on `today`.
    pub fn apply_due(&mut self, today: NaiveDate, model: &mut SimulationModel) {
        if self.next_date != Some(today) {
            return;
        }
        self.active.apply(today, model);
        self.next_date = self.active.next_absolute_date(today);
    }

    /// The active method applied its last work step.
    pub fn is_finished(&self) -> bool {
        !self.exhausted && self.next_date.is_none()
    }

    /// No method can be scheduled any more; the rest of the run is bare soil.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Finalizes the active method and starts the next one on the following day.
    pub fn finalize_and_advance(&mut self, today: NaiveDate, model: &mut SimulationModel) -> PvResult {
        let result = self.active.finalize(model);
        info!("{}: finished {}", today, self.active.name());
        self.index = (self.index + 1) % self.templates.len();
        self.activate(today + Duration::days(1));
        result
    }

    pub fn active(&self) -> &CultivationMethod {
        &self.active
    }

    pub fn active_index(&self) -> usize {
        self.index
    }

    /// Date of the active method's next work step.
    pub fn next_date(&self) -> Option<NaiveDate> {
        self.next_date
    }

    pub fn methods(&self) -> &[CultivationMethod] {
        &self.templates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crop::CropArena;
    use crate::date::Date;
    use crate::model::tests::test_model;
    use crate::params::MineralFertiliserParameters;
    use crate::workstep::{TopDressing, WorkStep, WorkStepKind};

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tillage_method(name: &str, dates: &[Date]) -> CultivationMethod {
        let mut method = CultivationMethod::fallow(name);
        for d in dates {
            method.add_application(WorkStep::new(*d, WorkStepKind::TillageApplication { depth: 0.2 }));
        }
        method
    }

    fn rel(day: u32, month: u32, offset: i32) -> Date {
        Date::relative(day, month, offset).unwrap()
    }

    // Runs the rotation alone over a date range, returning the finalize days
    fn drive(rotation: &mut CropRotation, from: NaiveDate, to: NaiveDate) -> Vec<(NaiveDate, String)> {
        let mut model = test_model(CropArena::new());
        let mut finished = Vec::new();
        rotation.start(from);
        let mut today = from;
        while today <= to {
            model.set_current_date(today);
            model.reset_daily_counter();
            rotation.apply_due(today, &mut model);
            if rotation.is_finished() {
                let result = rotation.finalize_and_advance(today, &mut model);
                finished.push((today, result.cultivation_method));
            }
            today += Duration::days(1);
        }
        finished
    }

    #[test]
    fn test_empty_rotation_is_rejected() {
        assert!(matches!(CropRotation::new(vec![]), Err(SimulationError::EmptyRotation)));
    }

    #[test]
    fn test_method_without_dates_is_rejected() {
        let err = CropRotation::new(vec![CultivationMethod::fallow("nothing")]).unwrap_err();
        assert!(matches!(err, SimulationError::InvalidStartDate { name } if name == "nothing"));
    }

    #[test]
    // Should finalize each method once per cycle and wrap to the first one
    fn test_rotation_cycles_and_wraps() {
        let a = tillage_method("a", &[rel(1, 4, 0), rel(1, 9, 0)]);
        let b = tillage_method("b", &[rel(1, 3, 0), rel(1, 8, 0)]);
        let mut rotation = CropRotation::new(vec![a, b]).unwrap();
        let finished = drive(&mut rotation, ymd(2001, 1, 1), ymd(2004, 12, 31));

        let expected = vec![
            (ymd(2001, 9, 1), "a".to_string()),
            (ymd(2002, 8, 1), "b".to_string()),
            (ymd(2003, 9, 1), "a".to_string()),
            (ymd(2004, 8, 1), "b".to_string()),
        ];
        assert_eq!(finished, expected);
    }

    #[test]
    // A winter crop started in autumn ends in the following year
    fn test_cross_year_method() {
        let winter = tillage_method("winter wheat", &[rel(10, 10, 0), rel(20, 7, 1)]);
        let mut rotation = CropRotation::new(vec![winter]).unwrap();
        let finished = drive(&mut rotation, ymd(2001, 1, 1), ymd(2003, 12, 31));
        let days: Vec<NaiveDate> = finished.iter().map(|(d, _)| *d).collect();
        assert_eq!(days, vec![ymd(2002, 7, 20), ymd(2003, 7, 20)]);
    }

    #[test]
    // Should drop the followers of a finished cycle
    fn test_followers_stay_in_their_cycle() {
        let mut method = tillage_method("fert", &[rel(1, 3, 0), rel(1, 10, 0)]);
        method.add_application(WorkStep::new(
            rel(1, 4, 0),
            WorkStepKind::MineralFertiliserApplication {
                partition: MineralFertiliserParameters::new("AN", 0.0, 0.5, 0.5),
                amount: 100.0,
                top_dressing: Some(TopDressing {
                    max_amount_now: 60.0,
                    delay_days: 30,
                }),
            },
        ));
        let steps = method.work_steps().len();
        let mut rotation = CropRotation::new(vec![method]).unwrap();
        drive(&mut rotation, ymd(2001, 1, 1), ymd(2001, 9, 30));
        assert_eq!(rotation.active().work_steps().len(), steps + 1);

        drive(&mut rotation, ymd(2001, 1, 1), ymd(2001, 10, 1));
        assert_eq!(rotation.active().work_steps().len(), steps);
        assert_eq!(rotation.methods()[0].work_steps().len(), steps);
    }

    #[test]
    fn test_fertiliser_sum_per_lifecycle() {
        let mut method = tillage_method("fert", &[rel(1, 3, 0), rel(1, 10, 0)]);
        method.add_application(WorkStep::new(
            rel(1, 4, 0),
            WorkStepKind::MineralFertiliserApplication {
                partition: MineralFertiliserParameters::new("AN", 0.0, 0.5, 0.5),
                amount: 100.0,
                top_dressing: Some(TopDressing {
                    max_amount_now: 60.0,
                    delay_days: 30,
                }),
            },
        ));
        let mut rotation = CropRotation::new(vec![method]).unwrap();
        let mut model = test_model(CropArena::new());
        rotation.start(ymd(2001, 1, 1));
        let mut today = ymd(2001, 1, 1);
        let mut results = Vec::new();
        while today <= ymd(2002, 12, 31) {
            rotation.apply_due(today, &mut model);
            if rotation.is_finished() {
                results.push(rotation.finalize_and_advance(today, &mut model));
            }
            today += Duration::days(1);
        }
        assert_eq!(results.len(), 2);
        for r in results {
            assert_eq!(r.get(crate::result::ResultId::SumFertiliser), Some(100.0));
        }
    }

    #[test]
    // Calendar-dated methods that passed leave the rest of the run without management
    fn test_passed_absolute_rotation_is_exhausted() {
        let once = tillage_method("2001 only", &[Date::absolute(ymd(2001, 4, 1))]);
        let mut rotation = CropRotation::new(vec![once]).unwrap();
        let finished = drive(&mut rotation, ymd(2001, 1, 1), ymd(2002, 12, 31));
        assert_eq!(finished.len(), 1);
        assert!(rotation.is_exhausted());
        assert!(!rotation.is_finished());
    }
}
