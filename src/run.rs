use crate::climate::{ClimateData, ClimateSeries};
use crate::crop::CropArena;
use crate::cultivation_method::CultivationMethod;
use crate::error::{Result, SimulationError};
use crate::model::SimulationModel;
use crate::params::SimulationParameters;
use crate::result::{DailyObserver, DailyRecord, DailySample, PvResult, ResultAccumulator, SimulationResult};
use crate::rotation::CropRotation;
use crate::soil_column::SoilColumn;
use chrono::NaiveDate;
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One simulation run: a model, the weather driving it and the crop rotation managing it.
///
/// The run lasts as long as the climate series. Each call to [`Simulation::step`] advances one day.
pub struct Simulation {
    model: SimulationModel,
    climate: ClimateSeries,
    rotation: CropRotation,
    accumulator: ResultAccumulator,
    pv_results: Vec<PvResult>,
    day: usize,
}

impl Simulation {
    /// Creates a run starting on the first day of `climate`.
    ///
    /// # Errors
    ///
    /// [`SimulationError::UnknownCrop`] if a cultivation method refers to a crop the model does not own.
    pub fn new(model: SimulationModel, climate: ClimateSeries, mut rotation: CropRotation) -> Result<Simulation> {
        let crop_count = model.crops().len();
        for method in rotation.methods() {
            if let Some(handle) = method.crop().filter(|h| h.index() >= crop_count) {
                return Err(SimulationError::UnknownCrop(format!(
                    "{} (crop #{})",
                    method.name(),
                    handle.index()
                )));
            }
        }
        rotation.start(climate.start_date());
        Ok(Simulation {
            model,
            climate,
            rotation,
            accumulator: ResultAccumulator::new(),
            pv_results: Vec::new(),
            day: 0,
        })
    }

    /// Creates a run with the bundled reference sub-models.
    ///
    /// # Parameters
    ///
    /// - `params`: Shared parameter bundle.
    /// - `column`: Initial soil profile.
    /// - `crops`: Crops referred to by `methods`.
    /// - `methods`: The crop rotation, in order.
    /// - `climate`: Weather of every day to simulate.
    pub fn from_parameters(
        params: Arc<SimulationParameters>,
        column: SoilColumn,
        crops: CropArena,
        methods: Vec<CultivationMethod>,
        climate: ClimateSeries,
    ) -> Result<Simulation> {
        let rotation = CropRotation::new(methods)?;
        let model = SimulationModel::new(params, column, crops);
        Simulation::new(model, climate, rotation)
    }

    pub fn model(&self) -> &SimulationModel {
        &self.model
    }

    pub fn rotation(&self) -> &CropRotation {
        &self.rotation
    }

    /// Finished lifecycles so far.
    pub fn pv_results(&self) -> &[PvResult] {
        &self.pv_results
    }

    /// Date of the next day to simulate, `None` once the climate series is exhausted.
    pub fn next_date(&self) -> Option<NaiveDate> {
        self.climate.get(self.day).map(|_| self.climate.date_for_step(self.day))
    }

    /// Simulates one day.
    ///
    /// # Returns
    ///
    /// The record of the simulated day, `None` when the climate series is exhausted.
    pub fn step(&mut self) -> Option<DailyRecord> {
        let climate = *self.climate.get(self.day)?;
        let today = self.climate.date_for_step(self.day);
        let model = &mut self.model;

        model.set_current_date(today);
        model.reset_daily_counter();

        if model.crop_growth().is_some_and(|c| c.is_dying()) {
            model.incorporate_current_crop();
        }
        model.check_automatic_harvest(today);

        self.rotation.apply_due(today, model);

        model.crop_step(&climate);
        model.general_step(&climate);

        let sample = self.sample(&climate);
        self.accumulator.add(today, &sample);
        let record = self.record(today, &climate);

        if self.rotation.is_finished() {
            let result = self.rotation.finalize_and_advance(today, &mut self.model);
            self.pv_results.push(result);
        }
        self.day += 1;
        Some(record)
    }

    fn sample(&self, climate: &ClimateData) -> DailySample {
        let column = self.model.column();
        let moisture = self.model.soil_moisture();
        DailySample {
            corg_10cm: column.avg_corg(0.1),
            corg_30cm: column.avg_corg(0.3),
            water_content_90cm: column.mean_water_content(0.9),
            recharge: moisture.groundwater_recharge(),
            n_leaching: self.model.soil_transport().n_leaching(),
            runoff: moisture.surface_runoff(),
            precip: climate.precip,
            eta: moisture.actual_evapotranspiration(),
            nmin_90cm: column.sum_nmin(0.9),
            no3_90cm: column.sum_no3(0.9),
            soil_temperature_30cm: column.avg_soil_temperature(0.3),
            development_stage: self.development_stage(),
        }
    }

    fn development_stage(&self) -> usize {
        self.model
            .crop_growth()
            .map(|c| c.development_stage())
            .unwrap_or(0)
    }

    fn record(&self, date: NaiveDate, climate: &ClimateData) -> DailyRecord {
        let column = self.model.column();
        let moisture = self.model.soil_moisture();
        DailyRecord {
            date,
            crop: self
                .model
                .current_crop()
                .map(|h| self.model.crops().get(h).name().to_string()),
            development_stage: self.development_stage(),
            n_leaching: self.model.soil_transport().n_leaching(),
            recharge: moisture.groundwater_recharge(),
            eta: moisture.actual_evapotranspiration(),
            precip: climate.precip,
            no3: column.layers().iter().map(|l| l.no3).collect(),
            moisture: column.layers().iter().map(|l| l.moisture).collect(),
        }
    }

    /// Simulates every remaining day.
    pub fn run(&mut self) -> SimulationResult {
        self.run_with_observer(|_: &DailyRecord| {})
    }

    /// Simulates every remaining day, handing each day's record to `observer`.
    pub fn run_with_observer<O: DailyObserver>(&mut self, observer: O) -> SimulationResult {
        let never = AtomicBool::new(false);
        self.run_cancellable(&never, observer)
    }

    /// Simulates every remaining day unless `cancel` is set. The flag is checked between days.
    ///
    /// # Returns
    ///
    /// The results up to the last simulated day. `cancelled` is set if the run was stopped early.
    pub fn run_cancellable<O: DailyObserver>(&mut self, cancel: &AtomicBool, mut observer: O) -> SimulationResult {
        info!(
            "simulating {} days from {} with {} cultivation method(s)",
            self.climate.len() - self.day,
            self.climate.date_for_step(self.day),
            self.rotation.methods().len()
        );
        let mut cancelled = false;
        loop {
            if cancel.load(Ordering::Relaxed) {
                warn!("run cancelled after {} days", self.day);
                cancelled = true;
                break;
            }
            match self.step() {
                Some(record) => observer.on_day(&record),
                None => break,
            }
        }
        if !self.rotation.is_exhausted() && self.rotation.next_date().is_some() {
            info!("{} unfinished at run end, no result written", self.rotation.active().name());
        }
        info!(
            "run finished after {} days, {} lifecycle(s)",
            self.day,
            self.pv_results.len()
        );

        SimulationResult {
            pv_results: std::mem::take(&mut self.pv_results),
            general: std::mem::take(&mut self.accumulator).finish(),
            cancelled,
            simulated_days: self.day,
        }
    }
}
