use crate::climate::{co2_for_date, groundwater_depth_for_date, ClimateData};
use crate::crop::{CropArena, CropHandle};
use crate::crop_growth::{CropGrowth, CropGrowthFactory, DegreeDayCropFactory};
use crate::params::{
    IrrigationParameters, MineralFertiliserParameters, OrganicMatterParameters, SimulationParameters,
};
use crate::soil_column::SoilColumn;
use crate::soil_moisture::{CascadingSoilMoisture, CropWaterDemand, SoilMoistureModule};
use crate::soil_organic::{FirstOrderSoilOrganic, SoilOrganicModule};
use crate::soil_temperature::{DampedSoilTemperature, SoilTemperatureModule};
use crate::soil_transport::SoilTransport;
use chrono::{Datelike, NaiveDate};
use log::{debug, info, warn};
use std::sync::Arc;

// Depth whose plant available water triggers automatic irrigation [m]
const IRRIGATION_CRITICAL_DEPTH: f64 = 0.3;

struct PlantedCrop {
    handle: CropHandle,
    growth: Box<dyn CropGrowth>,
}

/// The daily stepping engine of one field: soil column, soil sub-models, the planted crop and the
/// counters work steps write to.
///
/// A day is advanced by the caller in a fixed order, see `Simulation::step`. The model itself only offers
/// the pieces: crop events, management operations, [`SimulationModel::crop_step`] and
/// [`SimulationModel::general_step`].
pub struct SimulationModel {
    params: Arc<SimulationParameters>,
    column: SoilColumn,
    temperature: Box<dyn SoilTemperatureModule>,
    moisture: Box<dyn SoilMoistureModule>,
    organic: Box<dyn SoilOrganicModule>,
    transport: SoilTransport,
    crops: CropArena,
    crop_factory: Box<dyn CropGrowthFactory>,
    planted: Option<PlantedCrop>,

    date: NaiveDate,
    co2: f64, // [ppm]
    groundwater_depth: f64, // [m]
    daily_sum_fertiliser: f64, // [kg N ha-1]
    daily_sum_irrigation: f64, // [mm]
    sum_fertiliser: f64, // Since the last finished lifecycle [kg N ha-1]
}

impl SimulationModel {
    /// Creates a model with the bundled reference sub-models.
    ///
    /// # Parameters
    ///
    /// - `params`: Shared parameter bundle of the run.
    /// - `column`: Initial soil profile.
    /// - `crops`: Every crop the rotation refers to.
    pub fn new(params: Arc<SimulationParameters>, column: SoilColumn, crops: CropArena) -> SimulationModel {
        let layer_count = column.layer_count();
        SimulationModel {
            temperature: Box::new(DampedSoilTemperature::new(&params.soil_temperature)),
            moisture: Box::new(CascadingSoilMoisture::new(&params.soil_moisture)),
            organic: Box::new(FirstOrderSoilOrganic::new(&params.soil_organic)),
            transport: SoilTransport::new(&params, layer_count),
            crop_factory: Box::new(DegreeDayCropFactory),
            params,
            column,
            crops,
            planted: None,
            date: NaiveDate::default(),
            co2: 0.0,
            groundwater_depth: 0.0,
            daily_sum_fertiliser: 0.0,
            daily_sum_irrigation: 0.0,
            sum_fertiliser: 0.0,
        }
    }

    pub fn with_soil_temperature(mut self, module: Box<dyn SoilTemperatureModule>) -> Self {
        self.temperature = module;
        self
    }

    pub fn with_soil_moisture(mut self, module: Box<dyn SoilMoistureModule>) -> Self {
        self.moisture = module;
        self
    }

    pub fn with_soil_organic(mut self, module: Box<dyn SoilOrganicModule>) -> Self {
        self.organic = module;
        self
    }

    pub fn with_crop_growth_factory(mut self, factory: Box<dyn CropGrowthFactory>) -> Self {
        self.crop_factory = factory;
        self
    }

    pub fn params(&self) -> &SimulationParameters {
        &self.params
    }

    pub fn column(&self) -> &SoilColumn {
        &self.column
    }

    pub fn column_mut(&mut self) -> &mut SoilColumn {
        &mut self.column
    }

    pub fn crops(&self) -> &CropArena {
        &self.crops
    }

    pub fn crops_mut(&mut self) -> &mut CropArena {
        &mut self.crops
    }

    pub fn current_date(&self) -> NaiveDate {
        self.date
    }

    /// Handle of the planted crop, `None` on bare soil.
    pub fn current_crop(&self) -> Option<CropHandle> {
        self.planted.as_ref().map(|p| p.handle)
    }

    pub fn crop_growth(&self) -> Option<&dyn CropGrowth> {
        self.planted.as_ref().map(|p| p.growth.as_ref())
    }

    pub fn soil_temperature(&self) -> &dyn SoilTemperatureModule {
        self.temperature.as_ref()
    }

    pub fn soil_moisture(&self) -> &dyn SoilMoistureModule {
        self.moisture.as_ref()
    }

    pub fn soil_organic(&self) -> &dyn SoilOrganicModule {
        self.organic.as_ref()
    }

    pub fn soil_transport(&self) -> &SoilTransport {
        &self.transport
    }

    pub fn co2(&self) -> f64 {
        self.co2
    }

    pub fn groundwater_depth(&self) -> f64 {
        self.groundwater_depth
    }

    pub fn daily_sum_fertiliser(&self) -> f64 {
        self.daily_sum_fertiliser
    }

    pub fn daily_sum_irrigation(&self) -> f64 {
        self.daily_sum_irrigation
    }

    pub fn sum_fertiliser(&self) -> f64 {
        self.sum_fertiliser
    }

    pub fn reset_fertiliser_counter(&mut self) {
        self.sum_fertiliser = 0.0;
    }

    /// Sets the simulation clock and the date driven boundary conditions.
    pub fn set_current_date(&mut self, date: NaiveDate) {
        self.date = date;
        let env = &self.params.environment;
        self.co2 = if env.atmospheric_co2 > 0.0 {
            env.atmospheric_co2
        } else {
            co2_for_date(date)
        };
        let site = &self.params.site;
        self.groundwater_depth = groundwater_depth_for_date(
            site.max_groundwater_depth,
            site.min_groundwater_depth,
            site.min_groundwater_depth_month,
            date,
        );
    }

    /// Zeroes the counters of the current day. Must run before the day's work steps.
    pub fn reset_daily_counter(&mut self) {
        self.daily_sum_fertiliser = 0.0;
        self.daily_sum_irrigation = 0.0;
    }

    /// Plants a crop. A crop still on the field is incorporated first.
    pub fn seed_crop(&mut self, handle: CropHandle) {
        if let Some(current) = self.current_crop() {
            warn!(
                "{}: seeding {} while {} is still planted, incorporating it",
                self.date,
                self.crops.get(handle).name(),
                self.crops.get(current).name()
            );
            self.incorporate_current_crop();
        }
        let growth = self.crop_factory.create(
            self.crops.get(handle).params(),
            &self.params,
            self.column.layer_count(),
        );
        debug!("{}: seeded {}", self.date, self.crops.get(handle).name());
        self.planted = Some(PlantedCrop { handle, growth });
    }

    /// Harvests `handle` if it is the planted crop.
    ///
    /// # Returns
    ///
    /// `false` if nothing was harvested, e.g. because an automatic harvest already cleared the field.
    pub fn harvest_crop(&mut self, handle: CropHandle) -> bool {
        match self.current_crop() {
            Some(current) if current == handle => {
                self.harvest_current_crop();
                true
            }
            Some(current) => {
                warn!(
                    "{}: harvest of {} ignored, {} is planted",
                    self.date,
                    self.crops.get(handle).name(),
                    self.crops.get(current).name()
                );
                false
            }
            None => {
                warn!(
                    "{}: harvest of {} ignored, no crop is planted",
                    self.date,
                    self.crops.get(handle).name()
                );
                false
            }
        }
    }

    /// Writes the yields of the planted crop to its accumulators and returns roots and, unless
    /// secondary yields are exported, the secondary yield to the soil as residue.
    pub fn harvest_current_crop(&mut self) {
        let Some(PlantedCrop { handle, growth }) = self.planted.take() else {
            return;
        };
        let use_secondary = self.params.environment.use_secondary_yields;
        let crop = self.crops.get_mut(handle);
        let a = crop.accumulators_mut();
        a.primary_yield += growth.primary_yield();
        a.primary_yield_fresh += growth.primary_yield_fresh();
        a.primary_yield_n += growth.primary_yield_n_content();
        if use_secondary {
            a.secondary_yield += growth.secondary_yield();
            a.secondary_yield_fresh += growth.secondary_yield_fresh();
        }
        a.aboveground_biomass_n = growth.aboveground_biomass_n_content();
        a.total_n_uptake = growth.total_n_uptake();
        a.crop_height = growth.crop_height();
        a.harvests += 1;

        let residue = growth.root_biomass() + if use_secondary { 0.0 } else { growth.secondary_yield() };
        let residue_params = crop.params().residue.clone();
        info!(
            "{}: harvested {} with {:.0} kg ha-1 primary yield",
            self.date,
            crop.name(),
            growth.primary_yield()
        );
        self.add_residue(&residue_params, residue);
    }

    /// Returns the whole biomass of the planted crop to the soil and clears the field.
    pub fn incorporate_current_crop(&mut self) {
        let Some(PlantedCrop { handle, growth }) = self.planted.take() else {
            return;
        };
        let crop = self.crops.get(handle);
        let residue_params = crop.params().residue.clone();
        let biomass = growth.aboveground_biomass() + growth.root_biomass();
        info!("{}: incorporated {} ({:.0} kg DM ha-1)", self.date, crop.name(), biomass);
        self.add_residue(&residue_params, biomass);
    }

    // Residue dry matter [kg DM ha-1] into the organic layers
    fn add_residue(&mut self, params: &OrganicMatterParameters, dry_matter: f64) {
        if dry_matter <= 0.0 {
            return;
        }
        let fresh_matter = dry_matter / params.dry_matter_content.max(0.01);
        let depth = self.params.soil_organic.organic_layers_depth;
        self.organic
            .add_organic_matter(&mut self.column, params, fresh_matter, depth);
    }

    /// Cuts `handle` if it is the planted crop: its current yield goes to the accumulators and the crop
    /// regrows.
    pub fn cut_crop(&mut self, handle: CropHandle) -> bool {
        let Some(planted) = self.planted.as_mut().filter(|p| p.handle == handle) else {
            warn!(
                "{}: cutting of {} ignored, crop is not planted",
                self.date,
                self.crops.get(handle).name()
            );
            return false;
        };
        let growth = &mut planted.growth;
        let a = self.crops.get_mut(handle).accumulators_mut();
        a.primary_yield += growth.primary_yield();
        a.primary_yield_fresh += growth.primary_yield_fresh();
        a.primary_yield_n += growth.primary_yield_n_content();
        a.crop_height = growth.crop_height();
        a.harvests += 1;
        growth.apply_cutting();
        debug!("{}: cut {}", self.date, self.crops.get(handle).name());
        true
    }

    /// Harvests the planted crop if it has an automatic harvest and is mature, or if today is its
    /// latest harvest day.
    ///
    /// # Returns
    ///
    /// `true` if the crop was harvested.
    pub fn check_automatic_harvest(&mut self, today: NaiveDate) -> bool {
        let Some(planted) = self.planted.as_ref() else {
            return false;
        };
        let Some(auto) = self.crops.get(planted.handle).params().automatic_harvest else {
            return false;
        };
        if planted.growth.maturity_reached() || today.ordinal() == auto.latest_harvest_doy {
            debug!("{}: automatic harvest triggered", today);
            self.harvest_current_crop();
            true
        } else {
            false
        }
    }

    /// Adds mineral fertiliser to the soil and to the fertiliser counters.
    pub fn apply_mineral_fertiliser(&mut self, params: &MineralFertiliserParameters, amount: f64) {
        self.column.apply_mineral_fertiliser(params, amount);
        self.add_fertiliser(amount);
        debug!("{}: {:.1} kg N ha-1 of {}", self.date, amount, params.name);
    }

    /// Adds organic fertiliser. Incorporated material is mixed into the organic layers, otherwise it
    /// stays in the top layer. Its N counts as applied fertiliser.
    pub fn apply_organic_fertiliser(
        &mut self,
        params: &OrganicMatterParameters,
        amount: f64,
        incorporation: bool,
    ) {
        let depth = if incorporation {
            self.params.soil_organic.organic_layers_depth
        } else {
            0.0
        };
        self.organic
            .add_organic_matter(&mut self.column, params, amount, depth);
        self.add_fertiliser(amount * params.dry_matter_content * params.n_concentration);
    }

    fn add_fertiliser(&mut self, amount: f64) {
        self.daily_sum_fertiliser += amount;
        self.sum_fertiliser += amount;
    }

    pub fn apply_tillage(&mut self, depth: f64) {
        self.column.apply_tillage(depth);
        debug!("{}: tillage to {:.2} m", self.date, depth);
    }

    /// Irrigates. Ignored while automatic irrigation is enabled.
    pub fn apply_irrigation(&mut self, amount: f64, params: &IrrigationParameters) {
        if self.params.environment.use_automatic_irrigation {
            debug!("{}: irrigation ignored, automatic irrigation is enabled", self.date);
            return;
        }
        self.irrigate(amount, params.nitrate_concentration);
    }

    fn irrigate(&mut self, amount: f64, nitrate_concentration: f64) {
        self.column.apply_irrigation(amount, nitrate_concentration);
        self.daily_sum_irrigation += amount;
        if let Some(handle) = self.current_crop() {
            self.crops.get_mut(handle).accumulators_mut().irrigation += amount;
        }
    }

    /// Advances the planted crop by one day, then irrigates automatically if enabled and the root
    /// zone is too dry.
    pub fn crop_step(&mut self, climate: &ClimateData) {
        let Some(planted) = self.planted.as_mut() else {
            return;
        };
        planted
            .growth
            .step(self.date, climate, &self.column, self.co2);

        let stress = planted.growth.stress_factors();
        let a = self.crops.get_mut(planted.handle).accumulators_mut();
        a.days_with_crop += 1;
        a.water_stress += 1.0 - stress.water;
        a.n_stress += 1.0 - stress.nitrogen;
        a.heat_stress += 1.0 - stress.heat;
        a.oxygen_stress += 1.0 - stress.oxygen;

        let env = &self.params.environment;
        if env.use_automatic_irrigation
            && self.column.plant_available_water_fraction(IRRIGATION_CRITICAL_DEPTH)
                <= env.automatic_irrigation.threshold
        {
            let auto = env.automatic_irrigation.clone();
            debug!("{}: automatic irrigation of {:.1} mm", self.date, auto.amount);
            self.irrigate(auto.amount, auto.nitrate_concentration);
        }
    }

    /// Advances the soil sub-models by one day: temperature, moisture, organic matter, nitrate
    /// transport.
    pub fn general_step(&mut self, climate: &ClimateData) {
        self.temperature.step(&mut self.column, climate);

        let demand = self.planted.as_ref().map(|p| CropWaterDemand {
            crop_coefficient: p.growth.crop_coefficient(),
            rooting_depth: p.growth.rooting_depth(),
        });
        self.moisture
            .step(&mut self.column, climate, demand, self.groundwater_depth);

        self.organic.step(&mut self.column);

        let uptake: &[f64] = match &self.planted {
            Some(p) => p.growth.n_uptake_per_layer(),
            None => &[],
        };
        self.transport.step(&mut self.column, uptake);
        if let Some(p) = self.planted.as_mut() {
            p.growth.set_actual_n_uptake(self.column.crop_n_uptake);
        }

        if let Some(handle) = self.current_crop() {
            self.crops.get_mut(handle).accumulators_mut().evapotranspiration +=
                self.moisture.actual_evapotranspiration();
        }
    }
}
