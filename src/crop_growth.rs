use crate::climate::ClimateData;
use crate::gdd::growing_degree_days;
use crate::params::{CropParameters, SimulationParameters};
use crate::soil_column::SoilColumn;
use chrono::NaiveDate;

/// Daily growth reduction factors, 1.0 means unstressed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StressFactors {
    pub water: f64,
    pub nitrogen: f64,
    pub heat: f64,
    pub oxygen: f64,
}

impl Default for StressFactors {
    fn default() -> Self {
        StressFactors {
            water: 1.0,
            nitrogen: 1.0,
            heat: 1.0,
            oxygen: 1.0,
        }
    }
}

/// Crop physiology of one planted crop, as seen by the daily loop.
///
/// Yield and biomass values are in kg ha-1, N contents in kg N ha-1.
pub trait CropGrowth {
    /// Advances the crop by one day. Runs before the soil sub-models.
    fn step(&mut self, date: NaiveDate, climate: &ClimateData, column: &SoilColumn, co2: f64);

    /// Death was reached in an earlier step; the residue is to be incorporated.
    fn is_dying(&self) -> bool;
    fn maturity_reached(&self) -> bool;

    fn development_stage(&self) -> usize;
    fn crop_coefficient(&self) -> f64;
    fn rooting_depth(&self) -> f64;
    fn crop_height(&self) -> f64;

    fn primary_yield(&self) -> f64;
    fn secondary_yield(&self) -> f64;
    fn primary_yield_fresh(&self) -> f64;
    fn secondary_yield_fresh(&self) -> f64;
    fn primary_yield_n_content(&self) -> f64;
    fn aboveground_biomass_n_content(&self) -> f64;
    fn total_n_uptake(&self) -> f64;
    fn aboveground_biomass(&self) -> f64;
    fn root_biomass(&self) -> f64;

    /// Today's N demand per soil layer [kg N m-2], read by nitrate transport.
    fn n_uptake_per_layer(&self) -> &[f64];

    /// Books the N nitrate transport actually let the crop take up today [kg N m-2], which may be
    /// less than the demand.
    fn set_actual_n_uptake(&mut self, actual: f64);
    fn stress_factors(&self) -> StressFactors;

    /// Removes the harvestable part and lets the crop regrow.
    fn apply_cutting(&mut self);
}

/// Creates the physiology model when a crop is sown.
pub trait CropGrowthFactory {
    fn create(
        &self,
        crop: &CropParameters,
        params: &SimulationParameters,
        layer_count: usize,
    ) -> Box<dyn CropGrowth>;
}

/// Thermal time crop: development follows the crop coefficient curve over growing degree days, biomass
/// grows from intercepted radiation, N is taken up by root depth.
#[derive(Debug, Clone)]
pub struct DegreeDayCrop {
    params: CropParameters,
    minimum_available_n: f64, // [kg N m-2]
    gdd_sum: f64, // [°C d]
    biomass: f64, // Total dry matter including roots [kg DM ha-1]
    n_content: f64, // [kg N ha-1]
    kc: f64,
    rooting_depth: f64, // [m]
    height: f64, // [m]
    n_uptake: Vec<f64>, // [kg N m-2]
    requested_n: f64, // Today's uptake booked into n_content [kg N ha-1]
    stress: StressFactors,
}

const INITIAL_BIOMASS: f64 = 10.0; // Seed dry matter [kg ha-1]
const HEAT_STRESS_TEMPERATURE: f64 = 34.0; // [°C]

impl DegreeDayCrop {
    pub fn new(crop: &CropParameters, params: &SimulationParameters, layer_count: usize) -> Self {
        DegreeDayCrop {
            params: crop.clone(),
            minimum_available_n: params.crop.minimum_available_n,
            gdd_sum: 0.0,
            biomass: INITIAL_BIOMASS,
            n_content: INITIAL_BIOMASS * crop.max_n_concentration,
            kc: crop.kc_curve.initial_end.1,
            rooting_depth: 0.0,
            height: 0.0,
            n_uptake: vec![0.0; layer_count],
            requested_n: 0.0,
            stress: StressFactors::default(),
        }
    }

    pub fn gdd_sum(&self) -> f64 {
        self.gdd_sum
    }

    fn n_concentration(&self) -> f64 {
        if self.biomass > 0.0 {
            (self.n_content / self.biomass).min(self.params.max_n_concentration)
        } else {
            self.params.max_n_concentration
        }
    }

    // Fraction of the ground covered, from the unadjusted crop coefficient
    fn ground_cover(&self) -> f64 {
        let curve = &self.params.kc_curve;
        let peak = curve.mid_end.1.max(0.1);
        (curve.kc(self.gdd_sum, Some(2.0), Some(45.0), None) / peak).clamp(0.0, 1.0)
    }

    fn take_up_n(&mut self, column: &SoilColumn, demand: f64) {
        self.n_uptake.iter_mut().for_each(|u| *u = 0.0);
        self.n_uptake.resize(column.layer_count(), 0.0);
        self.requested_n = 0.0;

        let last = column.layer_index_for_depth(self.rooting_depth);
        let available: Vec<f64> = column.layers()[..=last]
            .iter()
            .map(|l| (l.no3 * l.thickness - self.minimum_available_n).max(0.0))
            .collect();
        let total: f64 = available.iter().sum();
        if total <= 0.0 || demand <= 0.0 {
            return;
        }
        let taken = (demand / 10000.0).min(total); // [kg N m-2]
        for (i, avail) in available.iter().enumerate() {
            self.n_uptake[i] = taken * avail / total;
        }
        self.requested_n = taken * 10000.0;
        self.n_content += self.requested_n;
    }
}

impl CropGrowth for DegreeDayCrop {
    fn step(&mut self, _date: NaiveDate, climate: &ClimateData, column: &SoilColumn, co2: f64) {
        let p = &self.params;
        let daily_gdd = growing_degree_days(climate.tmax, climate.tmin, p.base_temperature);
        let growing = daily_gdd > 0.0 && self.gdd_sum < p.maturity_gdd;
        self.gdd_sum += daily_gdd;

        let development = (self.gdd_sum / p.kc_curve.development_end.0.max(1.0)).min(1.0);
        self.rooting_depth = (p.max_rooting_depth * development).max(column.layer(0).thickness);
        self.height = p.max_crop_height * development;
        self.kc = p
            .kc_curve
            .kc(self.gdd_sum, Some(climate.wind), climate.relhumid, Some(self.height.max(0.1)));

        self.stress.water = (column.plant_available_water_fraction(self.rooting_depth) / 0.5).min(1.0);
        self.stress.heat = if climate.tmax > HEAT_STRESS_TEMPERATURE {
            (1.0 - (climate.tmax - HEAT_STRESS_TEMPERATURE) / 10.0).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let top = column.layer(0);
        self.stress.oxygen = if top.saturation > top.field_capacity {
            let air_filled = (top.saturation - top.moisture) / (top.saturation - top.field_capacity);
            (air_filled / 0.2).clamp(0.0, 1.0)
        } else {
            1.0
        };
        self.stress.nitrogen = (self.n_concentration() / (0.6 * p.max_n_concentration)).min(1.0);

        let co2_factor = (1.0 + 0.3 * (co2.max(1.0) / 360.0).ln()).clamp(0.5, 1.5);
        let growth = if growing {
            p.radiation_use_efficiency
                * climate.globrad.max(0.0)
                * self.ground_cover()
                * co2_factor
                * self.stress.water
                * self.stress.heat
                * self.stress.oxygen
                * self.stress.nitrogen
        } else {
            0.0
        };
        self.biomass += growth;

        let demand = (p.max_n_concentration * self.biomass - self.n_content).max(0.0);
        self.take_up_n(column, demand);
    }

    fn is_dying(&self) -> bool {
        self.gdd_sum >= self.params.senescence_gdd
    }

    fn maturity_reached(&self) -> bool {
        self.gdd_sum >= self.params.maturity_gdd
    }

    fn development_stage(&self) -> usize {
        let c = &self.params.kc_curve;
        let g = self.gdd_sum;
        if g <= c.initial_end.0 {
            1
        } else if g <= c.development_end.0 {
            2
        } else if g <= c.mid_end.0 {
            3
        } else if g < self.params.maturity_gdd {
            4
        } else if g < self.params.senescence_gdd {
            5
        } else {
            6
        }
    }

    fn crop_coefficient(&self) -> f64 {
        self.kc
    }

    fn rooting_depth(&self) -> f64 {
        self.rooting_depth
    }

    fn crop_height(&self) -> f64 {
        self.height
    }

    fn primary_yield(&self) -> f64 {
        self.aboveground_biomass() * self.params.harvest_index
    }

    fn secondary_yield(&self) -> f64 {
        self.aboveground_biomass() * (1.0 - self.params.harvest_index)
    }

    fn primary_yield_fresh(&self) -> f64 {
        self.primary_yield() / self.params.primary_dry_matter_content.max(0.01)
    }

    fn secondary_yield_fresh(&self) -> f64 {
        self.secondary_yield() / self.params.primary_dry_matter_content.max(0.01)
    }

    fn primary_yield_n_content(&self) -> f64 {
        self.primary_yield() * self.n_concentration()
    }

    fn aboveground_biomass_n_content(&self) -> f64 {
        self.aboveground_biomass() * self.n_concentration()
    }

    fn total_n_uptake(&self) -> f64 {
        self.n_content
    }

    fn aboveground_biomass(&self) -> f64 {
        self.biomass * (1.0 - self.params.root_share)
    }

    fn root_biomass(&self) -> f64 {
        self.biomass * self.params.root_share
    }

    fn n_uptake_per_layer(&self) -> &[f64] {
        &self.n_uptake
    }

    fn set_actual_n_uptake(&mut self, actual: f64) {
        let actual = (actual * 10000.0).min(self.requested_n);
        self.n_content = (self.n_content - (self.requested_n - actual)).max(0.0);
        self.requested_n = actual;
    }

    fn stress_factors(&self) -> StressFactors {
        self.stress
    }

    fn apply_cutting(&mut self) {
        let removed = self.primary_yield();
        let concentration = self.n_concentration();
        self.biomass -= removed;
        self.n_content = (self.n_content - removed * concentration).max(0.0);
        self.gdd_sum = self.gdd_sum.min(self.params.kc_curve.initial_end.0);
    }
}

/// Creates [`DegreeDayCrop`] instances.
#[derive(Debug, Clone, Copy, Default)]
pub struct DegreeDayCropFactory;

impl CropGrowthFactory for DegreeDayCropFactory {
    fn create(
        &self,
        crop: &CropParameters,
        params: &SimulationParameters,
        layer_count: usize,
    ) -> Box<dyn CropGrowth> {
        Box::new(DegreeDayCrop::new(crop, params, layer_count))
    }
}
