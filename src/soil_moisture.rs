use crate::climate::ClimateData;
use crate::params::SoilMoistureParameters;
use crate::soil_column::SoilColumn;

/// What the planted crop asks of the soil water model on one day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropWaterDemand {
    pub crop_coefficient: f64,
    pub rooting_depth: f64, // [m]
}

/// Soil water sub-model. Runs after soil temperature and before organic matter and nitrate transport.
///
/// A step must leave `soil_water_flux` of every layer and `flux_at_lower_boundary` of the column set
/// for the day, downward positive, because nitrate transport reads them.
pub trait SoilMoistureModule {
    fn step(
        &mut self,
        column: &mut SoilColumn,
        climate: &ClimateData,
        crop: Option<CropWaterDemand>,
        groundwater_depth: f64,
    );

    fn reference_evapotranspiration(&self) -> f64;
    fn actual_evapotranspiration(&self) -> f64;
    fn actual_evaporation(&self) -> f64;
    fn potential_transpiration(&self) -> f64;
    fn actual_transpiration(&self) -> f64;
    fn groundwater_recharge(&self) -> f64;
    fn surface_runoff(&self) -> f64;
}

/// Capacity based bucket cascade. Water above field capacity drains a fixed share per day into the next
/// layer; evaporation and transpiration follow a radiation based reference evapotranspiration.
#[derive(Debug, Clone, Default)]
pub struct CascadingSoilMoisture {
    params: SoilMoistureParameters,
    et0: f64, // [mm]
    evaporation: f64, // [mm]
    potential_transpiration: f64, // [mm]
    transpiration: f64, // [mm]
    recharge: f64, // [mm]
    runoff: f64, // [mm]
}

/// Hargreaves radiation formula for reference evapotranspiration [mm d-1].
///
/// # Parameters
///
/// - `tavg`: Mean air temperature [°C].
/// - `globrad`: Global radiation [MJ m-2 d-1].
pub fn reference_evapotranspiration(tavg: f64, globrad: f64) -> f64 {
    (0.0135 * (tavg + 17.8) * globrad / 2.45).max(0.0)
}

impl CascadingSoilMoisture {
    pub fn new(params: &SoilMoistureParameters) -> CascadingSoilMoisture {
        CascadingSoilMoisture {
            params: params.clone(),
            ..CascadingSoilMoisture::default()
        }
    }

    fn infiltrate_and_drain(&mut self, column: &mut SoilColumn, input: f64) {
        let drainage_coefficient = self.params.drainage_coefficient.clamp(0.0, 1.0);
        let mut incoming = input;
        self.runoff = 0.0;

        for (i, layer) in column.layers_mut().iter_mut().enumerate() {
            let mm_per_unit = layer.thickness * 1000.0;
            layer.soil_water_flux = incoming;

            let mut water = layer.moisture * mm_per_unit + incoming;
            let fc_water = layer.field_capacity * mm_per_unit;
            let sat_water = layer.saturation * mm_per_unit;

            let mut drain = if water > fc_water {
                (water - fc_water) * drainage_coefficient
            } else {
                0.0
            };
            water -= drain;
            if water > sat_water {
                let excess = water - sat_water;
                water = sat_water;
                if i == 0 {
                    self.runoff = excess;
                    layer.soil_water_flux -= excess;
                } else {
                    drain += excess;
                }
            }
            layer.moisture = water / mm_per_unit;
            incoming = drain;
        }
        column.flux_at_lower_boundary = incoming;
        self.recharge = incoming;
    }

    fn evaporate(&mut self, column: &mut SoilColumn, demand: f64) {
        let depth = self.params.evaporation_depth;
        let last = column.layer_index_for_depth(depth);
        let mut remaining = demand;
        for layer in column.layers_mut()[..=last].iter_mut() {
            let floor = (layer.permanent_wilting_point / 3.0).max(0.005);
            let available = (layer.moisture - floor).max(0.0) * layer.thickness * 1000.0;
            let taken = remaining.min(available);
            layer.moisture -= taken / (layer.thickness * 1000.0);
            remaining -= taken;
        }
        self.evaporation = demand - remaining;
    }

    fn transpire(&mut self, column: &mut SoilColumn, demand: f64, rooting_depth: f64) {
        let last = column.layer_index_for_depth(rooting_depth.max(0.0));
        let root_zone = &mut column.layers_mut()[..=last];

        let available: Vec<f64> = root_zone.iter().map(|l| l.plant_available_water()).collect();
        let total_available: f64 = available.iter().sum();
        let total_max: f64 = root_zone.iter().map(|l| l.max_plant_available_water()).sum();
        if total_available <= 0.0 || total_max <= 0.0 {
            self.transpiration = 0.0;
            return;
        }

        // Uptake falls off linearly once less than half of the root zone water is left
        let fraction = total_available / total_max;
        let reduction = (fraction / 0.5).min(1.0);
        let actual = (demand * reduction).min(total_available);

        for (layer, avail) in root_zone.iter_mut().zip(available) {
            let taken = actual * avail / total_available;
            layer.moisture -= taken / (layer.thickness * 1000.0);
        }
        self.transpiration = actual;
    }
}

impl SoilMoistureModule for CascadingSoilMoisture {
    fn step(
        &mut self,
        column: &mut SoilColumn,
        climate: &ClimateData,
        crop: Option<CropWaterDemand>,
        groundwater_depth: f64,
    ) {
        let input = climate.precip.max(0.0) + column.surface_water_storage;
        column.surface_water_storage = 0.0;
        self.infiltrate_and_drain(column, input);

        // Layers below the water table stay saturated
        let mut top = 0.0;
        for layer in column.layers_mut() {
            if top >= groundwater_depth {
                layer.moisture = layer.saturation;
            }
            top += layer.thickness;
        }

        self.et0 = reference_evapotranspiration(climate.tavg, climate.globrad);
        let cover = crop.map(|c| c.crop_coefficient.clamp(0.0, 1.0)).unwrap_or(0.0);
        self.potential_transpiration = crop
            .map(|c| c.crop_coefficient.max(0.0) * self.et0 * cover)
            .unwrap_or(0.0);

        let evaporation_demand = self.et0 * self.params.evaporation_reduction * (1.0 - cover);
        self.evaporate(column, evaporation_demand);

        match crop {
            Some(c) => self.transpire(column, self.potential_transpiration, c.rooting_depth),
            None => self.transpiration = 0.0,
        }
    }

    fn reference_evapotranspiration(&self) -> f64 {
        self.et0
    }

    fn actual_evapotranspiration(&self) -> f64 {
        self.evaporation + self.transpiration
    }

    fn actual_evaporation(&self) -> f64 {
        self.evaporation
    }

    fn potential_transpiration(&self) -> f64 {
        self.potential_transpiration
    }

    fn actual_transpiration(&self) -> f64 {
        self.transpiration
    }

    fn groundwater_recharge(&self) -> f64 {
        self.recharge
    }

    fn surface_runoff(&self) -> f64 {
        self.runoff
    }
}
