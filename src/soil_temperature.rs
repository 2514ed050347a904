use crate::climate::ClimateData;
use crate::params::SoilTemperatureParameters;
use crate::soil_column::SoilColumn;

/// Soil temperature sub-model. Runs first in the daily general step.
pub trait SoilTemperatureModule {
    /// Advances layer temperatures by one day.
    fn step(&mut self, column: &mut SoilColumn, climate: &ClimateData);

    /// Soil surface temperature of the last step [°C].
    fn surface_temperature(&self) -> f64;
}

/// Layer temperatures relax towards the daily mean air temperature, damped exponentially with depth.
#[derive(Debug, Clone)]
pub struct DampedSoilTemperature {
    damping_depth: f64,
    relaxation: f64,
    surface_temperature: f64,
}

impl DampedSoilTemperature {
    pub fn new(params: &SoilTemperatureParameters) -> DampedSoilTemperature {
        DampedSoilTemperature {
            damping_depth: params.damping_depth.max(0.01),
            relaxation: params.relaxation.clamp(0.0, 1.0),
            surface_temperature: 0.0,
        }
    }
}

impl SoilTemperatureModule for DampedSoilTemperature {
    fn step(&mut self, column: &mut SoilColumn, climate: &ClimateData) {
        // Bare surface heats above the air on sunny days
        self.surface_temperature = climate.tavg + 0.05 * climate.globrad.max(0.0);

        let mut top = 0.0;
        for layer in column.layers_mut() {
            let mid_depth = top + layer.thickness / 2.0;
            top += layer.thickness;
            let weight = self.relaxation * (-mid_depth / self.damping_depth).exp();
            layer.temperature += weight * (self.surface_temperature - layer.temperature);
        }
    }

    fn surface_temperature(&self) -> f64 {
        self.surface_temperature
    }
}
