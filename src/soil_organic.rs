use crate::params::{OrganicMatterParameters, SoilOrganicParameters};
use crate::soil_column::SoilColumn;
use log::debug;

/// Soil organic matter and mineral nitrogen turnover. Runs after soil moisture, before nitrate transport.
pub trait SoilOrganicModule {
    /// Advances organic turnover by one day using today's layer temperature and moisture.
    fn step(&mut self, column: &mut SoilColumn);

    /// Adds organic fertiliser or crop residue.
    ///
    /// # Parameters
    ///
    /// - `params`: Composition of the material.
    /// - `amount`: Fresh matter applied [kg ha-1].
    /// - `depth`: Depth the material is mixed into [m]. The top layer receives it at shallower depths.
    fn add_organic_matter(
        &mut self,
        column: &mut SoilColumn,
        params: &OrganicMatterParameters,
        amount: f64,
        depth: f64,
    );

    /// Net N mineralised in the last step [kg N ha-1].
    fn net_n_mineralisation(&self) -> f64;

    /// Carbon released as CO2 in the last step [kg C ha-1].
    fn decomposed_carbon(&self) -> f64;
}

/// First-order kinetics for stable humus, fresh residues, carbamid hydrolysis and nitrification, each
/// scaled by temperature and moisture response factors.
#[derive(Debug, Clone)]
pub struct FirstOrderSoilOrganic {
    params: SoilOrganicParameters,
    net_n_mineralisation: f64,
    decomposed_carbon: f64,
}

// Share of decomposed residue carbon that ends up in stable humus
const HUMIFICATION: f64 = 0.2;

/// Q10 = 2 response around 20 °C, zero at or below freezing.
pub fn temperature_factor(temperature: f64) -> f64 {
    if temperature <= 0.0 {
        0.0
    } else {
        2f64.powf((temperature.min(40.0) - 20.0) / 10.0)
    }
}

/// Linear rise up to field capacity, falling again towards saturation.
pub fn moisture_factor(moisture: f64, field_capacity: f64, saturation: f64) -> f64 {
    if moisture <= 0.0 || field_capacity <= 0.0 {
        0.0
    } else if moisture <= field_capacity {
        moisture / field_capacity
    } else if saturation > field_capacity {
        1.0 - 0.4 * ((moisture - field_capacity) / (saturation - field_capacity)).min(1.0)
    } else {
        1.0
    }
}

impl FirstOrderSoilOrganic {
    pub fn new(params: &SoilOrganicParameters) -> FirstOrderSoilOrganic {
        FirstOrderSoilOrganic {
            params: params.clone(),
            net_n_mineralisation: 0.0,
            decomposed_carbon: 0.0,
        }
    }
}

impl SoilOrganicModule for FirstOrderSoilOrganic {
    fn step(&mut self, column: &mut SoilColumn) {
        let p = &self.params;
        let last = column.layer_index_for_depth(p.organic_layers_depth);
        let mut mineralised = 0.0; // [kg N m-2]
        let mut released_c = 0.0; // [kg C m-2]

        for (i, layer) in column.layers_mut().iter_mut().enumerate() {
            let f = temperature_factor(layer.temperature)
                * moisture_factor(layer.moisture, layer.field_capacity, layer.saturation);

            let hydrolysed = layer.carbamid * (p.hydrolysis_rate * f).min(1.0);
            layer.carbamid -= hydrolysed;
            layer.nh4 += hydrolysed;

            if i <= last {
                // Fresh residues
                let fraction = (p.residue_turnover_rate * f).min(1.0);
                let residue_c = layer.residue_carbon * fraction;
                let residue_n = layer.residue_nitrogen * fraction;
                layer.residue_carbon -= residue_c;
                layer.residue_nitrogen -= residue_n;

                let humified_n = (residue_c * HUMIFICATION / p.carbon_to_nitrogen).min(residue_n);
                let humified_c = humified_n * p.carbon_to_nitrogen;
                let released_n = residue_n - humified_n;
                layer.organic_carbon += humified_c / layer.bulk_density;
                layer.nh4 += released_n;

                // Stable humus
                let stable_c = layer.organic_carbon * layer.bulk_density; // [kg C m-3]
                let humus_c = stable_c * (p.mineralisation_rate * f).min(1.0);
                let humus_n = humus_c / p.carbon_to_nitrogen;
                layer.organic_carbon -= humus_c / layer.bulk_density;
                layer.nh4 += humus_n;

                mineralised += (released_n + humus_n) * layer.thickness;
                released_c += (residue_c - humified_c + humus_c) * layer.thickness;
            }

            let nitrified = layer.nh4 * (p.nitrification_rate * f).min(1.0);
            layer.nh4 -= nitrified;
            layer.no3 += nitrified;
        }

        self.net_n_mineralisation = mineralised * 10000.0;
        self.decomposed_carbon = released_c * 10000.0;
    }

    fn add_organic_matter(
        &mut self,
        column: &mut SoilColumn,
        params: &OrganicMatterParameters,
        amount: f64,
        depth: f64,
    ) {
        let dry_matter = amount * params.dry_matter_content / 10000.0; // [kg DM m-2]
        let carbon = dry_matter * params.carbon_content;
        let nitrogen = dry_matter * params.n_concentration;
        let nh4 = nitrogen * params.nh4_fraction;
        let organic_n = nitrogen - nh4;

        let last = column.layer_index_for_depth(depth);
        let layers = &mut column.layers_mut()[..=last];
        let total_thickness: f64 = layers.iter().map(|l| l.thickness).sum();
        // Equal concentration in every receiving layer
        for layer in layers.iter_mut() {
            layer.residue_carbon += carbon / total_thickness;
            layer.residue_nitrogen += organic_n / total_thickness;
            layer.nh4 += nh4 / total_thickness;
        }
        debug!(
            "added {:.1} kg ha-1 of {} down to layer {}",
            amount, params.name, last
        );
    }

    fn net_n_mineralisation(&self) -> f64 {
        self.net_n_mineralisation
    }

    fn decomposed_carbon(&self) -> f64 {
        self.decomposed_carbon
    }
}
