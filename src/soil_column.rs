use crate::error::{Result, SimulationError};
use crate::params::MineralFertiliserParameters;
use serde::{Deserialize, Serialize};

/// One horizontal soil slice. Thickness and hydraulic constants are fixed for a run, the state fields
/// are written by the soil sub-models and by applied work steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoilLayer {
    pub thickness: f64, // [m]
    pub field_capacity: f64, // [m3 m-3]
    pub permanent_wilting_point: f64, // [m3 m-3]
    pub saturation: f64, // [m3 m-3]
    pub bulk_density: f64, // [kg m-3]
    pub moisture: f64, // [m3 m-3]
    pub temperature: f64, // [°C]
    pub no3: f64, // [kg N m-3]
    pub nh4: f64, // [kg N m-3]
    pub carbamid: f64, // [kg N m-3]
    pub organic_carbon: f64, // Stable soil organic carbon [kg C kg-1]
    pub residue_carbon: f64, // Fresh organic matter carbon [kg C m-3]
    pub residue_nitrogen: f64, // Fresh organic matter nitrogen [kg N m-3]
    pub soil_water_flux: f64, // Water entering the layer through its upper boundary [mm d-1], downward positive
}

impl SoilLayer {
    /// Creates a layer at field capacity with no mineral nitrogen.
    ///
    /// # Parameters
    ///
    /// - `thickness`: Layer thickness [m].
    /// - `field_capacity`: Volumetric water content at field capacity [m3 m-3].
    /// - `permanent_wilting_point`: Volumetric water content at wilting point [m3 m-3].
    /// - `saturation`: Volumetric water content at saturation [m3 m-3].
    /// - `organic_carbon`: Soil organic carbon [kg C kg-1].
    pub fn new(
        thickness: f64,
        field_capacity: f64,
        permanent_wilting_point: f64,
        saturation: f64,
        organic_carbon: f64,
    ) -> SoilLayer {
        SoilLayer {
            thickness,
            field_capacity,
            permanent_wilting_point,
            saturation,
            bulk_density: 1400.0,
            moisture: field_capacity,
            temperature: 10.0,
            no3: 0.0,
            nh4: 0.0,
            carbamid: 0.0,
            organic_carbon,
            residue_carbon: 0.0,
            residue_nitrogen: 0.0,
            soil_water_flux: 0.0,
        }
    }

    /// Water available to plants [mm].
    pub fn plant_available_water(&self) -> f64 {
        (self.moisture - self.permanent_wilting_point).max(0.0) * self.thickness * 1000.0
    }

    /// Plant available water at field capacity [mm].
    pub fn max_plant_available_water(&self) -> f64 {
        (self.field_capacity - self.permanent_wilting_point).max(0.0) * self.thickness * 1000.0
    }

    fn validate(&self, index: usize) -> Result<()> {
        let fail = |reason: &str| {
            Err(SimulationError::InvalidSoilLayer {
                index,
                reason: reason.to_string(),
            })
        };
        if !(self.thickness > 0.0) {
            return fail("thickness must be positive");
        }
        if !(0.0..=1.0).contains(&self.saturation) {
            return fail("saturation must lie within [0, 1]");
        }
        if !(self.permanent_wilting_point >= 0.0
            && self.permanent_wilting_point <= self.field_capacity
            && self.field_capacity <= self.saturation)
        {
            return fail("expected 0 <= wilting point <= field capacity <= saturation");
        }
        if !(self.moisture > 0.0 && self.moisture <= self.saturation) {
            return fail("moisture must lie within (0, saturation]");
        }
        if self.no3 < 0.0 || self.nh4 < 0.0 || self.carbamid < 0.0 {
            return fail("mineral nitrogen must not be negative");
        }
        Ok(())
    }
}

/// Ordered stack of soil layers, index 0 at the surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoilColumn {
    layers: Vec<SoilLayer>,
    pub flux_at_lower_boundary: f64, // Water leaving the bottom layer [mm d-1], downward positive
    pub surface_water_storage: f64, // Water waiting to infiltrate [mm]
    pub crop_n_uptake: f64, // Nitrogen taken up by the crop today [kg N m-2]
}

impl SoilColumn {
    /// Creates a validated soil column.
    ///
    /// Validates:
    /// - at least one layer
    /// - positive thickness, ordered water contents and moisture in `(0, saturation]` for every layer
    pub fn new(layers: Vec<SoilLayer>) -> Result<Self> {
        if layers.is_empty() {
            return Err(SimulationError::EmptySoilColumn);
        }
        for (index, layer) in layers.iter().enumerate() {
            layer.validate(index)?;
        }
        Ok(SoilColumn {
            layers,
            flux_at_lower_boundary: 0.0,
            surface_water_storage: 0.0,
            crop_n_uptake: 0.0,
        })
    }

    /// Creates `count` identical layers.
    pub fn uniform(count: usize, layer: SoilLayer) -> Result<Self> {
        SoilColumn::new(vec![layer; count])
    }

    pub fn layers(&self) -> &[SoilLayer] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [SoilLayer] {
        &mut self.layers
    }

    pub fn layer(&self, index: usize) -> &SoilLayer {
        &self.layers[index]
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Depth of the column's lower boundary [m].
    pub fn depth(&self) -> f64 {
        self.layers.iter().map(|l| l.thickness).sum()
    }

    /// Index of the layer that contains `depth` [m]. Depths below the column return the bottom layer.
    pub fn layer_index_for_depth(&self, depth: f64) -> usize {
        let mut accumulated = 0.0;
        for (i, layer) in self.layers.iter().enumerate() {
            accumulated += layer.thickness;
            if depth <= accumulated {
                return i;
            }
        }
        self.layers.len() - 1
    }

    /// Layers whose top lies above `depth`.
    fn layers_to_depth(&self, depth: f64) -> &[SoilLayer] {
        &self.layers[..=self.layer_index_for_depth(depth)]
    }

    /// Adds mineral fertiliser to the top layer.
    ///
    /// # Parameters
    ///
    /// - `params`: Fertiliser composition as fractions of its N.
    /// - `amount`: Nitrogen applied [kg N ha-1].
    pub fn apply_mineral_fertiliser(&mut self, params: &MineralFertiliserParameters, amount: f64) {
        let top = &mut self.layers[0];
        let per_volume = amount / 10000.0 / top.thickness; // [kg N ha-1 -> kg N m-3]
        top.no3 += per_volume * params.no3;
        top.nh4 += per_volume * params.nh4;
        top.carbamid += per_volume * params.carbamid;
    }

    /// Puts irrigation water on the surface and its nitrate into the top layer.
    ///
    /// # Parameters
    ///
    /// - `amount`: Irrigation water [mm].
    /// - `nitrate_concentration`: Nitrate N in the water [mg l-1].
    pub fn apply_irrigation(&mut self, amount: f64, nitrate_concentration: f64) {
        self.surface_water_storage += amount;
        let top = &mut self.layers[0];
        top.no3 += nitrate_concentration * amount / top.thickness / 1_000_000.0; // [kg m-3]
    }

    /// Mixes every layer down to and including the one containing `depth`.
    ///
    /// Moisture, temperature, mineral N, organic carbon and fresh organic matter are replaced by their
    /// mean over the mixed layers.
    pub fn apply_tillage(&mut self, depth: f64) {
        let count = self.layer_index_for_depth(depth) + 1;
        let mixed = &mut self.layers[..count];
        let n = count as f64;

        let mean = |f: fn(&SoilLayer) -> f64, layers: &[SoilLayer]| -> f64 {
            layers.iter().map(f).sum::<f64>() / n
        };
        let moisture = mean(|l| l.moisture, mixed);
        let temperature = mean(|l| l.temperature, mixed);
        let no3 = mean(|l| l.no3, mixed);
        let nh4 = mean(|l| l.nh4, mixed);
        let carbamid = mean(|l| l.carbamid, mixed);
        let organic_carbon = mean(|l| l.organic_carbon, mixed);
        let residue_carbon = mean(|l| l.residue_carbon, mixed);
        let residue_nitrogen = mean(|l| l.residue_nitrogen, mixed);

        for layer in mixed.iter_mut() {
            layer.moisture = moisture.min(layer.saturation);
            layer.temperature = temperature;
            layer.no3 = no3;
            layer.nh4 = nh4;
            layer.carbamid = carbamid;
            layer.organic_carbon = organic_carbon;
            layer.residue_carbon = residue_carbon;
            layer.residue_nitrogen = residue_nitrogen;
        }
    }

    /// Mean organic carbon of the layers down to `depth` [kg C kg-1].
    pub fn avg_corg(&self, depth: f64) -> f64 {
        let layers = self.layers_to_depth(depth);
        layers.iter().map(|l| l.organic_carbon).sum::<f64>() / layers.len() as f64
    }

    /// Mean volumetric water content of the layers down to `depth` [m3 m-3].
    pub fn mean_water_content(&self, depth: f64) -> f64 {
        let layers = self.layers_to_depth(depth);
        layers.iter().map(|l| l.moisture).sum::<f64>() / layers.len() as f64
    }

    /// Mean temperature of the layers down to `depth` [°C].
    pub fn avg_soil_temperature(&self, depth: f64) -> f64 {
        let layers = self.layers_to_depth(depth);
        layers.iter().map(|l| l.temperature).sum::<f64>() / layers.len() as f64
    }

    /// Mineral nitrogen (NO3 + NH4) down to `depth` [kg N ha-1].
    pub fn sum_nmin(&self, depth: f64) -> f64 {
        self.layers_to_depth(depth)
            .iter()
            .map(|l| (l.no3 + l.nh4) * l.thickness * 10000.0)
            .sum()
    }

    /// Nitrate nitrogen down to `depth` [kg N ha-1].
    pub fn sum_no3(&self, depth: f64) -> f64 {
        self.layers_to_depth(depth)
            .iter()
            .map(|l| l.no3 * l.thickness * 10000.0)
            .sum()
    }

    /// Nitrate of the whole column [kg N m-2].
    pub fn total_no3(&self) -> f64 {
        self.layers.iter().map(|l| l.no3 * l.thickness).sum()
    }

    /// Share of plant available water left in the layers down to `depth`.
    pub fn plant_available_water_fraction(&self, depth: f64) -> f64 {
        let layers = self.layers_to_depth(depth);
        let max: f64 = layers.iter().map(|l| l.max_plant_available_water()).sum();
        if max <= 0.0 {
            return 0.0;
        }
        layers.iter().map(|l| l.plant_available_water()).sum::<f64>() / max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn column() -> SoilColumn {
        SoilColumn::uniform(20, SoilLayer::new(0.1, 0.3, 0.1, 0.45, 0.01)).unwrap()
    }

    #[test]
    fn test_rejects_empty_column() {
        assert!(matches!(SoilColumn::new(vec![]), Err(SimulationError::EmptySoilColumn)));
    }

    #[test]
    // Should name the offending layer when water contents are out of order
    fn test_rejects_invalid_layer() {
        let good = SoilLayer::new(0.1, 0.3, 0.1, 0.45, 0.01);
        let bad = SoilLayer::new(0.1, 0.5, 0.1, 0.45, 0.01);
        let err = SoilColumn::new(vec![good, bad]).unwrap_err();
        assert!(matches!(err, SimulationError::InvalidSoilLayer { index: 1, .. }));

        let thin = SoilLayer::new(0.0, 0.3, 0.1, 0.45, 0.01);
        assert!(SoilColumn::new(vec![thin]).is_err());
    }

    #[test]
    fn test_layer_index_for_depth() {
        let c = column();
        assert_eq!(c.layer_index_for_depth(0.05), 0);
        assert_eq!(c.layer_index_for_depth(0.3), 2);
        assert_eq!(c.layer_index_for_depth(0.31), 3);
        assert_eq!(c.layer_index_for_depth(5.0), 19);
        assert_abs_diff_eq!(c.depth(), 2.0, epsilon = 1e-9);
    }

    #[test]
    // 100 kg N ha-1 of pure nitrate into a 10 cm top layer is 0.1 kg N m-3
    fn test_apply_mineral_fertiliser() {
        let mut c = column();
        let can = MineralFertiliserParameters::new("CAN", 0.0, 0.5, 0.5);
        c.apply_mineral_fertiliser(&can, 100.0);
        assert_abs_diff_eq!(c.layer(0).no3, 0.05, epsilon = 1e-12);
        assert_abs_diff_eq!(c.layer(0).nh4, 0.05, epsilon = 1e-12);
        assert_eq!(c.layer(1).no3, 0.0);
        assert_abs_diff_eq!(c.sum_nmin(0.3), 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_apply_irrigation() {
        let mut c = column();
        c.apply_irrigation(20.0, 50.0);
        assert_abs_diff_eq!(c.surface_water_storage, 20.0, epsilon = 1e-12);
        // 50 mg l-1 * 20 l m-2 = 1 g m-2 into 0.1 m
        assert_abs_diff_eq!(c.layer(0).no3, 0.01, epsilon = 1e-12);
    }

    #[test]
    // Tillage to 30 cm averages the first three layers and leaves deeper ones untouched
    fn test_apply_tillage() {
        let mut c = column();
        c.layers_mut()[0].no3 = 0.3;
        c.layers_mut()[0].moisture = 0.4;
        c.layers_mut()[3].no3 = 0.7;
        c.apply_tillage(0.3);
        for i in 0..3 {
            assert_abs_diff_eq!(c.layer(i).no3, 0.1, epsilon = 1e-12);
            assert_abs_diff_eq!(c.layer(i).moisture, (0.4 + 0.3 + 0.3) / 3.0, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(c.layer(3).no3, 0.7, epsilon = 1e-12);
    }

    #[test]
    fn test_aggregates() {
        let mut c = column();
        c.layers_mut()[0].organic_carbon = 0.02;
        assert_abs_diff_eq!(c.avg_corg(0.1), 0.02, epsilon = 1e-12);
        assert_abs_diff_eq!(c.avg_corg(0.3), 0.04 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(c.mean_water_content(0.9), 0.3, epsilon = 1e-12);
        assert_abs_diff_eq!(c.plant_available_water_fraction(0.3), 1.0, epsilon = 1e-12);
        c.layers_mut()[0].moisture = 0.1;
        assert_abs_diff_eq!(c.plant_available_water_fraction(0.3), 2.0 / 3.0, epsilon = 1e-12);
    }
}
