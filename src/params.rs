use crate::crop_coefficient::KcCurve;
use crate::error::{Result, SimulationError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Site description that does not change during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteParameters {
    pub latitude: f64, // [deg]
    pub n_deposition: f64, // Annual atmospheric N deposition [kg N ha-1 a-1]
    pub min_groundwater_depth: f64, // [m]
    pub max_groundwater_depth: f64, // [m]
    pub min_groundwater_depth_month: u32,
}

impl Default for SiteParameters {
    fn default() -> Self {
        SiteParameters {
            latitude: 52.5,
            n_deposition: 30.0,
            min_groundwater_depth: 18.0,
            max_groundwater_depth: 20.0,
            min_groundwater_depth_month: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomaticIrrigationParameters {
    pub amount: f64, // [mm]
    pub threshold: f64, // Fraction of field capacity in the top layers
    pub nitrate_concentration: f64, // [mg NO3-N l-1]
}

impl Default for AutomaticIrrigationParameters {
    fn default() -> Self {
        AutomaticIrrigationParameters {
            amount: 17.0,
            threshold: 0.35,
            nitrate_concentration: 0.0,
        }
    }
}

/// Run-wide switches and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentParameters {
    pub leaching_depth: f64, // Reference depth for N leaching [m]
    pub time_step: f64, // [d]
    pub atmospheric_co2: f64, // [ppm], 0 derives the value from the date
    pub use_secondary_yields: bool,
    pub use_automatic_irrigation: bool,
    pub automatic_irrigation: AutomaticIrrigationParameters,
}

impl Default for EnvironmentParameters {
    fn default() -> Self {
        EnvironmentParameters {
            leaching_depth: 1.6,
            time_step: 1.0,
            atmospheric_co2: 0.0,
            use_secondary_yields: true,
            use_automatic_irrigation: false,
            automatic_irrigation: AutomaticIrrigationParameters::default(),
        }
    }
}

/// Parameters of the nitrate convection-dispersion solver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SoilTransportParameters {
    pub dispersion_length: f64, // [m]
    pub ad: f64, // Tortuosity factor a for loess soils
    pub diffusion_coefficient_standard: f64, // [m2 d-1]
}

impl Default for SoilTransportParameters {
    fn default() -> Self {
        SoilTransportParameters {
            dispersion_length: 0.049,
            ad: 0.002,
            diffusion_coefficient_standard: 0.000214,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserCropParameters {
    pub minimum_available_n: f64, // N that stays in a layer regardless of crop demand [kg N m-2]
}

impl Default for UserCropParameters {
    fn default() -> Self {
        UserCropParameters {
            minimum_available_n: 0.000075,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SoilMoistureParameters {
    pub evaporation_depth: f64, // Depth that loses water to soil evaporation [m]
    pub evaporation_reduction: f64, // Evaporation as fraction of reference ET under bare soil
    pub drainage_coefficient: f64, // Fraction of water above field capacity that drains per day
}

impl Default for SoilMoistureParameters {
    fn default() -> Self {
        SoilMoistureParameters {
            evaporation_depth: 0.1,
            evaporation_reduction: 0.7,
            drainage_coefficient: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SoilTemperatureParameters {
    pub damping_depth: f64, // Depth at which daily amplitude falls to 1/e [m]
    pub relaxation: f64, // Daily approach of the surface layer towards air temperature [-]
}

impl Default for SoilTemperatureParameters {
    fn default() -> Self {
        SoilTemperatureParameters {
            damping_depth: 0.5,
            relaxation: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SoilOrganicParameters {
    pub mineralisation_rate: f64, // Organic N turnover at 20 °C and optimal moisture [d-1]
    pub nitrification_rate: f64, // NH4 to NO3 at 20 °C [d-1]
    pub hydrolysis_rate: f64, // Carbamid to NH4 [d-1]
    pub residue_turnover_rate: f64, // Fresh organic matter turnover [d-1]
    pub carbon_to_nitrogen: f64, // C:N ratio of stable soil organic matter
    pub organic_layers_depth: f64, // Organic processes are limited to this depth [m]
}

impl Default for SoilOrganicParameters {
    fn default() -> Self {
        SoilOrganicParameters {
            mineralisation_rate: 0.00004,
            nitrification_rate: 0.1,
            hydrolysis_rate: 0.5,
            residue_turnover_rate: 0.01,
            carbon_to_nitrogen: 10.0,
            organic_layers_depth: 0.3,
        }
    }
}

/// Read-only parameter bundle of a run.
///
/// Constructed once (usually from a TOML file) and shared behind an `Arc`, so several runs can read
/// it at the same time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParameters {
    pub site: SiteParameters,
    pub environment: EnvironmentParameters,
    pub soil_transport: SoilTransportParameters,
    pub crop: UserCropParameters,
    pub soil_moisture: SoilMoistureParameters,
    pub soil_temperature: SoilTemperatureParameters,
    pub soil_organic: SoilOrganicParameters,
}

impl SimulationParameters {
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }
}

/// Loads a parameter bundle from a TOML file. Missing sections and keys take their defaults.
pub fn load_parameters<P: AsRef<Path>>(path: P) -> Result<SimulationParameters> {
    let toml_str = fs::read_to_string(path)?;
    SimulationParameters::from_toml_str(&toml_str)
}

/// Composition of a mineral fertiliser as fractions of its N.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MineralFertiliserParameters {
    pub name: String,
    pub carbamid: f64,
    pub no3: f64,
    pub nh4: f64,
}

impl MineralFertiliserParameters {
    pub fn new(name: &str, carbamid: f64, no3: f64, nh4: f64) -> Self {
        MineralFertiliserParameters {
            name: name.to_string(),
            carbamid,
            no3,
            nh4,
        }
    }
}

/// Organic fertiliser or crop residue as seen by the organic matter sub-model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganicMatterParameters {
    pub name: String,
    pub dry_matter_content: f64, // [kg DM kg FM-1]
    pub carbon_content: f64, // [kg C kg DM-1]
    pub n_concentration: f64, // [kg N kg DM-1]
    pub nh4_fraction: f64, // Share of N that is immediately available as NH4
}

impl Default for OrganicMatterParameters {
    fn default() -> Self {
        OrganicMatterParameters {
            name: "crop residue".to_string(),
            dry_matter_content: 1.0,
            carbon_content: 0.45,
            n_concentration: 0.01,
            nh4_fraction: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IrrigationParameters {
    pub nitrate_concentration: f64, // [mg l-1]
    pub sulfate_concentration: f64, // [mg l-1]
}

/// Harvest a crop as soon as it is mature, or on a fixed day of year at the latest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutomaticHarvestParameters {
    pub latest_harvest_doy: u32,
}

/// Crop parameters used by the reference crop growth model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropParameters {
    pub name: String,
    pub base_temperature: f64, // [°C]
    pub kc_curve: KcCurve, // Crop coefficient over cumulative GDD
    pub maturity_gdd: f64, // [°C d]
    pub senescence_gdd: f64, // Crop dies beyond this sum [°C d]
    pub radiation_use_efficiency: f64, // [kg DM ha-1 per MJ m-2 intercepted]
    pub harvest_index: f64,
    pub primary_dry_matter_content: f64, // [kg DM kg FM-1]
    pub max_n_concentration: f64, // [kg N kg DM-1]
    pub root_share: f64, // Root biomass as fraction of total biomass
    pub max_rooting_depth: f64, // [m]
    pub max_crop_height: f64, // [m]
    pub residue: OrganicMatterParameters,
    pub automatic_harvest: Option<AutomaticHarvestParameters>,
}

// Crop entry as written in a catalogue file, stages given as GDD durations
#[derive(Debug, Serialize, Deserialize)]
struct CropEntry {
    base_temperature: f64,
    k_ini: f64,
    k_mid: f64,
    k_end: f64,
    growth_stages_gdd: Vec<f64>, // [initial, development, mid, late]
    senescence_gdd: Option<f64>,
    radiation_use_efficiency: f64,
    harvest_index: f64,
    primary_dry_matter_content: Option<f64>,
    max_n_concentration: f64,
    residue_n_concentration: Option<f64>,
    root_share: Option<f64>,
    max_rooting_depth: f64,
    height_m: f64,
    latest_harvest_doy: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CropCatalogueFile {
    crops: HashMap<String, CropEntry>,
}

/// Crop parameters by crop name.
#[derive(Debug, Clone, Default)]
pub struct CropCatalogue {
    crops: HashMap<String, CropParameters>,
}

impl CropCatalogue {
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let file: CropCatalogueFile = toml::from_str(toml_str)?;

        let mut crops = HashMap::new();
        for (name, entry) in file.crops {
            if entry.growth_stages_gdd.len() != 4 {
                return Err(SimulationError::InvalidCropParameters {
                    name,
                    reason: format!(
                        "needs four growth stage durations, got {}",
                        entry.growth_stages_gdd.len()
                    ),
                });
            }
            // Cumulative GDD at the end of each stage
            let stages = &entry.growth_stages_gdd;
            let initial = stages[0];
            let development = initial + stages[1];
            let mid = development + stages[2];
            let late = mid + stages[3];

            let params = CropParameters {
                name: name.clone(),
                base_temperature: entry.base_temperature,
                kc_curve: KcCurve::new(
                    (initial, entry.k_ini),
                    (development, entry.k_mid), // k_mid is reached at the end of development
                    (mid, entry.k_mid),
                    (late, entry.k_end),
                ),
                maturity_gdd: late,
                senescence_gdd: entry.senescence_gdd.unwrap_or(late * 1.2),
                radiation_use_efficiency: entry.radiation_use_efficiency,
                harvest_index: entry.harvest_index,
                primary_dry_matter_content: entry.primary_dry_matter_content.unwrap_or(0.86),
                max_n_concentration: entry.max_n_concentration,
                root_share: entry.root_share.unwrap_or(0.15),
                max_rooting_depth: entry.max_rooting_depth,
                max_crop_height: entry.height_m,
                residue: OrganicMatterParameters {
                    name: format!("{name} residue"),
                    n_concentration: entry.residue_n_concentration.unwrap_or(0.008),
                    ..OrganicMatterParameters::default()
                },
                automatic_harvest: entry
                    .latest_harvest_doy
                    .map(|latest_harvest_doy| AutomaticHarvestParameters { latest_harvest_doy }),
            };
            params
                .kc_curve
                .validate()
                .map_err(|reason| SimulationError::InvalidCropParameters {
                    name: name.clone(),
                    reason,
                })?;
            crops.insert(name, params);
        }

        Ok(CropCatalogue { crops })
    }

    pub fn insert(&mut self, params: CropParameters) {
        self.crops.insert(params.name.clone(), params);
    }

    pub fn get(&self, name: &str) -> Result<&CropParameters> {
        self.crops
            .get(name)
            .ok_or_else(|| SimulationError::UnknownCrop(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.crops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.crops.is_empty()
    }
}

/// Loads a crop catalogue from a TOML file with one `[crops.<name>]` table per crop.
pub fn load_crop_catalogue<P: AsRef<Path>>(path: P) -> Result<CropCatalogue> {
    let toml_str = fs::read_to_string(path)?;
    CropCatalogue::from_toml_str(&toml_str)
}
