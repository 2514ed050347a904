mod climate;
mod crop;
mod crop_coefficient;
mod crop_growth;
mod cultivation_method;
mod date;
mod error;
mod gdd;
mod model;
mod params;
mod result;
mod rotation;
mod run;
mod soil_column;
mod soil_moisture;
mod soil_organic;
mod soil_temperature;
mod soil_transport;
mod workstep;

pub use climate::{co2_for_date, groundwater_depth_for_date, ClimateData, ClimateSeries};
pub use crop::{Crop, CropAccumulators, CropArena, CropHandle};
pub use crop_coefficient::KcCurve;
pub use crop_growth::{CropGrowth, CropGrowthFactory, DegreeDayCrop, DegreeDayCropFactory, StressFactors};
pub use cultivation_method::CultivationMethod;
pub use date::{Date, RELATIVE_YEAR_LIMIT};
pub use error::{Result, SimulationError};
pub use gdd::growing_degree_days;
pub use model::SimulationModel;
pub use params::load_crop_catalogue;
pub use params::load_parameters;
pub use params::{
    AutomaticHarvestParameters, AutomaticIrrigationParameters, CropCatalogue, CropParameters,
    EnvironmentParameters, IrrigationParameters, MineralFertiliserParameters, OrganicMatterParameters,
    SimulationParameters, SiteParameters, SoilMoistureParameters, SoilOrganicParameters,
    SoilTemperatureParameters, SoilTransportParameters, UserCropParameters,
};
pub use result::{DailyObserver, DailyRecord, DailySample, PvResult, ResultAccumulator, ResultId, SimulationResult};
pub use rotation::CropRotation;
pub use run::Simulation;
pub use soil_column::{SoilColumn, SoilLayer};
pub use soil_moisture::{reference_evapotranspiration, CascadingSoilMoisture, CropWaterDemand, SoilMoistureModule};
pub use soil_organic::{moisture_factor, temperature_factor, FirstOrderSoilOrganic, SoilOrganicModule};
pub use soil_temperature::{DampedSoilTemperature, SoilTemperatureModule};
pub use soil_transport::{time_step_factor_for_rate, SoilTransport};
pub use workstep::{FollowerStep, TopDressing, WorkStep, WorkStepKind};
