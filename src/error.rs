use thiserror::Error;

/// Errors that prevent a simulation run from being constructed.
///
/// Nothing inside a simulated day produces one of these; per-day anomalies are logged and absorbed.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("crop rotation is empty, nothing to simulate")]
    EmptyRotation,

    #[error("cultivation method '{name}' has no valid start date")]
    InvalidStartDate { name: String },

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("climate series is empty")]
    EmptyClimate,

    #[error("climate value '{field}' on day {day} is not a number")]
    InvalidClimate { day: usize, field: &'static str },

    #[error("soil column has no layers")]
    EmptySoilColumn,

    #[error("soil layer {index}: {reason}")]
    InvalidSoilLayer { index: usize, reason: String },

    #[error("cultivation method '{name}': crop has neither a harvest date nor an automatic harvest")]
    MissingHarvest { name: String },

    #[error("unknown crop '{0}'")]
    UnknownCrop(String),

    #[error("crop '{name}': {reason}")]
    InvalidCropParameters { name: String, reason: String },

    #[error("failed to read parameter file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse parameter file: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, SimulationError>;
