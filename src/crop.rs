use crate::date::Date;
use crate::params::CropParameters;

/// Stable index of a crop inside a [`CropArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CropHandle(usize);

impl CropHandle {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Results a crop collects over one lifecycle. Harvest and Cutting write yields, the daily loop writes
/// the crop-period sums.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CropAccumulators {
    pub primary_yield: f64, // [kg DM ha-1]
    pub secondary_yield: f64, // [kg DM ha-1]
    pub primary_yield_fresh: f64, // [kg FM ha-1]
    pub secondary_yield_fresh: f64, // [kg FM ha-1]
    pub primary_yield_n: f64, // [kg N ha-1]
    pub aboveground_biomass_n: f64, // [kg N ha-1]
    pub total_n_uptake: f64, // [kg N ha-1]
    pub crop_height: f64, // At the last harvest or cut [m]
    pub evapotranspiration: f64, // [mm]
    pub irrigation: f64, // [mm]
    pub days_with_crop: u32,
    pub water_stress: f64, // Sum of daily (1 - factor)
    pub n_stress: f64,
    pub heat_stress: f64,
    pub oxygen_stress: f64,
    pub harvests: u32, // Harvests and cuts written
}

/// A crop instance of a cultivation method: what is grown, when it is sown and harvested, and what it
/// yielded in the current lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Crop {
    params: CropParameters,
    seed_date: Date,
    harvest_date: Option<Date>,
    cutting_dates: Vec<Date>,
    accumulators: CropAccumulators,
}

impl Crop {
    /// Creates a crop.
    ///
    /// # Parameters
    ///
    /// - `params`: Crop parameters, usually taken from a `CropCatalogue`.
    /// - `seed_date`: Sowing date.
    /// - `harvest_date`: Scheduled harvest, `None` to rely on the automatic harvest, which then ends the
    ///   lifecycle on its latest harvest day at the latest.
    pub fn new(params: CropParameters, seed_date: Date, harvest_date: Option<Date>) -> Crop {
        Crop {
            params,
            seed_date,
            harvest_date,
            cutting_dates: Vec::new(),
            accumulators: CropAccumulators::default(),
        }
    }

    pub fn with_cutting_dates(mut self, cutting_dates: Vec<Date>) -> Crop {
        self.cutting_dates = cutting_dates;
        self
    }

    pub fn name(&self) -> &str {
        &self.params.name
    }

    pub fn params(&self) -> &CropParameters {
        &self.params
    }

    pub fn seed_date(&self) -> Date {
        self.seed_date
    }

    pub fn set_seed_date(&mut self, date: Date) {
        self.seed_date = date;
    }

    pub fn harvest_date(&self) -> Option<Date> {
        self.harvest_date
    }

    pub fn set_harvest_date(&mut self, date: Option<Date>) {
        self.harvest_date = date;
    }

    pub fn cutting_dates(&self) -> &[Date] {
        &self.cutting_dates
    }

    pub fn accumulators(&self) -> &CropAccumulators {
        &self.accumulators
    }

    pub(crate) fn accumulators_mut(&mut self) -> &mut CropAccumulators {
        &mut self.accumulators
    }

    /// Zeroes every accumulator for the next lifecycle.
    pub fn reset(&mut self) {
        self.accumulators = CropAccumulators::default();
    }
}

/// Owner of every crop of a run. Work steps and cultivation methods refer to crops by handle.
#[derive(Debug, Clone, Default)]
pub struct CropArena {
    crops: Vec<Crop>,
}

impl CropArena {
    pub fn new() -> CropArena {
        CropArena::default()
    }

    pub fn add(&mut self, crop: Crop) -> CropHandle {
        self.crops.push(crop);
        CropHandle(self.crops.len() - 1)
    }

    /// Handles are only created by `add`, so lookups cannot miss.
    pub fn get(&self, handle: CropHandle) -> &Crop {
        &self.crops[handle.0]
    }

    pub fn get_mut(&mut self, handle: CropHandle) -> &mut Crop {
        &mut self.crops[handle.0]
    }

    pub fn len(&self) -> usize {
        self.crops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.crops.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CropHandle, &Crop)> {
        self.crops.iter().enumerate().map(|(i, c)| (CropHandle(i), c))
    }
}
