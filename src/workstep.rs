use crate::crop::CropHandle;
use crate::date::Date;
use crate::model::SimulationModel;
use crate::params::{IrrigationParameters, MineralFertiliserParameters, OrganicMatterParameters};
use chrono::{Duration, NaiveDate};
use log::debug;

/// Split of a mineral fertiliser application into an immediate dose and a later top dressing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TopDressing {
    pub max_amount_now: f64, // [kg N ha-1]
    pub delay_days: i64,
}

/// The farm operations a cultivation method can schedule.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkStepKind {
    Seed {
        crop: CropHandle,
    },
    Harvest {
        crop: CropHandle,
    },
    Cutting {
        crop: CropHandle,
    },
    MineralFertiliserApplication {
        partition: MineralFertiliserParameters,
        amount: f64, // [kg N ha-1]
        top_dressing: Option<TopDressing>,
    },
    OrganicFertiliserApplication {
        params: OrganicMatterParameters,
        amount: f64, // [kg FM ha-1]
        incorporation: bool,
    },
    TillageApplication {
        depth: f64, // [m]
    },
    IrrigationApplication {
        amount: f64, // [mm]
        params: IrrigationParameters,
    },
}

/// Work step created while another one was applied, due on an absolute date.
#[derive(Debug, Clone, PartialEq)]
pub struct FollowerStep {
    pub date: NaiveDate,
    pub kind: WorkStepKind,
}

/// A dated farm operation.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkStep {
    date: Date,
    kind: WorkStepKind,
}

impl WorkStep {
    pub fn new(date: Date, kind: WorkStepKind) -> WorkStep {
        WorkStep { date, kind }
    }

    pub fn date(&self) -> Date {
        self.date
    }

    pub(crate) fn set_date(&mut self, date: Date) {
        self.date = date;
    }

    pub fn kind(&self) -> &WorkStepKind {
        &self.kind
    }

    pub fn name(&self) -> &'static str {
        match self.kind {
            WorkStepKind::Seed { .. } => "Seed",
            WorkStepKind::Harvest { .. } => "Harvest",
            WorkStepKind::Cutting { .. } => "Cutting",
            WorkStepKind::MineralFertiliserApplication { .. } => "MineralFertiliserApplication",
            WorkStepKind::OrganicFertiliserApplication { .. } => "OrganicFertiliserApplication",
            WorkStepKind::TillageApplication { .. } => "TillageApplication",
            WorkStepKind::IrrigationApplication { .. } => "IrrigationApplication",
        }
    }

    /// Applies the operation to the model.
    ///
    /// # Parameters
    ///
    /// - `today`: Current simulation date.
    /// - `model`: The model to act on.
    /// - `followers`: Receives work steps this one schedules for later days.
    pub fn apply(&self, today: NaiveDate, model: &mut SimulationModel, followers: &mut Vec<FollowerStep>) {
        debug!("{}: applying {}", today, self.name());
        match &self.kind {
            WorkStepKind::Seed { crop } => model.seed_crop(*crop),
            WorkStepKind::Harvest { crop } => {
                model.harvest_crop(*crop);
            }
            WorkStepKind::Cutting { crop } => {
                model.cut_crop(*crop);
            }
            WorkStepKind::MineralFertiliserApplication {
                partition,
                amount,
                top_dressing,
            } => match top_dressing {
                Some(td) if *amount > td.max_amount_now => {
                    model.apply_mineral_fertiliser(partition, td.max_amount_now);
                    followers.push(FollowerStep {
                        date: today + Duration::days(td.delay_days.max(1)),
                        kind: WorkStepKind::MineralFertiliserApplication {
                            partition: partition.clone(),
                            amount: amount - td.max_amount_now,
                            top_dressing: Some(*td),
                        },
                    });
                }
                _ => model.apply_mineral_fertiliser(partition, *amount),
            },
            WorkStepKind::OrganicFertiliserApplication {
                params,
                amount,
                incorporation,
            } => model.apply_organic_fertiliser(params, *amount, *incorporation),
            WorkStepKind::TillageApplication { depth } => model.apply_tillage(*depth),
            WorkStepKind::IrrigationApplication { amount, params } => {
                model.apply_irrigation(*amount, params)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crop::tests::maize_params;
    use crate::crop::{Crop, CropArena};
    use crate::model::tests::test_model;
    use approx::assert_abs_diff_eq;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2004, 5, 2).unwrap()
    }

    #[test]
    // An application above the immediate maximum is split into a follower
    fn test_top_dressing_schedules_follower() {
        let mut model = test_model(CropArena::new());
        let step = WorkStep::new(
            Date::from(today()),
            WorkStepKind::MineralFertiliserApplication {
                partition: MineralFertiliserParameters::new("AN", 0.0, 0.5, 0.5),
                amount: 120.0,
                top_dressing: Some(TopDressing {
                    max_amount_now: 80.0,
                    delay_days: 21,
                }),
            },
        );
        let mut followers = Vec::new();
        step.apply(today(), &mut model, &mut followers);

        assert_abs_diff_eq!(model.daily_sum_fertiliser(), 80.0, epsilon = 1e-12);
        assert_eq!(followers.len(), 1);
        assert_eq!(followers[0].date, NaiveDate::from_ymd_opt(2004, 5, 23).unwrap());
        match &followers[0].kind {
            WorkStepKind::MineralFertiliserApplication { amount, .. } => {
                assert_abs_diff_eq!(*amount, 40.0, epsilon = 1e-12)
            }
            other => panic!("unexpected follower {:?}", other),
        }
    }

    #[test]
    fn test_fertiliser_within_maximum_has_no_follower() {
        let mut model = test_model(CropArena::new());
        let step = WorkStep::new(
            Date::from(today()),
            WorkStepKind::MineralFertiliserApplication {
                partition: MineralFertiliserParameters::new("AN", 0.0, 0.5, 0.5),
                amount: 60.0,
                top_dressing: Some(TopDressing {
                    max_amount_now: 80.0,
                    delay_days: 21,
                }),
            },
        );
        let mut followers = Vec::new();
        step.apply(today(), &mut model, &mut followers);
        assert!(followers.is_empty());
        assert_abs_diff_eq!(model.sum_fertiliser(), 60.0, epsilon = 1e-12);
    }

    #[test]
    // Seed plants the crop, harvest clears it again
    fn test_seed_and_harvest() {
        let mut crops = CropArena::new();
        let maize = crops.add(Crop::new(maize_params(), Date::from(today()), None));
        let mut model = test_model(crops);
        let mut followers = Vec::new();

        WorkStep::new(Date::from(today()), WorkStepKind::Seed { crop: maize })
            .apply(today(), &mut model, &mut followers);
        assert_eq!(model.current_crop(), Some(maize));

        WorkStep::new(Date::from(today()), WorkStepKind::Harvest { crop: maize })
            .apply(today(), &mut model, &mut followers);
        assert_eq!(model.current_crop(), None);
        assert_eq!(model.crops().get(maize).accumulators().harvests, 1);
        assert!(followers.is_empty());
    }

    #[test]
    fn test_names() {
        let step = WorkStep::new(Date::from(today()), WorkStepKind::TillageApplication { depth: 0.3 });
        assert_eq!(step.name(), "TillageApplication");
    }
}
