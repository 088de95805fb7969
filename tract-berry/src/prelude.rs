//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx3d, Point3, Vec3};

pub use crate::{Affine, GridAttr, MaskVolume, ScalarVolume, VoxelGrid};
pub use crate::{ConfigError, TrackError, TrackResult};

pub use crate::sphere::{default_sphere, Sphere};
pub use crate::peaks::{peak_directions, Peak, PeaksVolume};

pub use crate::direction::{
    Direction, DirectionField, PeakDirectionField, PmfDirectionField, PmfMode, PmfVolume,
};
pub use crate::stopping::{
    BinaryStoppingCriterion, FnStoppingCriterion, StoppingCriterion, ThresholdStoppingCriterion,
    TrackerStatus,
};
pub use crate::seeds::{random_seeds_from_mask, seeds_from_mask, seeds_from_mask_with, Density};
pub use crate::tracking::{LocalTracking, Streamline, Termination, TrackerConfig};
pub use crate::tractogram::Tractogram;

#[cfg(feature = "serde")]
pub use crate::tractogram::CompactTractogram;

pub use crate::consts::{DEFAULT_MAX_ANGLE, DEFAULT_MAX_STEPS, DEFAULT_STEP_SIZE};

pub use crate::dataset::home_dataset_dir_with;
pub use crate::dataset::{self, Subject};
