//! Intrinsics bootstrapping for pinhole cameras from grid target observations

pub mod error;
pub mod homography;
pub mod initializer;
mod linalg;
pub mod observation;
pub mod pose;
pub mod reprojection;
pub mod target;

pub use error::{CalibError, EstimationError, InitializationError, Result};
pub use homography::{apply_homography, estimate_homography};
pub use initializer::{
    CandidateSource, InitializationReport, InitializerConfig, IntrinsicsInitializer,
};
pub use observation::{CornerObservation, GridObservation, SharedTarget};
pub use pose::{LinearPnpSolver, PerspectiveSolver, estimate_transformation};
pub use reprojection::{ReprojectionError, reprojection_error};
pub use target::{Checkerboard, GridTarget};
