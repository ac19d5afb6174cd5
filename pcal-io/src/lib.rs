//! Persisted forms of pinhole cameras

pub mod error;
pub mod properties;
pub mod record;

pub use error::{ConfigError, Result};
pub use properties::{camera_from_properties, camera_to_properties};
pub use record::{
    CURRENT_VERSION, PinholeRecord, camera_from_json, camera_to_json, load_camera, save_camera,
};
