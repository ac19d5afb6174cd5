//! Versioned JSON record of a pinhole camera

use crate::error::{ConfigError, Result};
use pcal_core::{Distortion, PinholeProjection};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Newest record layout this crate reads and the one it writes.
pub const CURRENT_VERSION: u32 = 1;

/// Persisted intrinsics, resolution and distortion coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinholeRecord<D> {
    pub version: u32,
    pub fu: f64,
    pub fv: f64,
    pub cu: f64,
    pub cv: f64,
    pub ru: usize,
    pub rv: usize,
    pub distortion: D,
}

#[derive(Deserialize)]
struct VersionTag {
    version: u32,
}

pub(crate) fn check_version(found: u32) -> Result<()> {
    if found > CURRENT_VERSION {
        return Err(ConfigError::UnsupportedVersion {
            found,
            supported: CURRENT_VERSION,
        });
    }
    Ok(())
}

impl<D: Distortion> PinholeRecord<D> {
    pub fn from_camera(camera: &PinholeProjection<D>) -> Self {
        Self {
            version: CURRENT_VERSION,
            fu: camera.fu(),
            fv: camera.fv(),
            cu: camera.cu(),
            cv: camera.cv(),
            ru: camera.width(),
            rv: camera.height(),
            distortion: camera.distortion().clone(),
        }
    }

    pub fn into_camera(self) -> Result<PinholeProjection<D>> {
        check_version(self.version)?;
        Ok(PinholeProjection::new(
            self.ru,
            self.rv,
            self.fu,
            self.fv,
            self.cu,
            self.cv,
            self.distortion,
        ))
    }
}

pub fn camera_to_json<D>(camera: &PinholeProjection<D>) -> Result<String>
where
    D: Distortion + Serialize,
{
    Ok(serde_json::to_string_pretty(&PinholeRecord::from_camera(camera))?)
}

/// Parse a camera record. The version is checked before the remaining
/// fields, so records from newer layouts fail with
/// [`ConfigError::UnsupportedVersion`].
pub fn camera_from_json<D>(json: &str) -> Result<PinholeProjection<D>>
where
    D: Distortion + DeserializeOwned,
{
    let tag: VersionTag = serde_json::from_str(json)?;
    check_version(tag.version)?;
    let record: PinholeRecord<D> = serde_json::from_str(json)?;
    record.into_camera()
}

pub fn save_camera<D, P>(camera: &PinholeProjection<D>, path: P) -> Result<()>
where
    D: Distortion + Serialize,
    P: AsRef<Path>,
{
    std::fs::write(path, camera_to_json(camera)?)?;
    Ok(())
}

pub fn load_camera<D, P>(path: P) -> Result<PinholeProjection<D>>
where
    D: Distortion + DeserializeOwned,
    P: AsRef<Path>,
{
    let json = std::fs::read_to_string(path)?;
    camera_from_json(&json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcal_core::{EquidistantDistortion, NoDistortion, RadialTangentialDistortion};

    #[test]
    fn test_json_round_trip() {
        let camera = PinholeProjection::<RadialTangentialDistortion>::test_projection();
        let json = camera_to_json(&camera).unwrap();
        let loaded: PinholeProjection<RadialTangentialDistortion> =
            camera_from_json(&json).unwrap();
        assert!(loaded.is_binary_equal(&camera));
    }

    #[test]
    fn test_json_layout() {
        let camera = PinholeProjection::new_ideal(640, 480, 400.0, 410.0, 319.5, 239.5);
        let value: serde_json::Value =
            serde_json::from_str(&camera_to_json(&camera).unwrap()).unwrap();
        assert_eq!(value["version"], CURRENT_VERSION);
        assert_eq!(value["fv"], 410.0);
        assert_eq!(value["ru"], 640);
        assert!(value["distortion"].is_null());
    }

    #[test]
    fn test_rejects_newer_version() {
        // Unknown fields of a future layout must not mask the version error.
        let json = r#"{ "version": 2, "model": "future" }"#;
        let err = camera_from_json::<NoDistortion>(json).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnsupportedVersion {
                found: 2,
                supported: 1
            }
        ));

        let record = PinholeRecord {
            version: 7,
            ..PinholeRecord::from_camera(&PinholeProjection::<NoDistortion>::test_projection())
        };
        assert!(matches!(
            record.into_camera(),
            Err(ConfigError::UnsupportedVersion { found: 7, .. })
        ));
    }

    #[test]
    fn test_missing_field_is_json_error() {
        let json = r#"{ "version": 1, "fu": 400.0 }"#;
        assert!(matches!(
            camera_from_json::<NoDistortion>(json),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camera.json");
        let camera = PinholeProjection::<EquidistantDistortion>::test_projection();

        save_camera(&camera, &path).unwrap();
        let loaded: PinholeProjection<EquidistantDistortion> = load_camera(&path).unwrap();
        assert!(loaded.is_binary_equal(&camera));

        let missing = load_camera::<EquidistantDistortion, _>(dir.path().join("absent.json"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }
}
