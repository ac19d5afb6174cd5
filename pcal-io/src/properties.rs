//! Flat key/value form of a pinhole camera
//!
//! Keys are `fu`, `fv`, `cu`, `cv`, `ru`, `rv`, an optional `version`, and
//! one `distortion.<name>` entry per distortion coefficient.

use crate::error::{ConfigError, Result};
use crate::record::{CURRENT_VERSION, check_version};
use nalgebra::DVector;
use pcal_core::{Distortion, PinholeProjection};
use std::collections::HashMap;
use std::str::FromStr;

const DISTORTION_PREFIX: &str = "distortion";

fn parse_single<T: FromStr>(properties: &HashMap<String, String>, key: &str) -> Result<T> {
    let value = properties
        .get(key)
        .ok_or_else(|| ConfigError::MissingKey(key.to_string()))?;

    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.clone(),
    })
}

pub fn camera_from_properties<D>(properties: &HashMap<String, String>) -> Result<PinholeProjection<D>>
where
    D: Distortion + Default,
{
    if properties.contains_key("version") {
        check_version(parse_single(properties, "version")?)?;
    }

    let mut distortion = D::default();
    let coefficients = distortion
        .parameter_names()
        .iter()
        .map(|name| parse_single(properties, &format!("{DISTORTION_PREFIX}.{name}")))
        .collect::<Result<Vec<f64>>>()?;
    distortion.set_parameters(&DVector::from_vec(coefficients))?;

    Ok(PinholeProjection::new(
        parse_single(properties, "ru")?,
        parse_single(properties, "rv")?,
        parse_single(properties, "fu")?,
        parse_single(properties, "fv")?,
        parse_single(properties, "cu")?,
        parse_single(properties, "cv")?,
        distortion,
    ))
}

pub fn camera_to_properties<D: Distortion>(camera: &PinholeProjection<D>) -> HashMap<String, String> {
    let mut properties = HashMap::from([
        ("version".to_string(), CURRENT_VERSION.to_string()),
        ("fu".to_string(), camera.fu().to_string()),
        ("fv".to_string(), camera.fv().to_string()),
        ("cu".to_string(), camera.cu().to_string()),
        ("cv".to_string(), camera.cv().to_string()),
        ("ru".to_string(), camera.width().to_string()),
        ("rv".to_string(), camera.height().to_string()),
    ]);

    let distortion = camera.distortion();
    for (name, value) in distortion
        .parameter_names()
        .iter()
        .zip(distortion.parameters().iter())
    {
        properties.insert(format!("{DISTORTION_PREFIX}.{name}"), value.to_string());
    }
    properties
}
