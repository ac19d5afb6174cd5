use thiserror::Error;

/// Common errors across the camera model
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Distortion error: {0}")]
    Distortion(#[from] DistortionError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Numerical error: {0}")]
    Numerical(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DistortionError {
    #[error("Expected {expected} distortion parameters, got {got}")]
    ParameterCount { expected: usize, got: usize },

    #[error("Distortion Jacobian is singular")]
    SingularJacobian,

    #[error("Undistortion did not converge")]
    NonConvergent,
}

pub type Result<T> = std::result::Result<T, CameraError>;
