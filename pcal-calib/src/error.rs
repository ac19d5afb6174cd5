use thiserror::Error;

/// Errors raised while calibrating from grid observations
#[derive(Error, Debug)]
pub enum CalibError {
    #[error("Estimation error: {0}")]
    Estimation(#[from] EstimationError),

    #[error("Initialization error: {0}")]
    Initialization(#[from] InitializationError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EstimationError {
    #[error("Not enough correspondences: got {0}")]
    InsufficientCorrespondences(usize),

    #[error("Degenerate configuration: {0}")]
    Degenerate(String),

    #[error("Singular value decomposition failed")]
    SvdFailed,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InitializationError {
    #[error("No observations supplied")]
    NoObservations,

    #[error("Observation has no target geometry attached")]
    MissingTarget,

    #[error("No grid row produced a usable focal length candidate")]
    NoUsableCandidate,
}

pub type Result<T> = std::result::Result<T, CalibError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimation_error_display() {
        let err = EstimationError::InsufficientCorrespondences(3);
        assert_eq!(err.to_string(), "Not enough correspondences: got 3");

        let err = EstimationError::Degenerate("collinear points".to_string());
        assert_eq!(err.to_string(), "Degenerate configuration: collinear points");
    }

    #[test]
    fn test_initialization_error_display() {
        let err = InitializationError::MissingTarget;
        assert_eq!(err.to_string(), "Observation has no target geometry attached");
    }

    #[test]
    fn test_calib_error_from_variants() {
        let err: CalibError = EstimationError::SvdFailed.into();
        assert!(matches!(err, CalibError::Estimation(_)));
        assert_eq!(
            err.to_string(),
            "Estimation error: Singular value decomposition failed"
        );

        let err: CalibError = InitializationError::NoUsableCandidate.into();
        assert!(matches!(err, CalibError::Initialization(_)));
    }
}
