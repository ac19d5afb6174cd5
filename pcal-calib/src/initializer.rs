//! Focal length bootstrap from a single grid observation
//!
//! Every target row is imaged as a conic through the principal point frame
//! `c0 u + c1 v + c2 / 2 - c3 (u^2 + v^2) / 2 = 0`. For rows that are not
//! radial the coefficients fix the focal length, which is then scored by
//! estimating the target pose and measuring the reprojection error. The
//! candidate with the lowest mean error wins.

use crate::error::{InitializationError, Result};
use crate::homography::estimate_homography;
use crate::linalg::null_vector;
use crate::observation::GridObservation;
use crate::pose::{
    LinearPnpSolver, MIN_POSE_CORRESPONDENCES, PerspectiveSolver, estimate_transformation,
};
use crate::reprojection::reprojection_error;
use log::{debug, warn};
use nalgebra::{DMatrix, Vector2};
use pcal_core::geometry::Transformation;
use pcal_core::{Distortion, PinholeProjection};
use serde::{Deserialize, Serialize};

// Largest |z| for a target to count as lying on z = 0.
const PLANAR_TOLERANCE: f64 = 1e-9;

/// Tuning for [`IntrinsicsInitializer`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitializerConfig {
    /// A row needs strictly more detected corners than this, and a candidate
    /// strictly more reprojected points.
    pub min_corners: usize,
    /// Rows whose normalized line direction exceeds this norm are radial.
    pub max_radial_norm: f64,
    /// Try the plane homography when no row yields a candidate.
    pub homography_fallback: bool,
}

impl Default for InitializerConfig {
    fn default() -> Self {
        Self {
            min_corners: 3,
            max_radial_norm: 0.95,
            homography_fallback: true,
        }
    }
}

/// Where the winning focal length came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    Row(usize),
    Homography,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InitializationReport {
    pub focal_length: f64,
    pub mean_reprojection_error: f64,
    pub source: CandidateSource,
    /// Rows that produced a focal candidate and went on to pose scoring
    pub rows_evaluated: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum RowOutcome {
    TooFewCorners(usize),
    BadSolution,
    Radial(f64),
    Candidate(f64),
}

/// Focal length from the conic through one row's corners, given relative to
/// the principal point.
pub(crate) fn row_focal_candidate(
    centered: &[Vector2<f64>],
    config: &InitializerConfig,
) -> RowOutcome {
    let count = centered.len();
    if count <= config.min_corners {
        return RowOutcome::TooFewCorners(count);
    }

    let mut p = DMatrix::<f64>::zeros(count, 4);
    for (i, q) in centered.iter().enumerate() {
        p[(i, 0)] = q.x;
        p[(i, 1)] = q.y;
        p[(i, 2)] = 0.5;
        p[(i, 3)] = -0.5 * q.norm_squared();
    }
    let Ok(c) = null_vector(p) else {
        return RowOutcome::BadSolution;
    };

    let t = c[0] * c[0] + c[1] * c[1] + c[2] * c[3];
    // t == 0 leaves the direction undefined as well.
    if !(t > 0.0) {
        return RowOutcome::BadSolution;
    }

    let d = (1.0 / t).sqrt();
    let nx = c[0] * d;
    let ny = c[1] * d;
    let radial_norm = nx.hypot(ny);
    if radial_norm > config.max_radial_norm {
        return RowOutcome::Radial(radial_norm);
    }

    let nz = (1.0 - nx * nx - ny * ny).sqrt();
    let gamma = (c[2] * d / nz).abs();
    if !gamma.is_finite() || gamma <= 0.0 {
        return RowOutcome::BadSolution;
    }
    RowOutcome::Candidate(gamma)
}

/// Square-pixel focal length from the plane homography with the principal
/// point removed, using the orthogonality and equal-norm constraints on the
/// first two rotation columns of `K^-1 H`.
pub(crate) fn homography_focal_candidate<O>(observation: &O, cu: f64, cv: f64) -> Option<f64>
where
    O: GridObservation + ?Sized,
{
    let correspondences = observation.correspondences();
    if correspondences.len() < MIN_POSE_CORRESPONDENCES
        || correspondences.iter().any(|(p, _)| p.z.abs() > PLANAR_TOLERANCE)
    {
        return None;
    }

    let center = Vector2::new(cu, cv);
    let plane: Vec<_> = correspondences.iter().map(|(p, _)| p.xy()).collect();
    let image: Vec<_> = correspondences.iter().map(|(_, k)| k - center).collect();
    let h = estimate_homography(&plane, &image).ok()?;

    let (h11, h12, h21, h22) = (h[(0, 0)], h[(0, 1)], h[(1, 0)], h[(1, 1)]);
    let (h31, h32) = (h[(2, 0)], h[(2, 1)]);

    let a1 = h11 * h12 + h21 * h22;
    let b1 = -h31 * h32;
    let a2 = h11 * h11 + h21 * h21 - h12 * h12 - h22 * h22;
    let b2 = h32 * h32 - h31 * h31;

    let scale = h.fixed_view::<2, 2>(0, 0).norm_squared();
    let denominator = a1 * a1 + a2 * a2;
    // Fronto-parallel views leave the focal length unobservable.
    if denominator <= 1e-12 * scale * scale {
        return None;
    }
    let inverse_f2 = (a1 * b1 + a2 * b2) / denominator;
    if !(inverse_f2 > 0.0) {
        return None;
    }
    let focal = 1.0 / inverse_f2.sqrt();
    focal.is_finite().then_some(focal)
}

/// Initial pinhole intrinsics from one grid observation.
///
/// The principal point is fixed to the image center and distortion is
/// cleared. Candidates are scored on private copies of the camera; the
/// caller's camera is written once at the end.
#[derive(Debug, Clone, Default)]
pub struct IntrinsicsInitializer<S = LinearPnpSolver> {
    config: InitializerConfig,
    solver: S,
}

impl IntrinsicsInitializer {
    pub fn new(config: InitializerConfig) -> Self {
        Self::with_solver(config, LinearPnpSolver::default())
    }
}

impl<S: PerspectiveSolver> IntrinsicsInitializer<S> {
    pub fn with_solver(config: InitializerConfig, solver: S) -> Self {
        Self { config, solver }
    }

    pub fn config(&self) -> &InitializerConfig {
        &self.config
    }

    /// Initialize `camera` from the first of `observations`.
    ///
    /// On success both focal lengths hold the winning candidate. When no
    /// candidate survives they are set to zero and
    /// [`InitializationError::NoUsableCandidate`] is returned. Missing
    /// observations or target geometry leave `camera` untouched.
    pub fn initialize<D, O>(
        &self,
        camera: &mut PinholeProjection<D>,
        observations: &[O],
    ) -> std::result::Result<InitializationReport, InitializationError>
    where
        D: Distortion,
        O: GridObservation,
    {
        let Some(observation) = observations.first() else {
            warn!("No observation supplied for intrinsics initialization");
            return Err(InitializationError::NoObservations);
        };
        if observations.len() > 1 {
            debug!(
                "Pinhole initialization uses only one observation, ignoring {} more",
                observations.len() - 1
            );
        }
        let Some(target) = observation.target() else {
            warn!("The grid observation has no target object");
            return Err(InitializationError::MissingTarget);
        };

        let cu = (observation.image_cols() as f64 - 1.0) / 2.0;
        let cv = (observation.image_rows() as f64 - 1.0) / 2.0;
        let mut template = camera.clone();
        template.set_principal_point(cu, cv);
        template.set_resolution(observation.image_cols(), observation.image_rows());
        template.clear_distortion();

        let center = Vector2::new(cu, cv);
        let mut best: Option<InitializationReport> = None;
        let mut rows_evaluated = 0;

        for r in 0..target.rows() {
            let centered: Vec<_> = (0..target.cols())
                .filter_map(|c| observation.image_grid_point(r, c))
                .map(|p| p - center)
                .collect();

            let gamma = match row_focal_candidate(&centered, &self.config) {
                RowOutcome::Candidate(gamma) => gamma,
                RowOutcome::TooFewCorners(count) => {
                    debug!(
                        "Skipping row {r} because it only had {count} corners. Minimum: {}",
                        self.config.min_corners + 1
                    );
                    continue;
                }
                RowOutcome::BadSolution => {
                    debug!("Skipping a bad SVD solution on row {r}");
                    continue;
                }
                RowOutcome::Radial(norm) => {
                    debug!("Skipping a radial line on row {r} (direction norm {norm:.4})");
                    continue;
                }
            };

            rows_evaluated += 1;
            debug!("Testing a focal length estimate of {gamma} from row {r}");
            if let Some(mean) = self.score_candidate(&template, observation, gamma) {
                Self::consider(&mut best, gamma, mean, CandidateSource::Row(r));
            }
        }

        if best.is_none() && self.config.homography_fallback {
            match homography_focal_candidate(observation, cu, cv) {
                Some(gamma) => {
                    debug!("Testing a homography focal length estimate of {gamma}");
                    if let Some(mean) = self.score_candidate(&template, observation, gamma) {
                        Self::consider(&mut best, gamma, mean, CandidateSource::Homography);
                    }
                }
                None => debug!("Homography fallback produced no focal length"),
            }
        }

        let focal = best.map_or(0.0, |b| b.focal_length);
        template.set_focal_lengths(focal, focal);
        *camera = template;

        best.map(|report| InitializationReport {
            rows_evaluated,
            ..report
        })
        .ok_or(InitializationError::NoUsableCandidate)
    }

    /// [`initialize`](Self::initialize), then estimate the target pose under
    /// the new intrinsics. Returns the target-from-camera transform.
    pub fn initialize_with_pose<D, O>(
        &self,
        camera: &mut PinholeProjection<D>,
        observations: &[O],
    ) -> Result<(InitializationReport, Transformation)>
    where
        D: Distortion,
        O: GridObservation,
    {
        let report = self.initialize(camera, observations)?;
        let observation = observations
            .first()
            .ok_or(InitializationError::NoObservations)?;
        let target_from_camera = estimate_transformation(&*camera, observation, &self.solver)?;
        Ok((report, target_from_camera))
    }

        /// Mean reprojection error of `gamma`, or `None` when the pose estimate
    /// fails or too few points reproject.
    fn score_candidate<D, O>(
        &self,
        template: &PinholeProjection<D>,
        observation: &O,
        gamma: f64,
    ) -> Option<f64>
    where
        D: Distortion,
        O: GridObservation,
    {
        let mut candidate = template.clone();
        candidate.set_focal_lengths(gamma, gamma);

        let target_from_camera = match estimate_transformation(&candidate, observation, &self.solver)
        {
            Ok(transformation) => transformation,
            Err(err) => {
                debug!("Skipping focal length {gamma}: transformation estimation failed: {err}");
                return None;
            }
        };

        let error = reprojection_error(&candidate, observation, &target_from_camera);
        if error.count <= self.config.min_corners {
            debug!(
                "Skipping focal length {gamma}: only {} points reprojected",
                error.count
            );
            return None;
        }
        error.mean()
    }

    fn consider(
        best: &mut Option<InitializationReport>,
        gamma: f64,
        mean: f64,
        source: CandidateSource,
    ) {
        if best.is_none_or(|b| mean < b.mean_reprojection_error) {
            if let Some(previous) = best {
                debug!(
                    "{source:?} produced the new best estimate: {mean} < {}",
                    previous.mean_reprojection_error
                );
            }
            *best = Some(InitializationReport {
                focal_length: gamma,
                mean_reprojection_error: mean,
                source,
                rows_evaluated: 0,
            });
        }
    }
}
