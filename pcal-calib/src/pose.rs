//! Target pose from grid observations
//!
//! [`estimate_transformation`] back-projects detections through the current
//! intrinsics and hands the normalized correspondences to a
//! [`PerspectiveSolver`].

use crate::error::EstimationError;
use crate::homography::estimate_homography;
use crate::linalg::{normalize_points_3d, null_vector};
use crate::observation::GridObservation;
use log::debug;
use nalgebra::{
    DMatrix, Isometry3, Matrix2x3, Matrix3, Matrix3x4, Matrix6, Point3, SMatrix, Vector2,
    Vector3, Vector6,
};
use pcal_core::geometry::{Transformation, rigid_transform};
use pcal_core::CameraModel;

/// Minimum number of correspondences passed on to a solver.
pub const MIN_POSE_CORRESPONDENCES: usize = 4;

const MIN_NON_PLANAR_CORRESPONDENCES: usize = 6;
const DEGENERACY_EPS: f64 = 1e-12;

/// Perspective-n-point solver on normalized image coordinates (identity
/// calibration).
pub trait PerspectiveSolver {
    /// Returns the transform taking target points into the camera frame.
    fn solve(
        &self,
        target_points: &[Vector3<f64>],
        normalized_points: &[Vector2<f64>],
    ) -> Result<Transformation, EstimationError>;
}

/// Linear PnP with Gauss-Newton refinement.
///
/// Planar targets, in any plane, go through a plane homography after being
/// moved onto `z = 0`. Anything else goes through a 6-point DLT.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearPnpSolver {
    pub refinement_iterations: usize,
    pub planarity_tolerance: f64,
}

impl Default for LinearPnpSolver {
    fn default() -> Self {
        Self {
            refinement_iterations: 10,
            planarity_tolerance: 1e-9,
        }
    }
}

impl LinearPnpSolver {
    /// Rigid transform taking a planar target onto `z = 0`, or `None` when
    /// the points span three dimensions.
    ///
    /// Planarity is judged by the RMS distance of the points from their best
    /// fit plane, relative to the target extent.
    fn plane_frame(&self, target_points: &[Vector3<f64>]) -> Option<Transformation> {
        let n = target_points.len() as f64;
        let centroid = target_points.iter().sum::<Vector3<f64>>() / n;
        let extent = target_points
            .iter()
            .map(|p| (p - centroid).norm())
            .fold(0.0_f64, f64::max);
        let tolerance = self.planarity_tolerance * (1.0 + extent);
        if target_points.iter().all(|p| p.z.abs() <= tolerance) {
            return Some(Transformation::identity());
        }

        let scatter = target_points.iter().fold(Matrix3::zeros(), |acc, p| {
            let d = p - centroid;
            acc + d * d.transpose()
        });
        let eigen = scatter.symmetric_eigen();
        let (min_index, min_value) = eigen
            .eigenvalues
            .iter()
            .copied()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(&b.1))?;
        let (max_index, _) = eigen
            .eigenvalues
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))?;
        if min_index == max_index || (min_value.max(0.0) / n).sqrt() > tolerance {
            return None;
        }

        let normal = eigen.eigenvectors.column(min_index).into_owned();
        let e1 = eigen.eigenvectors.column(max_index).into_owned();
        let e2 = normal.cross(&e1);
        let rotation = Matrix3::from_rows(&[e1.transpose(), e2.transpose(), normal.transpose()]);
        rigid_transform(&rotation, &(-(rotation * centroid)))
    }

    /// Pose of a `z = 0` target from the plane homography with `K = I`.
    fn solve_planar(
        &self,
        target_points: &[Vector3<f64>],
        normalized_points: &[Vector2<f64>],
    ) -> Result<Transformation, EstimationError> {
        let plane: Vec<Vector2<f64>> = target_points.iter().map(|p| p.xy()).collect();
        let h = estimate_homography(&plane, normalized_points)?;

        let h1 = h.column(0).into_owned();
        let h2 = h.column(1).into_owned();
        let h3 = h.column(2).into_owned();
        let denom = 0.5 * (h1.norm() + h2.norm());
        if denom <= DEGENERACY_EPS {
            return Err(EstimationError::Degenerate(
                "homography has vanishing rotation columns".to_string(),
            ));
        }

        let lambda = 1.0 / denom;
        let mut r1 = h1 * lambda;
        let mut r2 = h2 * lambda;
        let mut t = h3 * lambda;
        // Target in front of the camera.
        if t.z < 0.0 {
            r1 = -r1;
            r2 = -r2;
            t = -t;
        }
        let r3 = r1.cross(&r2);
        if r3.norm() <= DEGENERACY_EPS {
            return Err(EstimationError::Degenerate(
                "homography columns are parallel".to_string(),
            ));
        }

        let rotation = Matrix3::from_columns(&[r1, r2, r3]);
        rigid_transform(&rotation, &t).ok_or(EstimationError::SvdFailed)
    }

    /// Normalized DLT for `[R | t]` on general 3-D points.
    fn solve_dlt(
        &self,
        target_points: &[Vector3<f64>],
        normalized_points: &[Vector2<f64>],
    ) -> Result<Transformation, EstimationError> {
        let n = target_points.len();
        if n < MIN_NON_PLANAR_CORRESPONDENCES {
            return Err(EstimationError::InsufficientCorrespondences(n));
        }
        let (points_n, t_world) = normalize_points_3d(target_points).ok_or_else(|| {
            EstimationError::Degenerate("coincident target points".to_string())
        })?;

        let mut a = DMatrix::<f64>::zeros(2 * n, 12);
        for (i, (p, m)) in points_n.iter().zip(normalized_points).enumerate() {
            let r0 = 2 * i;
            let r1 = r0 + 1;
            for k in 0..3 {
                a[(r0, k)] = p[k];
                a[(r0, 8 + k)] = -m.x * p[k];
                a[(r1, 4 + k)] = p[k];
                a[(r1, 8 + k)] = -m.y * p[k];
            }
            a[(r0, 3)] = 1.0;
            a[(r0, 11)] = -m.x;
            a[(r1, 7)] = 1.0;
            a[(r1, 11)] = -m.y;
        }

        let solution = null_vector(a)?;
        let projection = Matrix3x4::from_row_slice(solution.as_slice()) * t_world;

        let m = projection.fixed_view::<3, 3>(0, 0).into_owned();
        let mut scale = (m.row(0).norm() + m.row(1).norm() + m.row(2).norm()) / 3.0;
        if scale <= DEGENERACY_EPS {
            return Err(EstimationError::Degenerate(
                "DLT solution has vanishing rotation block".to_string(),
            ));
        }
        if m.determinant() < 0.0 {
            scale = -scale;
        }

        let rotation = m / scale;
        let translation = projection.column(3).into_owned() / scale;
        rigid_transform(&rotation, &translation).ok_or(EstimationError::SvdFailed)
    }

    /// Gauss-Newton on normalized-plane residuals with a left-multiplied
    /// twist update. Steps that do not lower the cost are rejected.
    fn refine(
        &self,
        mut pose: Transformation,
        target_points: &[Vector3<f64>],
        normalized_points: &[Vector2<f64>],
    ) -> Transformation {
        let mut cost = residual_cost(&pose, target_points, normalized_points);
        for _ in 0..self.refinement_iterations {
            let mut jtj = Matrix6::<f64>::zeros();
            let mut jtr = Vector6::<f64>::zeros();
            for (p, m) in target_points.iter().zip(normalized_points) {
                let q = pose * Point3::from(*p);
                if q.z <= 0.0 {
                    continue;
                }
                let rz = 1.0 / q.z;
                let residual = Vector2::new(q.x * rz, q.y * rz) - m;
                let dproj = Matrix2x3::new(
                    rz,
                    0.0,
                    -q.x * rz * rz,
                    0.0,
                    rz,
                    -q.y * rz * rz,
                );
                let mut dq = SMatrix::<f64, 3, 6>::zeros();
                dq.fixed_view_mut::<3, 3>(0, 0)
                    .copy_from(&(-q.coords.cross_matrix()));
                dq.fixed_view_mut::<3, 3>(0, 3)
                    .copy_from(&Matrix3::identity());
                let j = dproj * dq;
                jtj += j.transpose() * j;
                jtr += j.transpose() * residual;
            }

            let Some(step) = jtj.cholesky().map(|c| -c.solve(&jtr)) else {
                break;
            };
            let omega = step.fixed_rows::<3>(0).into_owned();
            let v = step.fixed_rows::<3>(3).into_owned();
            let candidate = Isometry3::new(v, omega) * pose;
            let candidate_cost = residual_cost(&candidate, target_points, normalized_points);
            if !candidate_cost.is_finite() || candidate_cost >= cost {
                break;
            }
            pose = candidate;
            cost = candidate_cost;
            if step.norm() < DEGENERACY_EPS {
                break;
            }
        }
        pose
    }
}

fn residual_cost(
    pose: &Transformation,
    target_points: &[Vector3<f64>],
    normalized_points: &[Vector2<f64>],
) -> f64 {
    target_points
        .iter()
        .zip(normalized_points)
        .map(|(p, m)| {
            let q = pose * Point3::from(*p);
            if q.z <= 0.0 {
                return f64::INFINITY;
            }
            (q.coords.xy() / q.z - m).norm_squared()
        })
        .sum()
}

impl PerspectiveSolver for LinearPnpSolver {
    fn solve(
        &self,
        target_points: &[Vector3<f64>],
        normalized_points: &[Vector2<f64>],
    ) -> Result<Transformation, EstimationError> {
        let n = target_points.len().min(normalized_points.len());
        if n < MIN_POSE_CORRESPONDENCES || target_points.len() != normalized_points.len() {
            return Err(EstimationError::InsufficientCorrespondences(n));
        }

        let initial = match self.plane_frame(target_points) {
            Some(plane_from_target) => {
                let plane_points: Vec<_> = target_points
                    .iter()
                    .map(|p| (plane_from_target * Point3::from(*p)).coords)
                    .collect();
                self.solve_planar(&plane_points, normalized_points)? * plane_from_target
            }
            None => self.solve_dlt(target_points, normalized_points)?,
        };
        Ok(self.refine(initial, target_points, normalized_points))
    }
}

/// Estimate the transform taking camera-frame points into the target frame.
///
/// Detections that fail to back-project, or back-project behind the camera,
/// are dropped. At least [`MIN_POSE_CORRESPONDENCES`] must survive.
pub fn estimate_transformation<C, O, S>(
    camera: &C,
    observation: &O,
    solver: &S,
) -> Result<Transformation, EstimationError>
where
    C: CameraModel + ?Sized,
    O: GridObservation + ?Sized,
    S: PerspectiveSolver + ?Sized,
{
    let mut target_points = Vec::new();
    let mut normalized_points = Vec::new();
    for (i, (target_point, image_point)) in observation.correspondences().into_iter().enumerate() {
        match camera.unproject(&image_point) {
            Some(ray) if ray.z > 0.0 => {
                target_points.push(target_point);
                normalized_points.push(ray.xy() / ray.z);
            }
            ray => debug!(
                "Skipping corner {i} at {:?}: back-projection {:?}",
                image_point, ray
            ),
        }
    }

    if target_points.len() < MIN_POSE_CORRESPONDENCES {
        debug!(
            "At least {MIN_POSE_CORRESPONDENCES} points are needed for pose estimation, found {}",
            target_points.len()
        );
        return Err(EstimationError::InsufficientCorrespondences(
            target_points.len(),
        ));
    }

    debug!(
        "Solving for pose with {} target points and {} image points",
        target_points.len(),
        normalized_points.len()
    );
    let camera_from_target = solver.solve(&target_points, &normalized_points)?;
    Ok(camera_from_target.inverse())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::CornerObservation;
    use crate::target::{Checkerboard, GridTarget};
    use approx::assert_relative_eq;
    use nalgebra::{Translation3, UnitQuaternion};
    use pcal_core::PinholeProjection;
    use std::sync::Arc;

    fn ground_truth() -> Transformation {
        Isometry3::from_parts(
            Translation3::new(-0.1, -0.05, 0.8),
            UnitQuaternion::from_euler_angles(0.2, -0.15, 0.05),
        )
    }

    fn project_all(points: &[Vector3<f64>], pose: &Transformation) -> Vec<Vector2<f64>> {
        points
            .iter()
            .map(|p| {
                let q = pose * Point3::from(*p);
                q.coords.xy() / q.z
            })
            .collect()
    }

    fn assert_pose_near(a: &Transformation, b: &Transformation, tol: f64) {
        assert_relative_eq!(a.translation.vector, b.translation.vector, epsilon = tol);
        assert!(a.rotation.angle_to(&b.rotation) < tol);
    }

    #[test]
    fn test_planar_pose() {
        let board = Checkerboard::square(5, 6, 0.04);
        let points: Vec<_> = (0..board.size()).map(|i| board.point(i)).collect();
        let truth = ground_truth();
        let normalized = project_all(&points, &truth);

        let pose = LinearPnpSolver::default().solve(&points, &normalized).unwrap();
        assert_pose_near(&pose, &truth, 1e-8);
    }

    #[test]
    fn test_non_planar_pose() {
        let mut points = Vec::new();
        for z in 0..2 {
            for y in 0..3 {
                for x in 0..4 {
                    points.push(Vector3::new(x as f64 * 0.1, y as f64 * 0.1, 0.5 + z as f64 * 0.1));
                }
            }
        }
        let truth = ground_truth();
        let normalized = project_all(&points, &truth);

        let pose = LinearPnpSolver::default().solve(&points, &normalized).unwrap();
        assert_pose_near(&pose, &truth, 1e-8);
    }

    fn plane_x0_points() -> Vec<Vector3<f64>> {
        let mut points = Vec::new();
        for i in 0..5 {
            for j in 0..6 {
                points.push(Vector3::new(0.0, j as f64 * 0.04, i as f64 * 0.04));
            }
        }
        points
    }

    #[test]
    fn test_planar_pose_off_the_xy_plane() {
        let points = plane_x0_points();
        let truth = Isometry3::from_parts(
            Translation3::new(-0.1, -0.05, 0.8),
            UnitQuaternion::from_euler_angles(0.2, -1.3, 0.05),
        );
        let normalized = project_all(&points, &truth);

        let pose = LinearPnpSolver::default().solve(&points, &normalized).unwrap();
        assert_pose_near(&pose, &truth, 1e-8);
    }

    #[test]
    fn test_planar_pose_on_offset_plane() {
        let board = Checkerboard::square(5, 6, 0.04);
        let points: Vec<_> = (0..board.size())
            .map(|i| board.point(i) + Vector3::new(0.0, 0.0, 0.1))
            .collect();
        let truth = ground_truth();
        let normalized = project_all(&points, &truth);

        let pose = LinearPnpSolver::default().solve(&points, &normalized).unwrap();
        assert_pose_near(&pose, &truth, 1e-8);
    }

    #[test]
    fn test_plane_frame_maps_target_onto_xy_plane() {
        let solver = LinearPnpSolver::default();
        let points = plane_x0_points();
        let plane_from_target = solver.plane_frame(&points).unwrap();
        for p in &points {
            assert!((plane_from_target * Point3::from(*p)).z.abs() < 1e-12);
        }

        let mut cube = points.clone();
        cube.push(Vector3::new(0.1, 0.0, 0.0));
        assert!(solver.plane_frame(&cube).is_none());
    }

    #[test]
    fn test_refinement_reduces_noise_free_offset() {
        let board = Checkerboard::square(4, 4, 0.05);
        let points: Vec<_> = (0..board.size()).map(|i| board.point(i)).collect();
        let truth = ground_truth();
        let normalized = project_all(&points, &truth);

        let solver = LinearPnpSolver::default();
        let perturbed = Isometry3::new(Vector3::new(0.01, -0.01, 0.02), Vector3::new(0.01, 0.0, -0.01))
            * truth;
        let refined = solver.refine(perturbed, &points, &normalized);
        assert!(
            residual_cost(&refined, &points, &normalized)
                < 1e-6 * residual_cost(&perturbed, &points, &normalized)
        );
    }

    #[test]
    fn test_solver_rejects_too_few_points() {
        let points = vec![Vector3::zeros(); 3];
        let normalized = vec![Vector2::zeros(); 3];
        assert_eq!(
            LinearPnpSolver::default().solve(&points, &normalized),
            Err(EstimationError::InsufficientCorrespondences(3))
        );

        // Non-planar input needs six.
        let points: Vec<_> = (0..5)
            .map(|i| Vector3::new(i as f64, (i * i) as f64, (i * i * i) as f64))
            .collect();
        let normalized = vec![Vector2::zeros(); 5];
        assert_eq!(
            LinearPnpSolver::default().solve(&points, &normalized),
            Err(EstimationError::InsufficientCorrespondences(5))
        );
    }

    #[test]
    fn test_estimate_transformation_inverts_solver_output() {
        let board = Arc::new(Checkerboard::square(5, 6, 0.04));
        let camera = PinholeProjection::new_ideal(640, 480, 400.0, 400.0, 319.5, 239.5);
        let truth = ground_truth();

        let mut obs = CornerObservation::new(board.clone(), 640, 480);
        for i in 0..board.size() {
            if let Some(k) = camera.project(&(truth * Point3::from(board.point(i))).coords) {
                obs.set_image_point(i, k);
            }
        }

        let target_from_camera =
            estimate_transformation(&camera, &obs, &LinearPnpSolver::default()).unwrap();
        assert_pose_near(&target_from_camera, &truth.inverse(), 1e-6);
    }

    #[test]
    fn test_estimate_transformation_needs_four_points() {
        let board = Arc::new(Checkerboard::square(2, 2, 0.04));
        let camera = PinholeProjection::new_ideal(640, 480, 400.0, 400.0, 319.5, 239.5);
        let mut obs = CornerObservation::new(board, 640, 480);
        obs.set_image_point(0, Vector2::new(100.0, 100.0));
        obs.set_image_point(1, Vector2::new(200.0, 100.0));
        obs.set_image_point(2, Vector2::new(100.0, 200.0));
        // Outside the image, dropped.
        obs.set_image_point(3, Vector2::new(-5.0, 200.0));

        assert_eq!(
            estimate_transformation(&camera, &obs, &LinearPnpSolver::default()),
            Err(EstimationError::InsufficientCorrespondences(3))
        );
    }
}
