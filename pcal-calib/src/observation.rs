//! Detected target corners in a single image

use crate::target::GridTarget;
use nalgebra::{Vector2, Vector3};
use std::sync::Arc;

/// One image of a grid target with a subset of corners detected.
pub trait GridObservation {
    /// Target geometry, if attached
    fn target(&self) -> Option<&dyn GridTarget>;

    /// Image width in pixels
    fn image_cols(&self) -> usize;

    /// Image height in pixels
    fn image_rows(&self) -> usize;

    /// Detected image point for a target index
    fn image_point(&self, index: usize) -> Option<Vector2<f64>>;

    fn image_grid_point(&self, row: usize, col: usize) -> Option<Vector2<f64>> {
        let target = self.target()?;
        if row >= target.rows() || col >= target.cols() {
            return None;
        }
        self.image_point(target.grid_index(row, col))
    }

    /// Target/image pairs for every detected corner, in index order.
    fn correspondences(&self) -> Vec<(Vector3<f64>, Vector2<f64>)> {
        let Some(target) = self.target() else {
            return Vec::new();
        };
        (0..target.size())
            .filter_map(|i| self.image_point(i).map(|p| (target.point(i), p)))
            .collect()
    }

    /// Detected corners, in index order
    fn corners_image_frame(&self) -> Vec<Vector2<f64>> {
        self.correspondences().into_iter().map(|(_, p)| p).collect()
    }

    /// Target points of the detected corners, in the same order as
    /// [`GridObservation::corners_image_frame`].
    fn corners_target_frame(&self) -> Vec<Vector3<f64>> {
        self.correspondences().into_iter().map(|(p, _)| p).collect()
    }
}

/// Shared handle to target geometry
pub type SharedTarget = Arc<dyn GridTarget + Send + Sync>;

/// Corner detections stored per target index.
#[derive(Clone)]
pub struct CornerObservation {
    target: Option<SharedTarget>,
    image_cols: usize,
    image_rows: usize,
    points: Vec<Option<Vector2<f64>>>,
}

impl CornerObservation {
    /// Empty observation of `target` in an image of the given size
    pub fn new(target: SharedTarget, image_cols: usize, image_rows: usize) -> Self {
        let size = target.size();
        Self {
            target: Some(target),
            image_cols,
            image_rows,
            points: vec![None; size],
        }
    }

    pub fn without_target(image_cols: usize, image_rows: usize) -> Self {
        Self {
            target: None,
            image_cols,
            image_rows,
            points: Vec::new(),
        }
    }

    /// Record a detection. Returns false when the index is outside the target.
    pub fn set_image_point(&mut self, index: usize, point: Vector2<f64>) -> bool {
        match self.points.get_mut(index) {
            Some(slot) => {
                *slot = Some(point);
                true
            }
            None => false,
        }
    }

    pub fn clear_image_point(&mut self, index: usize) {
        if let Some(slot) = self.points.get_mut(index) {
            *slot = None;
        }
    }

    /// Number of detected corners
    pub fn detected(&self) -> usize {
        self.points.iter().filter(|p| p.is_some()).count()
    }
}

impl std::fmt::Debug for CornerObservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CornerObservation")
            .field("has_target", &self.target.is_some())
            .field("image_cols", &self.image_cols)
            .field("image_rows", &self.image_rows)
            .field("detected", &self.detected())
            .finish()
    }
}

impl GridObservation for CornerObservation {
    fn target(&self) -> Option<&dyn GridTarget> {
        self.target.as_deref().map(|t| t as &dyn GridTarget)
    }

    fn image_cols(&self) -> usize {
        self.image_cols
    }

    fn image_rows(&self) -> usize {
        self.image_rows
    }

    fn image_point(&self, index: usize) -> Option<Vector2<f64>> {
        self.points.get(index).copied().flatten()
    }
}
