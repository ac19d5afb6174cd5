use nalgebra::Vector2;

// Tangency threshold on the half-chord length.
const TOUCH_TOLERANCE: f64 = 1e-10;

/// Intersection points of two circles: none when they are disjoint or one
/// contains the other, one when they touch, two otherwise.
pub fn intersect_circles(
    c1: &Vector2<f64>,
    r1: f64,
    c2: &Vector2<f64>,
    r2: f64,
) -> Vec<Vector2<f64>> {
    let delta = c2 - c1;
    let d = delta.norm();
    if d > r1 + r2 || d < (r1 - r2).abs() || d == 0.0 {
        return Vec::new();
    }

    let a = (r1 * r1 - r2 * r2 + d * d) / (2.0 * d);
    let h = (r1 * r1 - a * a).max(0.0).sqrt();
    let base = c1 + delta * (a / d);
    if h < TOUCH_TOLERANCE {
        return vec![base];
    }

    let offset = Vector2::new(delta.y, -delta.x) * (h / d);
    vec![base + offset, base - offset]
}

/// Modified least-squares circle fit (Umbach and Jones, 2000).
///
/// Returns `None` for fewer than three points or collinear input.
pub fn fit_circle(points: &[Vector2<f64>]) -> Option<(Vector2<f64>, f64)> {
    if points.len() < 3 {
        return None;
    }
    let n = points.len() as f64;

    let (mut sx, mut sy, mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0, 0.0, 0.0);
    let (mut sxxx, mut sxxy, mut sxyy, mut syyy) = (0.0, 0.0, 0.0, 0.0);
    for p in points {
        let (x, y) = (p.x, p.y);
        sx += x;
        sy += y;
        sxx += x * x;
        sxy += x * y;
        syy += y * y;
        sxxx += x * x * x;
        sxxy += x * x * y;
        sxyy += x * y * y;
        syyy += y * y * y;
    }

    let a = n * sxx - sx * sx;
    let b = n * sxy - sx * sy;
    let c = n * syy - sy * sy;
    let d = 0.5 * (n * sxyy - sx * syy + n * sxxx - sx * sxx);
    let e = 0.5 * (n * sxxy - sy * sxx + n * syyy - sy * syy);

    let det = a * c - b * b;
    if det.abs() <= f64::EPSILON * (a * c).abs().max(1.0) {
        return None;
    }
    let center = Vector2::new((d * c - b * e) / det, (a * e - b * d) / det);
    let radius = points.iter().map(|p| (p - center).norm()).sum::<f64>() / n;
    Some((center, radius))
}
