use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector2, Vector3};
use pcal_calib::{
    CalibError, CandidateSource, Checkerboard, CornerObservation, GridTarget,
    InitializationError, InitializerConfig, IntrinsicsInitializer,
};
use pcal_core::{CameraModel, Distortion, PinholeProjection, RadialTangentialDistortion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

const WIDTH: usize = 640;
const HEIGHT: usize = 480;
const FOCAL: f64 = 400.0;

fn true_camera() -> PinholeProjection {
    PinholeProjection::new_ideal(WIDTH, HEIGHT, FOCAL, FOCAL, 319.5, 239.5)
}

fn board() -> Arc<Checkerboard> {
    Arc::new(Checkerboard::square(6, 8, 0.03))
}

/// Board tilted about both axes with its center on the optical axis.
fn camera_from_target(board: &Checkerboard) -> Isometry3<f64> {
    let rotation = UnitQuaternion::from_euler_angles(0.4, -0.3, 0.1);
    let center = Vector3::new(
        0.5 * (board.cols - 1) as f64 * board.col_spacing,
        0.5 * (board.rows - 1) as f64 * board.row_spacing,
        0.0,
    );
    let translation = Vector3::new(0.0, 0.0, 0.6) - rotation * center;
    Isometry3::from_parts(Translation3::from(translation), rotation)
}

fn observe_with(
    camera: &PinholeProjection,
    mut rng: Option<&mut StdRng>,
    keep: impl Fn(usize, usize) -> bool,
) -> CornerObservation {
    let board = board();
    let pose = camera_from_target(&board);
    let mut obs = CornerObservation::new(board.clone(), WIDTH, HEIGHT);
    for r in 0..board.rows() {
        for c in 0..board.cols() {
            if !keep(r, c) {
                continue;
            }
            let p = pose * Point3::from(board.grid_point(r, c));
            let mut k = camera.project(&p.coords).expect("synthetic corner visible");
            if let Some(rng) = rng.as_deref_mut() {
                k += Vector2::new(rng.gen_range(-0.05..0.05_f64), rng.gen_range(-0.05..0.05_f64));
            }
            obs.set_image_point(board.grid_index(r, c), k);
        }
    }
    obs
}

fn observe(rng: Option<&mut StdRng>, keep: impl Fn(usize, usize) -> bool) -> CornerObservation {
    observe_with(&true_camera(), rng, keep)
}

fn full_observation() -> CornerObservation {
    observe(None, |_, _| true)
}

#[test]
fn recovers_focal_length_from_tilted_board() {
    let mut camera = PinholeProjection::<RadialTangentialDistortion>::test_projection();
    let report = IntrinsicsInitializer::new(InitializerConfig::default())
        .initialize(&mut camera, &[full_observation()])
        .unwrap();

    // Straight rows carry no focal information.
    assert_eq!(report.source, CandidateSource::Homography);
    assert_eq!(report.rows_evaluated, 0);
    assert!((report.focal_length - FOCAL).abs() < 1e-6);
    assert!(report.mean_reprojection_error < 1e-6);

    assert!((camera.fu() - FOCAL).abs() < 1e-6);
    assert_eq!(camera.fu(), camera.fv());
    assert_eq!(camera.principal_point(), (319.5, 239.5));
    assert_eq!(camera.image_size(), (WIDTH, HEIGHT));
    assert!(camera.distortion().parameters().iter().all(|&k| k == 0.0));
}

#[test]
fn principal_point_is_forced_to_image_center() {
    let rendering = PinholeProjection::new_ideal(WIDTH, HEIGHT, FOCAL, FOCAL, 320.0, 240.0);
    let obs = observe_with(&rendering, None, |_, _| true);
    let mut camera = true_camera();
    let report = IntrinsicsInitializer::new(InitializerConfig::default())
        .initialize(&mut camera, &[obs])
        .unwrap();

    assert!((report.focal_length - FOCAL).abs() < 0.03 * FOCAL);
    assert_eq!(camera.principal_point(), (319.5, 239.5));
}

#[test]
fn tolerates_detection_noise() {
    let mut rng = StdRng::seed_from_u64(42);
    let obs = observe(Some(&mut rng), |_, _| true);
    let mut camera = PinholeProjection::<RadialTangentialDistortion>::test_projection();
    let report = IntrinsicsInitializer::new(InitializerConfig::default())
        .initialize(&mut camera, &[obs])
        .unwrap();

    assert!((report.focal_length - FOCAL).abs() < 10.0, "{}", report.focal_length);
    assert!(report.mean_reprojection_error < 1.0);
}

#[test]
fn straight_rows_without_fallback_fail() {
    let config = InitializerConfig {
        homography_fallback: false,
        ..InitializerConfig::default()
    };
    let mut camera = PinholeProjection::<RadialTangentialDistortion>::test_projection();
    let result = IntrinsicsInitializer::new(config).initialize(&mut camera, &[full_observation()]);

    assert_eq!(result, Err(InitializationError::NoUsableCandidate));
    assert_eq!(camera.focal_length(), (0.0, 0.0));
    assert_eq!(camera.principal_point(), (319.5, 239.5));
}

#[test]
fn uses_only_the_first_observation() {
    let mut camera = true_camera();
    let observations = [
        full_observation(),
        CornerObservation::without_target(WIDTH, HEIGHT),
    ];
    let initializer = IntrinsicsInitializer::new(InitializerConfig::default());
    assert!(initializer.initialize(&mut camera, &observations).is_ok());

    let observations = [
        CornerObservation::without_target(WIDTH, HEIGHT),
        full_observation(),
    ];
    assert_eq!(
        initializer.initialize(&mut camera, &observations),
        Err(InitializationError::MissingTarget)
    );
}

#[test]
fn rows_with_three_corners_are_skipped() {
    // Three corners per row: every row is skipped, the plane still has 18.
    let obs = observe(None, |_, c| c < 3);
    let mut camera = true_camera();

    let config = InitializerConfig {
        homography_fallback: false,
        ..InitializerConfig::default()
    };
    assert_eq!(
        IntrinsicsInitializer::new(config).initialize(&mut camera, std::slice::from_ref(&obs)),
        Err(InitializationError::NoUsableCandidate)
    );

    let report = IntrinsicsInitializer::new(InitializerConfig::default())
        .initialize(&mut camera, &[obs])
        .unwrap();
    assert_eq!(report.rows_evaluated, 0);
    assert!((report.focal_length - FOCAL).abs() < 1e-6);
}

#[test]
fn config_deserializes_with_defaults() {
    let config: InitializerConfig = serde_json::from_str(r#"{ "min_corners": 5 }"#).unwrap();
    assert_eq!(config.min_corners, 5);
    assert_eq!(config.max_radial_norm, 0.95);
    assert!(config.homography_fallback);
}

#[test]
fn initialization_also_recovers_target_pose() {
    let mut camera = PinholeProjection::<RadialTangentialDistortion>::test_projection();
    let (report, target_from_camera) = IntrinsicsInitializer::new(InitializerConfig::default())
        .initialize_with_pose(&mut camera, &[full_observation()])
        .unwrap();
    assert!((report.focal_length - FOCAL).abs() < 1e-6);

    let truth = camera_from_target(&board()).inverse();
    assert!((target_from_camera.translation.vector - truth.translation.vector).norm() < 1e-6);
    assert!(target_from_camera.rotation.angle_to(&truth.rotation) < 1e-6);
}

#[test]
fn initialization_with_pose_reports_initializer_errors() {
    let mut camera = PinholeProjection::<RadialTangentialDistortion>::test_projection();
    let observations: [CornerObservation; 0] = [];
    let result = IntrinsicsInitializer::new(InitializerConfig::default())
        .initialize_with_pose(&mut camera, &observations);
    assert!(matches!(
        result,
        Err(CalibError::Initialization(InitializationError::NoObservations))
    ));
}
