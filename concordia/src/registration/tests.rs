use std::sync::Mutex;

use super::*;
use crate::raster::ImageDimensions;
use crate::testing::{central_mad, featureless, frame_sequence};

const W: usize = 200;
const H: usize = 150;

fn with_config(config: RegistrationConfig) -> Registrator {
    Registrator::new(config)
}

/// Largest displacement between where `a` and `b` send a grid of interior
/// points. Raw parameters of a projective fit drift with sub-pixel keypoint
/// noise even when the mapping over the frame is accurate.
fn interior_error(a: &Transform, b: &Transform) -> f64 {
    let (w, h) = (W as f64, H as f64);
    [0.25, 0.5, 0.75]
        .iter()
        .flat_map(|&fy| [0.25, 0.5, 0.75].map(|fx| DVec2::new(fx * w, fy * h)))
        .map(|p| a.apply(p).distance(b.apply(p)))
        .fold(0.0, f64::max)
}

#[test]
fn test_recovers_translation() {
    common::test_utils::init_tracing();
    let truth = Transform::translation(DVec2::new(7.0, -5.0));
    let frames = frame_sequence(1, W, H, &[truth]);
    let reference = frames[0].clone();

    let registrator = Registrator::default();
    let result = registrator.register(&frames[0], &frames[1]).unwrap();

    let err = interior_error(&result.transform, &truth);
    assert!(err < 0.5, "off by {} px, got {}", err, result.transform);
    assert!(result.inliers >= 10);
    assert!(result.rms_error < 1.0);

    let aligned = registrator.align(frames);
    assert_eq!(aligned.images.len(), 2);
    assert_eq!(aligned.aligned_count(), 1);
    assert_eq!(aligned.images[0], reference);

    let mad = central_mad(
        &aligned.images[1].to_grayscale(),
        &reference.to_grayscale(),
        12,
    );
    assert!(mad < 0.02, "aligned frame differs from reference by {}", mad);
}

#[test]
fn test_translation_model_recovers_shift_exactly() {
    let truth = Transform::translation(DVec2::new(7.0, -5.0));
    let frames = frame_sequence(1, W, H, &[truth]);

    let result = with_config(RegistrationConfig {
        transform_type: TransformType::Translation,
        ..Default::default()
    })
    .register(&frames[0], &frames[1])
    .unwrap();

    let t = result.transform.translation_components();
    assert!((t - DVec2::new(7.0, -5.0)).length() < 0.25, "got {}", result.transform);
    assert_eq!(result.transform.transform_type, TransformType::Translation);
}

#[test]
fn test_recovers_similarity() {
    let truth = Transform::similarity(DVec2::new(4.0, 3.0), 2.0f64.to_radians(), 1.01);
    let frames = frame_sequence(2, W, H, &[truth]);

    let registrator = with_config(RegistrationConfig {
        transform_type: TransformType::Similarity,
        ..Default::default()
    });
    let result = registrator.register(&frames[0], &frames[1]).unwrap();

    // Compare where the frame centre lands rather than raw parameters.
    let centre = DVec2::new(W as f64 / 2.0, H as f64 / 2.0);
    let err = result.transform.apply(centre).distance(truth.apply(centre));
    assert!(err < 1.0, "centre off by {} px ({})", err, result.transform);
    assert!((result.transform.rotation_angle() - 2.0f64.to_radians()).abs() < 0.01);
}

#[test]
fn test_output_order_matches_input() {
    let transforms: Vec<Transform> = (1..6)
        .map(|i| Transform::translation(DVec2::new(i as f64 * 2.0, -(i as f64))))
        .collect();
    let frames = frame_sequence(3, W, H, &transforms);

    let aligned = Registrator::default().align(frames);
    assert_eq!(aligned.images.len(), 6);
    for (i, report) in aligned.reports.iter().enumerate() {
        assert_eq!(report.index, i);
    }
    assert_eq!(aligned.reports[0].status, FrameStatus::Reference);
    for (report, truth) in aligned.reports[1..].iter().zip(&transforms) {
        assert_eq!(report.status, FrameStatus::Aligned);
        let err = interior_error(&report.transform.unwrap(), truth);
        assert!(err < 0.5, "frame {} off by {} px", report.index, err);
    }
}

#[test]
fn test_featureless_frame_passes_through() {
    let mut frames = frame_sequence(4, W, H, &[Transform::translation(DVec2::new(3.0, 3.0))]);
    let blank = featureless(W, H);
    frames.push(blank.clone());

    let aligned = Registrator::default().align(frames);

    assert_eq!(aligned.images.len(), 3);
    assert_eq!(aligned.images[2], blank);
    assert!(matches!(
        aligned.reports[2].status,
        FrameStatus::PassedThrough {
            reason: AlignFailure::InsufficientFeatures { found: 0, .. }
        }
    ));
    assert_eq!(aligned.reports[2].transform, None);
    assert_eq!(aligned.aligned_count(), 1);
    assert_eq!(aligned.unaligned_count(), 1);
}

#[test]
fn test_featureless_frame_dropped() {
    let mut frames = frame_sequence(5, W, H, &[Transform::translation(DVec2::new(-2.0, 4.0))]);
    frames.insert(1, featureless(W, H));

    let aligned = with_config(RegistrationConfig {
        fallback: FallbackPolicy::Drop,
        ..Default::default()
    })
    .align(frames);

    assert_eq!(aligned.images.len(), 2);
    assert_eq!(aligned.reports.len(), 3);
    assert!(matches!(
        aligned.reports[1].status,
        FrameStatus::Dropped { .. }
    ));
    assert_eq!(aligned.reports[2].status, FrameStatus::Aligned);
}

/// Reference plus a textured frame of a different scene.
fn unrelated_pair(seed: u64) -> Vec<Image> {
    let mut frames = frame_sequence(seed, W, H, &[]);
    frames.extend(frame_sequence(seed + 100, W, H, &[]));
    frames
}

#[test]
fn test_unrelated_scene_passes_through() {
    let frames = unrelated_pair(20);
    let stranger = frames[1].clone();

    let aligned = Registrator::default().align(frames);

    assert_eq!(aligned.images.len(), 2);
    assert_eq!(aligned.images[1], stranger);
    match aligned.reports[1].status {
        FrameStatus::PassedThrough { reason } => assert!(
            !matches!(reason, AlignFailure::InsufficientFeatures { .. }),
            "textured frame rejected for lack of features: {}",
            reason
        ),
        other => panic!("expected pass-through, got {:?}", other),
    }
    assert_eq!(aligned.reports[1].transform, None);
}

#[test]
fn test_unrelated_scene_dropped() {
    let aligned = with_config(RegistrationConfig {
        fallback: FallbackPolicy::Drop,
        ..Default::default()
    })
    .align(unrelated_pair(20));

    assert_eq!(aligned.images.len(), 1);
    assert_eq!(aligned.reports.len(), 2);
    match aligned.reports[1].status {
        FrameStatus::Dropped { reason } => {
            assert!(!matches!(reason, AlignFailure::InsufficientFeatures { .. }))
        }
        other => panic!("expected drop, got {:?}", other),
    }
}

#[test]
fn test_featureless_reference_passes_everything_through() {
    let mut frames = vec![featureless(W, H)];
    frames.extend(frame_sequence(6, W, H, &[]));

    let aligned = Registrator::default().align(frames.clone());
    assert_eq!(aligned.images, frames);
    assert!(matches!(
        aligned.reports[1].status,
        FrameStatus::PassedThrough {
            reason: AlignFailure::InsufficientFeatures { .. }
        }
    ));
}

#[test]
fn test_reference_index_selects_frame() {
    let frames = frame_sequence(7, W, H, &[Transform::translation(DVec2::new(5.0, 0.0))]);
    let second = frames[1].clone();

    let aligned = with_config(RegistrationConfig {
        reference_index: 1,
        ..Default::default()
    })
    .align(frames);

    assert_eq!(aligned.images[1], second);
    assert_eq!(aligned.reports[1].status, FrameStatus::Reference);
    assert_eq!(aligned.reports[0].status, FrameStatus::Aligned);
    // Frame 0 seen from frame 1 is shifted the other way.
    let truth = Transform::translation(DVec2::new(-5.0, 0.0));
    let err = interior_error(&aligned.reports[0].transform.unwrap(), &truth);
    assert!(err < 0.5, "off by {} px", err);
}

#[test]
fn test_reference_index_out_of_range_falls_back_to_zero() {
    let frames = frame_sequence(8, W, H, &[Transform::translation(DVec2::new(1.0, 2.0))]);
    let first = frames[0].clone();

    let aligned = with_config(RegistrationConfig {
        reference_index: 42,
        ..Default::default()
    })
    .align(frames);

    assert_eq!(aligned.reports[0].status, FrameStatus::Reference);
    assert_eq!(aligned.images[0], first);
}

#[test]
fn test_cancelled_frames_follow_policy() {
    let frames = frame_sequence(
        9,
        W,
        H,
        &[
            Transform::translation(DVec2::new(1.0, 0.0)),
            Transform::translation(DVec2::new(0.0, 1.0)),
        ],
    );
    let flag = CancelFlag::new();
    flag.cancel();

    let kept = Registrator::default()
        .with_cancel(flag.clone())
        .align(frames.clone());
    assert_eq!(kept.images, frames);
    assert_eq!(kept.reports[1].status, FrameStatus::Cancelled);
    assert_eq!(kept.reports[2].status, FrameStatus::Cancelled);

    let dropped = with_config(RegistrationConfig {
        fallback: FallbackPolicy::Drop,
        ..Default::default()
    })
    .with_cancel(Arc::new(std::sync::atomic::AtomicBool::new(true)))
    .align(frames.clone());
    assert_eq!(dropped.images, vec![frames[0].clone()]);
    assert_eq!(dropped.reports.len(), 3);
}

#[test]
fn test_progress_reports_every_frame() {
    let frames = frame_sequence(10, 120, 100, &[Transform::identity(), Transform::identity()]);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    Registrator::default()
        .with_progress(Arc::new(move |p: AlignProgress| {
            sink.lock().unwrap().push(p);
        }))
        .align(frames);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 4);
    assert_eq!(seen[0].stage, AlignStage::Reference);
    let mut frame_steps: Vec<usize> = seen[1..].iter().map(|p| p.current).collect();
    frame_steps.sort_unstable();
    assert_eq!(frame_steps, vec![1, 2, 3]);
    assert!(seen.iter().all(|p| p.total == 3));
}

#[test]
fn test_empty_and_single_frame() {
    let aligned = Registrator::default().align(Vec::new());
    assert!(aligned.images.is_empty());
    assert!(aligned.reports.is_empty());

    let single = frame_sequence(11, 80, 60, &[]);
    let aligned = Registrator::default().align(single.clone());
    assert_eq!(aligned.images, single);
    assert_eq!(aligned.reports[0].status, FrameStatus::Reference);
}

#[test]
fn test_output_takes_reference_size_and_source_channels() {
    let mut frames = frame_sequence(12, W, H, &[Transform::translation(DVec2::new(2.0, 2.0))]);
    let gray = frames[1].to_grayscale();
    frames[1] = Image::from_pixels(ImageDimensions::new(W, H, 1), gray.into_data());

    let aligned = Registrator::default().align(frames);
    assert_eq!(aligned.reports[1].status, FrameStatus::Aligned);
    assert_eq!(aligned.images[1].dimensions(), ImageDimensions::new(W, H, 1));
}

#[test]
fn test_well_formed_rejects_horizon_inside_frame() {
    let t = Transform::homography([1.0, 0.0, 0.0, 0.0, 1.0, 0.0, -0.02, 0.0]);
    assert!(!is_well_formed(&t, 100, 100));
    assert!(is_well_formed(&Transform::identity(), 100, 100));
}

#[test]
fn test_failure_display() {
    let f = AlignFailure::InsufficientCorrespondences {
        found: 2,
        required: 4,
    };
    assert_eq!(f.to_string(), "insufficient correspondences: found 2, need 4");
}
