use super::*;
use crate::raster::ImageDimensions;
use crate::registration::transform::TransformType;

const METHODS: [InterpolationMethod; 4] = [
    InterpolationMethod::Nearest,
    InterpolationMethod::Bilinear,
    InterpolationMethod::Bicubic,
    InterpolationMethod::Lanczos3,
];

fn ramp(width: usize, height: usize) -> Plane {
    Plane::from_fn(width, height, |x, y| (x as f32 * 0.01) + (y as f32 * 0.02))
}

#[test]
fn test_kernels_interpolate_at_integers() {
    assert_eq!(bicubic_kernel(0.0), 1.0);
    assert!(bicubic_kernel(1.0).abs() < 1e-6);
    assert!(bicubic_kernel(2.0).abs() < 1e-6);
    assert_eq!(lanczos_lut().lookup(0.0), 1.0);
    assert!(lanczos_lut().lookup(1.0).abs() < 1e-3);
    assert_eq!(lanczos_lut().lookup(3.5), 0.0);
}

#[test]
fn test_lut_matches_direct() {
    for i in 0..300 {
        let x = i as f32 * 0.01;
        let direct = lanczos_kernel_direct(x, 3.0);
        assert!((lanczos_lut().lookup(x) - direct).abs() < 1e-3, "x = {}", x);
    }
}

#[test]
fn test_integer_positions_are_exact() {
    let plane = ramp(16, 16);
    for method in METHODS {
        let v = interpolate_pixel(&plane, 7.0, 5.0, method, 0.0);
        assert!((v - plane.get(7, 5)).abs() < 1e-4, "{:?}", method);
    }
}

#[test]
fn test_bilinear_midpoint() {
    let plane = Plane::new(2, 1, vec![0.0, 1.0]);
    let v = interpolate_pixel(&plane, 0.5, 0.0, InterpolationMethod::Bilinear, 0.0);
    assert!((v - 0.5).abs() < 1e-6);
}

#[test]
fn test_flat_region_stays_flat() {
    let plane = Plane::filled(20, 20, 0.4);
    for method in METHODS {
        let v = interpolate_pixel(&plane, 9.37, 10.61, method, 0.0);
        assert!((v - 0.4).abs() < 1e-4, "{:?} gave {}", method, v);
    }
}

#[test]
fn test_out_of_bounds_and_nan_give_border() {
    let plane = Plane::filled(8, 8, 1.0);
    for method in METHODS {
        assert_eq!(interpolate_pixel(&plane, -10.0, 3.0, method, 0.25), 0.25);
        assert_eq!(interpolate_pixel(&plane, 3.0, 100.0, method, 0.25), 0.25);
        assert_eq!(interpolate_pixel(&plane, f32::NAN, 3.0, method, 0.25), 0.25);
    }
}

#[test]
fn test_warp_identity_preserves_plane() {
    let plane = ramp(40, 70);
    for method in METHODS {
        let out = warp_plane(&plane, 40, 70, &Transform::identity(), method, 0.0);
        for (a, b) in out.data().iter().zip(plane.data()) {
            assert!((a - b).abs() < 1e-4, "{:?}", method);
        }
    }
}

#[test]
fn test_warp_translation_samples_shifted_source() {
    // Output(x, y) = input(x + 3, y - 2)
    let plane = ramp(50, 40);
    let t = Transform::translation(DVec2::new(3.0, -2.0));
    let out = warp_plane(&plane, 50, 40, &t, InterpolationMethod::Bilinear, 0.0);

    assert!((out.get(10, 10) - plane.get(13, 8)).abs() < 1e-5);
    // Rows 0..2 map above the source.
    assert_eq!(out.get(10, 0), 0.0);
    // Columns >= 47 map past the right edge.
    assert_eq!(out.get(48, 20), 0.0);
}

#[test]
fn test_warp_to_different_grid_size() {
    let plane = ramp(30, 20);
    let out = warp_plane(
        &plane,
        45,
        25,
        &Transform::identity(),
        InterpolationMethod::Nearest,
        0.0,
    );
    assert_eq!((out.width(), out.height()), (45, 25));
    assert_eq!(out.get(29, 19), plane.get(29, 19));
    assert_eq!(out.get(40, 22), 0.0);
}

#[test]
fn test_warp_spans_multiple_row_chunks() {
    let plane = ramp(8, ROWS_PER_CHUNK * 3 + 5);
    let t = Transform::translation(DVec2::new(0.0, 1.0));
    let out = warp_plane(
        &plane,
        8,
        plane.height(),
        &t,
        InterpolationMethod::Nearest,
        0.0,
    );
    for y in 0..plane.height() - 1 {
        assert_eq!(out.get(4, y), plane.get(4, y + 1));
    }
}

#[test]
fn test_warp_image_keeps_channels() {
    let dims = ImageDimensions::new(12, 9, 3);
    let pixels: Vec<f32> = (0..dims.sample_count())
        .map(|i| (i % 17) as f32 / 17.0)
        .collect();
    let image = Image::from_pixels(dims, pixels);

    let t = Transform::from_matrix(Transform::identity().matrix, TransformType::Homography);
    let out = warp_image(&image, 12, 9, &t, InterpolationMethod::Bilinear);
    assert_eq!(out.dimensions(), dims);
    for (a, b) in out.pixels().iter().zip(image.pixels()) {
        assert!((a - b).abs() < 1e-6);
    }
}
