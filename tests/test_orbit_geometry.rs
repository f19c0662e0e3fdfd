mod common;

use sardine_insar::types::SPEED_OF_LIGHT;
use sardine_insar::SarError;

#[test]
fn test_ground_position_round_trips_through_closest_approach() {
    common::init_logging();
    let image = common::image_geometry(200, 300, [0.0, 0.0, 0.0]);
    let orbit = image
        .orbit
        .interpolator_around_time(image.slc.scene_centre_azimuth_time())
        .unwrap();

    for &(line, pixel) in &[(0.0, 0.0), (100.0, 150.0), (199.0, 299.0)] {
        let ground = orbit.ground_position(line, pixel, 0.0, &image.slc).unwrap();
        let approach = orbit.time_of_closest_approach(&ground, &image.slc).unwrap();
        assert!((approach.azimuth_time - image.slc.line_to_azimuth_time(line)).abs() < 1e-4);
        assert!((approach.range_time - image.slc.pixel_to_slant_range_time(pixel)).abs() < 1e-9);
    }
}

#[test]
fn test_range_shorter_than_altitude_does_not_converge() {
    common::init_logging();
    let mut image = common::image_geometry(200, 300, [0.0, 0.0, 0.0]);
    // 100 km slant range never reaches the ellipsoid from orbit
    image.slc.slant_range_time_first_pixel = 100_000.0 / SPEED_OF_LIGHT;
    let orbit = image
        .orbit
        .interpolator_around_time(image.slc.scene_centre_azimuth_time())
        .unwrap();

    match orbit.ground_position(100.0, 0.0, 0.0, &image.slc) {
        Err(SarError::Geometry(_)) => {}
        other => panic!("expected geometry error, got {:?}", other),
    }
}

#[test]
fn test_closest_approach_of_degenerate_point_fails() {
    common::init_logging();
    let image = common::image_geometry(200, 300, [0.0, 0.0, 0.0]);
    let orbit = image
        .orbit
        .interpolator_around_time(image.slc.scene_centre_azimuth_time())
        .unwrap();

    let point = [f64::NAN, 0.0, 0.0];
    match orbit.time_of_closest_approach(&point, &image.slc) {
        Err(SarError::Geometry(msg)) => assert!(msg.contains("did not converge")),
        other => panic!("expected geometry error, got {:?}", other),
    }
}
