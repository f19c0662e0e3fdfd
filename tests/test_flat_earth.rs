mod common;

use approx::assert_abs_diff_eq;
use sardine_insar::core::{
    distribute_points, fit_polynomial, FitWindow, ImageGeometry, SecondaryRangeTime,
};
use sardine_insar::{FlatEarthCache, FlatEarthEstimator, ImagePairKey, SarError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const LINES: usize = 200;
const PIXELS: usize = 300;

fn pair() -> (ImageGeometry, ImageGeometry) {
    (
        common::image_geometry(LINES, PIXELS, [0.0, 0.0, 0.0]),
        common::image_geometry(LINES, PIXELS, [20.0, 150.0, 40.0]),
    )
}

/// Reference phase at the estimator's sample points, computed point by point
fn reference_samples(master: &ImageGeometry, secondary: &ImageGeometry, num_points: usize) -> Vec<(f64, f64, f64)> {
    let master_orbit = master
        .orbit
        .interpolator_around_time(master.slc.scene_centre_azimuth_time())
        .unwrap();
    let secondary_orbit = secondary
        .orbit
        .interpolator_around_time(secondary.slc.scene_centre_azimuth_time())
        .unwrap();

    distribute_points(num_points, 0, LINES as i64 - 1, 0, PIXELS as i64 - 1)
        .unwrap()
        .into_iter()
        .map(|(line, pixel)| {
            let (l, p) = (line as f64, pixel as f64);
            let ground = master_orbit.ground_position(l, p, 0.0, &master.slc).unwrap();
            let approach = secondary_orbit
                .time_of_closest_approach(&ground, &secondary.slc)
                .unwrap();
            let phase = master.slc.phase_per_range_time() * master.slc.pixel_to_slant_range_time(p)
                - secondary.slc.phase_per_range_time() * approach.range_time;
            (l, p, phase)
        })
        .collect()
}

fn rms(values: &[f64]) -> f64 {
    (values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64).sqrt()
}

#[test]
fn test_estimation_is_deterministic() {
    common::init_logging();
    let (master, secondary) = pair();
    let estimator = FlatEarthEstimator::new(5, 501, SecondaryRangeTime::Independent).unwrap();

    let first = estimator.estimate_for_pair(&master, &secondary).unwrap();
    let second = estimator.estimate_for_pair(&master, &secondary).unwrap();
    assert_eq!(first.coefficients(), second.coefficients());
}

#[test]
fn test_polynomial_reproduces_reference_phase() {
    common::init_logging();
    let (master, secondary) = pair();
    let estimator = FlatEarthEstimator::new(5, 501, SecondaryRangeTime::Independent).unwrap();
    let polynomial = estimator.estimate_for_pair(&master, &secondary).unwrap();

    let samples = reference_samples(&master, &secondary, 501);
    let spread = samples.iter().map(|s| s.2).fold(f64::NEG_INFINITY, f64::max)
        - samples.iter().map(|s| s.2).fold(f64::INFINITY, f64::min);
    assert!(spread > 1.0, "baseline should produce a phase ramp, spread {}", spread);

    for residual in polynomial.residuals(&samples) {
        assert!(residual.abs() < 0.01, "residual {} rad", residual);
    }
}

#[test]
fn test_residuals_do_not_grow_with_degree() {
    common::init_logging();
    let (master, secondary) = pair();
    let samples = reference_samples(&master, &secondary, 301);
    let window = FitWindow::new(0.0, (LINES - 1) as f64, 0.0, (PIXELS - 1) as f64).unwrap();

    let mut previous = f64::INFINITY;
    for degree in 1..=5 {
        let polynomial = fit_polynomial(&samples, window, degree).unwrap();
        let error = rms(&polynomial.residuals(&samples));
        assert!(
            error <= previous + 1e-6,
            "degree {} rms {} above degree {} rms {}",
            degree,
            error,
            degree - 1,
            previous
        );
        previous = error;
    }
    assert!(previous < 1e-3, "degree 5 rms residual {}", previous);
}

#[test]
fn test_linear_ramp_recovered_for_any_point_count() {
    common::init_logging();
    let ramp = |l: f64, p: f64| 3.0 + 0.5 * l - 0.25 * p;
    let window = FitWindow::new(0.0, 199.0, 0.0, 299.0).unwrap();

    for n in [3, 10, 301, 1001] {
        let samples: Vec<(f64, f64, f64)> = distribute_points(n, 0, 199, 0, 299)
            .unwrap()
            .into_iter()
            .map(|(l, p)| (l as f64, p as f64, ramp(l as f64, p as f64)))
            .collect();
        assert_eq!(samples.len(), n);

        let polynomial = fit_polynomial(&samples, window, 1).unwrap();
        for (l, p) in [(0.0, 0.0), (150.0, 40.0), (199.0, 299.0), (73.5, 212.25)] {
            assert_abs_diff_eq!(polynomial.evaluate(l, p), ramp(l, p), epsilon = 1e-8);
        }
    }
}

#[test]
fn test_zero_baseline_gives_zero_phase() {
    common::init_logging();
    let master = common::image_geometry(LINES, PIXELS, [0.0, 0.0, 0.0]);
    let secondary = master.clone();
    let estimator = FlatEarthEstimator::new(3, 301, SecondaryRangeTime::Independent).unwrap();
    let polynomial = estimator.estimate_for_pair(&master, &secondary).unwrap();

    for (l, p) in [(0.0, 0.0), (100.0, 150.0), (199.0, 299.0)] {
        assert_abs_diff_eq!(polynomial.evaluate(l, p), 0.0, epsilon = 1e-3);
    }
}

#[test]
fn test_bistatic_average_halves_the_phase() {
    common::init_logging();
    let (master, secondary) = pair();
    let independent = FlatEarthEstimator::new(5, 501, SecondaryRangeTime::Independent)
        .unwrap()
        .estimate_for_pair(&master, &secondary)
        .unwrap();
    let bistatic = FlatEarthEstimator::new(5, 501, SecondaryRangeTime::BistaticAverage)
        .unwrap()
        .estimate_for_pair(&master, &secondary)
        .unwrap();

    for (l, p) in [(0.0, 0.0), (60.0, 250.0), (199.0, 299.0)] {
        assert_abs_diff_eq!(bistatic.evaluate(l, p), 0.5 * independent.evaluate(l, p), epsilon = 1e-3);
    }
}

#[test]
fn test_burst_polynomial_uses_burst_local_lines() {
    common::init_logging();
    let (master, secondary) = pair();
    let master = master.clone().with_bursts(common::bursts(&master.slc, 2, 100));
    let secondary = secondary.clone().with_bursts(common::bursts(&secondary.slc, 2, 100));
    let estimator = FlatEarthEstimator::new(5, 501, SecondaryRangeTime::Independent).unwrap();

    let whole = estimator.estimate_for_pair(&master, &secondary).unwrap();
    let burst = estimator.estimate_for_burst(&master, &secondary, 1).unwrap();

    for (local_line, pixel) in [(0.0, 10.0), (50.0, 150.0), (99.0, 290.0)] {
        assert_abs_diff_eq!(
            burst.evaluate(local_line, pixel),
            whole.evaluate(local_line + 100.0, pixel),
            epsilon = 0.01
        );
    }

    match estimator.estimate_for_burst(&master, &secondary, 7) {
        Err(SarError::Validation(msg)) => assert!(msg.contains("burst 7")),
        other => panic!("expected missing burst error, got {:?}", other.map(|p| p.degree())),
    }
}

#[test]
fn test_cache_computes_each_key_once_across_threads() {
    common::init_logging();
    let (master, secondary) = pair();
    let estimator = FlatEarthEstimator::new(3, 301, SecondaryRangeTime::Independent).unwrap();
    let cache = FlatEarthCache::new();
    let calls = AtomicUsize::new(0);
    let keys = [
        ImagePairKey::new("03Jan2020", "15Jan2020"),
        ImagePairKey::new("03Jan2020", "27Jan2020"),
    ];

    std::thread::scope(|scope| {
        for i in 0..8 {
            let key = &keys[i % 2];
            let (cache, calls, estimator, master, secondary) = (&cache, &calls, &estimator, &master, &secondary);
            scope.spawn(move || {
                let polynomial = cache
                    .get_or_compute(key, || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(std::time::Duration::from_millis(20));
                        estimator.estimate_for_pair(master, secondary)
                    })
                    .unwrap();
                assert_eq!(polynomial.degree(), 3);
            });
        }
    });

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.len(), 2);

    let first = cache.get(&keys[0]).unwrap();
    let again = cache
        .get_or_compute(&keys[0], || panic!("cached polynomial recomputed"))
        .unwrap();
    assert!(Arc::ptr_eq(&first, &again));
}

#[test]
fn test_cache_shared_by_pool_workers() {
    use rayon::prelude::*;

    common::init_logging();
    let (master, secondary) = pair();
    let estimator = FlatEarthEstimator::new(4, 401, SecondaryRangeTime::Independent).unwrap();
    let expected = estimator.estimate_for_pair(&master, &secondary).unwrap();

    let cache = FlatEarthCache::new();
    let calls = AtomicUsize::new(0);
    let key = ImagePairKey::new("03Jan2020", "15Jan2020");
    let pool = rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap();

    let polynomials: Vec<_> = pool.install(|| {
        (0..64)
            .into_par_iter()
            .map(|_| {
                cache
                    .get_or_compute(&key, || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        estimator.estimate_for_pair(&master, &secondary)
                    })
                    .unwrap()
            })
            .collect()
    });

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    for polynomial in &polynomials {
        assert!(Arc::ptr_eq(polynomial, &polynomials[0]));
    }
    assert_eq!(polynomials[0].coefficients(), expected.coefficients());
}
