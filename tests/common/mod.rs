#![allow(dead_code)]

use chrono::NaiveDate;
use ndarray::Array2;
use sardine_insar::core::{BurstDescriptor, ImageGeometry, InsarPair, InsarParams, InterferometricProduct};
use sardine_insar::io::BandCatalog;
use sardine_insar::types::{OrbitStateVector, SarComplex, SarImage, SPEED_OF_LIGHT, WGS84_A};
use sardine_insar::{OrbitModel, SlcGeometry};
use std::sync::Arc;

pub const ORBIT_RADIUS: f64 = 7.07e6;
pub const ORBIT_SPEED: f64 = 7500.0;
pub const WAVELENGTH: f64 = 0.055_465_76;
pub const LINE_INTERVAL: f64 = 0.02;
pub const RANGE_SPACING: f64 = 20.0;
pub const NEAR_RANGE: f64 = 850_000.0;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Deterministic linear congruential generator for synthetic rasters
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    /// Uniform in [0, 1)
    pub fn next_f64(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }

    pub fn phase(&mut self) -> f64 {
        (self.next_f64() * 2.0 - 1.0) * std::f64::consts::PI
    }
}

/// Unit-amplitude random-phase complex raster
pub fn random_phasors(rows: usize, cols: usize, seed: u64) -> SarImage {
    let mut rng = Lcg::new(seed);
    Array2::from_shape_fn((rows, cols), |_| SarComplex::from_polar(1.0, rng.phase() as f32))
}

/// Circular polar orbit sampled every 10 s from -60 s to +60 s, shifted by `offset`
pub fn circular_orbit(offset: [f64; 3]) -> Vec<OrbitStateVector> {
    let omega = ORBIT_SPEED / ORBIT_RADIUS;
    (-6..=6)
        .map(|k| {
            let t = k as f64 * 10.0;
            OrbitStateVector::new(
                t,
                [
                    ORBIT_RADIUS * (omega * t).cos() + offset[0],
                    offset[1],
                    ORBIT_RADIUS * (omega * t).sin() + offset[2],
                ],
            )
        })
        .collect()
}

/// Equatorial ground point seen at zero Doppler at t = 0 from slant range `range`
pub fn ground_point_at_range(range: f64) -> [f64; 3] {
    let x = (ORBIT_RADIUS * ORBIT_RADIUS + WGS84_A * WGS84_A - range * range) / (2.0 * ORBIT_RADIUS);
    let y = (WGS84_A * WGS84_A - x * x).sqrt();
    [x, y, 0.0]
}

pub fn slc_geometry(lines: usize, pixels: usize) -> SlcGeometry {
    let centre_range = NEAR_RANGE + 0.5 * pixels as f64 * RANGE_SPACING;
    SlcGeometry::from_range_spacing(
        WAVELENGTH,
        -0.5 * (lines as f64 - 1.0) * LINE_INTERVAL,
        LINE_INTERVAL,
        NEAR_RANGE / SPEED_OF_LIGHT,
        RANGE_SPACING,
        lines,
        pixels,
        NaiveDate::from_ymd_opt(2020, 1, 3).unwrap(),
        ground_point_at_range(centre_range),
    )
}

pub fn image_geometry(lines: usize, pixels: usize, baseline: [f64; 3]) -> ImageGeometry {
    let orbit = OrbitModel::new(circular_orbit(baseline), 3).unwrap();
    ImageGeometry::new(slc_geometry(lines, pixels), orbit)
}

/// Contiguous bursts of `lines_per_burst` lines covering the image
pub fn bursts(geometry: &SlcGeometry, count: usize, lines_per_burst: usize) -> Vec<BurstDescriptor> {
    let omega = ORBIT_SPEED / ORBIT_RADIUS;
    let centre = geometry.scene_centre_xyz;
    (0..count)
        .map(|i| {
            let first_line_time =
                geometry.first_line_time + (i * lines_per_burst) as f64 * geometry.line_time_interval;
            let mid_time = first_line_time + 0.5 * lines_per_burst as f64 * geometry.line_time_interval;
            let angle = omega * mid_time;
            BurstDescriptor::regular(
                i,
                lines_per_burst,
                first_line_time,
                geometry.line_time_interval,
                geometry.num_pixels,
                geometry.slant_range_time_first_pixel,
                geometry.range_time_interval,
            )
            .unwrap()
            .with_scene_centre([centre[0] * angle.cos(), centre[1], centre[0] * angle.sin()])
        })
        .collect()
}

pub fn band_names() -> Vec<&'static str> {
    vec![
        "i_IW1_VV_mst_03Jan2020",
        "q_IW1_VV_mst_03Jan2020",
        "i_IW1_VV_slv1_15Jan2020",
        "q_IW1_VV_slv1_15Jan2020",
    ]
}

/// Master/secondary pair over a `lines x pixels` scene, optionally split in bursts
pub fn insar_pair(
    lines: usize,
    pixels: usize,
    burst_count: usize,
    params: &InsarParams,
) -> InsarPair {
    let mut master = image_geometry(lines, pixels, [0.0, 0.0, 0.0]);
    let mut secondary = image_geometry(lines, pixels, [20.0, 150.0, 40.0]);
    if burst_count > 0 {
        let lines_per_burst = lines / burst_count;
        master.bursts = bursts(&master.slc, burst_count, lines_per_burst);
        secondary.bursts = bursts(&secondary.slc, burst_count, lines_per_burst);
    }

    let catalog = BandCatalog::from_band_names(band_names()).unwrap();
    let bands = catalog.pairs().unwrap().remove(0);
    InsarPair {
        product: InterferometricProduct::new(bands, params, 0.0),
        master: Arc::new(master),
        secondary: Arc::new(secondary),
    }
}
