//! Flat-earth phase estimation.
//!
//! A sparse set of (line, pixel) samples is mapped to the ground through the
//! master orbit, the secondary one-way range time is solved at each ground
//! point, and a 2-D polynomial is fitted to the resulting reference phase.

use crate::core::burst::BurstDescriptor;
use crate::core::geometry::SlcGeometry;
use crate::core::orbit::{OrbitInterpolator, OrbitModel};
use crate::core::polynomial::{FitWindow, Polynomial2D};
use crate::types::{SarError, SarResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Flat-earth phase surface in normalized (line, pixel) of the image or burst it was fit on
pub type FlatEarthPolynomial = Polynomial2D;

/// How the secondary one-way range time enters the reference phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SecondaryRangeTime {
    /// Use the solved secondary range time as is
    #[default]
    Independent,
    /// Bistatic pairs: average the solved secondary time with the master time
    BistaticAverage,
}

/// Geometry and orbit of one image of a pair
#[derive(Debug, Clone)]
pub struct ImageGeometry {
    pub slc: SlcGeometry,
    pub orbit: OrbitModel,
    /// TOPS bursts, empty for stripmap products
    pub bursts: Vec<BurstDescriptor>,
}

impl ImageGeometry {
    pub fn new(slc: SlcGeometry, orbit: OrbitModel) -> Self {
        Self {
            slc,
            orbit,
            bursts: Vec::new(),
        }
    }

    pub fn with_bursts(mut self, bursts: Vec<BurstDescriptor>) -> Self {
        self.bursts = bursts;
        self
    }

    pub fn burst(&self, index: usize) -> SarResult<&BurstDescriptor> {
        self.bursts.iter().find(|b| b.index == index).ok_or_else(|| {
            SarError::Validation(format!(
                "burst {} not found ({} bursts available)",
                index,
                self.bursts.len()
            ))
        })
    }
}

/// Identifies the image pair (and sub-swath/burst) a polynomial belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImagePairKey {
    pub master: String,
    pub secondary: String,
    pub sub_swath: Option<usize>,
    pub burst: Option<usize>,
}

impl ImagePairKey {
    pub fn new(master: impl Into<String>, secondary: impl Into<String>) -> Self {
        Self {
            master: master.into(),
            secondary: secondary.into(),
            sub_swath: None,
            burst: None,
        }
    }

    pub fn with_sub_swath(mut self, sub_swath: usize) -> Self {
        self.sub_swath = Some(sub_swath);
        self
    }

    pub fn with_burst(&self, burst: usize) -> Self {
        Self {
            burst: Some(burst),
            ..self.clone()
        }
    }
}

impl std::fmt::Display for ImagePairKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.master, self.secondary)?;
        if let Some(sw) = self.sub_swath {
            write!(f, "_IW{}", sw)?;
        }
        if let Some(b) = self.burst {
            write!(f, "_burst{}", b)?;
        }
        Ok(())
    }
}

/// Spread `num_points` samples quasi-uniformly over the inclusive line/pixel window.
///
/// Samples walk along range with a fixed step and wrap onto the next sample
/// row, rows being evenly spaced in azimuth. At least two rows are used when
/// the window spans more than one line so the samples are never collinear.
pub fn distribute_points(
    num_points: usize,
    min_line: i64,
    max_line: i64,
    min_pixel: i64,
    max_pixel: i64,
) -> SarResult<Vec<(i64, i64)>> {
    if num_points < 2 {
        return Err(SarError::Validation(format!(
            "at least 2 estimation points are required, got {}",
            num_points
        )));
    }
    if max_line < min_line || max_pixel < min_pixel {
        return Err(SarError::Validation(format!(
            "empty sampling window: lines {}..{}, pixels {}..{}",
            min_line, max_line, min_pixel, max_pixel
        )));
    }

    let lines = (max_line - min_line + 1) as f64;
    let pixels = (max_pixel - min_pixel + 1) as f64;
    let n = num_points as f64;

    let win_p = (n / (lines / pixels)).sqrt();
    let mut win_l = n / win_p;
    if win_l < win_p {
        win_l = win_p;
    }

    let mut rows = win_l.floor() as i64;
    if lines >= 2.0 {
        rows = rows.max(2);
    } else {
        rows = 1;
    }

    let delta_lin = if rows > 1 { (lines - 1.0) / (rows - 1) as f64 } else { 0.0 };
    let total_pix = (pixels * rows as f64).floor();
    let delta_pix = (total_pix - 1.0) / (n - 1.0);

    let mut points = Vec::with_capacity(num_points);
    let mut pix = -delta_pix;
    let mut row_counter = 0i64;
    for _ in 0..num_points {
        pix += delta_pix;
        while pix.floor() >= pixels {
            pix -= pixels;
            row_counter += 1;
        }
        let lin = row_counter as f64 * delta_lin;

        let line = (min_line + lin.floor() as i64).clamp(min_line, max_line);
        let pixel = (min_pixel + pix.floor() as i64).clamp(min_pixel, max_pixel);
        points.push((line, pixel));
    }

    Ok(points)
}

/// Fits flat-earth polynomials for image pairs and bursts
#[derive(Debug, Clone)]
pub struct FlatEarthEstimator {
    pub degree: usize,
    pub num_points: usize,
    pub secondary_range_time: SecondaryRangeTime,
}

impl FlatEarthEstimator {
    pub fn new(degree: usize, num_points: usize, secondary_range_time: SecondaryRangeTime) -> SarResult<Self> {
        if !(1..=8).contains(&degree) {
            return Err(SarError::Validation(format!(
                "flat-earth polynomial degree must be in [1, 8], got {}",
                degree
            )));
        }
        Ok(Self {
            degree,
            num_points,
            secondary_range_time,
        })
    }

    /// Polynomial over the whole image, orbits fitted around the scene centre time
    pub fn estimate_for_pair(
        &self,
        master: &ImageGeometry,
        secondary: &ImageGeometry,
    ) -> SarResult<FlatEarthPolynomial> {
        let master_orbit = master
            .orbit
            .interpolator_around_time(master.slc.scene_centre_azimuth_time())?;
        let secondary_orbit = secondary
            .orbit
            .interpolator_around_time(secondary.slc.scene_centre_azimuth_time())?;

        self.estimate(&master.slc, &master_orbit, &secondary.slc, &secondary_orbit)
    }

    /// Polynomial over one burst, in line coordinates relative to the burst's first line.
    ///
    /// Orbits are fitted over the state vectors adjacent to the burst centre.
    pub fn estimate_for_burst(
        &self,
        master: &ImageGeometry,
        secondary: &ImageGeometry,
        burst_index: usize,
    ) -> SarResult<FlatEarthPolynomial> {
        let master_burst = master.burst(burst_index)?;
        let secondary_burst = secondary.burst(burst_index)?;

        let master_slc = master_burst.local_geometry(&master.slc);
        let secondary_slc = secondary_burst.local_geometry(&secondary.slc);

        let master_orbit = local_orbit(&master.orbit, master_burst, &master_slc)?;
        let secondary_orbit = local_orbit(&secondary.orbit, master_burst, &secondary_slc)?;

        self.estimate(&master_slc, &master_orbit, &secondary_slc, &secondary_orbit)
    }

    /// Sample the reference phase over the extent of `master` and fit the polynomial.
    pub fn estimate(
        &self,
        master: &SlcGeometry,
        master_orbit: &OrbitInterpolator,
        secondary: &SlcGeometry,
        secondary_orbit: &OrbitInterpolator,
    ) -> SarResult<FlatEarthPolynomial> {
        master.validate()?;
        secondary.validate()?;

        let max_line = master.num_lines as i64 - 1;
        let max_pixel = master.num_pixels as i64 - 1;
        let window = FitWindow::new(0.0, max_line as f64, 0.0, max_pixel as f64)?;
        let points = distribute_points(self.num_points, 0, max_line, 0, max_pixel)?;

        log::debug!(
            "Estimating flat-earth phase from {} points, degree {}, window {} x {}",
            points.len(),
            self.degree,
            master.num_lines,
            master.num_pixels
        );

        let sample = |&(line, pixel): &(i64, i64)| -> SarResult<(f64, f64, f64)> {
            let (l, p) = (line as f64, pixel as f64);
            let master_time = master.pixel_to_slant_range_time(p);
            let ground = master_orbit.ground_position(l, p, 0.0, master)?;
            let mut secondary_time = secondary_orbit
                .time_of_closest_approach(&ground, secondary)?
                .range_time;
            if self.secondary_range_time == SecondaryRangeTime::BistaticAverage {
                secondary_time = 0.5 * (secondary_time + master_time);
            }
            let phase = master.phase_per_range_time() * master_time
                - secondary.phase_per_range_time() * secondary_time;
            Ok((l, p, phase))
        };

        // On a pool worker the caller may hold a cache slot lock, and a nested
        // join could steal a tile task that waits on that same lock.
        #[cfg(feature = "parallel")]
        let samples: Vec<(f64, f64, f64)> = if rayon::current_thread_index().is_some() {
            points.iter().map(sample).collect::<SarResult<_>>()?
        } else {
            use rayon::prelude::*;
            points.par_iter().map(sample).collect::<SarResult<_>>()?
        };
        #[cfg(not(feature = "parallel"))]
        let samples: Vec<(f64, f64, f64)> = points.iter().map(sample).collect::<SarResult<_>>()?;

        fit_polynomial(&samples, window, self.degree)
    }
}

fn local_orbit(
    orbit: &OrbitModel,
    burst: &BurstDescriptor,
    local: &SlcGeometry,
) -> SarResult<OrbitInterpolator> {
    match burst.scene_centre_xyz {
        Some(centre) => orbit.interpolator_around_point(&centre),
        None => orbit.interpolator_around_time(local.scene_centre_azimuth_time()),
    }
}

/// Least-squares polynomial through `(line, pixel, phase)` samples
pub fn fit_polynomial(
    samples: &[(f64, f64, f64)],
    window: FitWindow,
    degree: usize,
) -> SarResult<FlatEarthPolynomial> {
    let polynomial = Polynomial2D::fit(samples, window, degree)?;

    let residuals = polynomial.residuals(samples);
    let max_residual = residuals.iter().fold(0.0f64, |m, r| m.max(r.abs()));
    log::debug!(
        "Flat-earth fit: {} samples, max residual {:.3e} rad",
        samples.len(),
        max_residual
    );

    Ok(polynomial)
}

type Slot = Arc<Mutex<Option<Arc<FlatEarthPolynomial>>>>;

/// Memoizing map of flat-earth polynomials, computed at most once per key.
///
/// The map lock is held only to find or insert a key's slot; the slot lock is
/// held while that key's polynomial is computed, so requests for different
/// keys never wait on each other. Failed estimates are not stored.
///
/// `compute` must not wait on rayon work when called from a pool worker:
/// the blocked worker could pick up another request for the same key.
#[derive(Debug, Default)]
pub struct FlatEarthCache {
    entries: Mutex<HashMap<ImagePairKey, Slot>>,
}

impl FlatEarthCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute<F>(&self, key: &ImagePairKey, compute: F) -> SarResult<Arc<FlatEarthPolynomial>>
    where
        F: FnOnce() -> SarResult<FlatEarthPolynomial>,
    {
        let slot = {
            let mut entries = self
                .entries
                .lock()
                .map_err(|_| SarError::Processing("flat-earth cache lock poisoned".to_string()))?;
            entries.entry(key.clone()).or_default().clone()
        };

        let mut guard = slot
            .lock()
            .map_err(|_| SarError::Processing(format!("flat-earth cache entry {} poisoned", key)))?;
        if let Some(polynomial) = guard.as_ref() {
            log::debug!("Flat-earth cache hit for {}", key);
            return Ok(Arc::clone(polynomial));
        }

        log::info!("Estimating flat-earth polynomial for {}", key);
        let polynomial = Arc::new(compute().map_err(|e| {
            log::warn!("Flat-earth estimation failed for {}: {}", key, e);
            e
        })?);
        *guard = Some(Arc::clone(&polynomial));
        Ok(polynomial)
    }

    pub fn get(&self, key: &ImagePairKey) -> Option<Arc<FlatEarthPolynomial>> {
        let slot = self.entries.lock().ok()?.get(key).cloned()?;
        let guard = slot.lock().ok()?;
        guard.as_ref().map(Arc::clone)
    }

    /// Number of keys holding a computed polynomial
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .map(|entries| {
                entries
                    .values()
                    .filter(|slot| slot.lock().map(|g| g.is_some()).unwrap_or(false))
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
