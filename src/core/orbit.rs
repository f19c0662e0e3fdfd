use crate::core::geometry::{dot, norm, solve33, sub, SlcGeometry};
use crate::core::polynomial::{polyfit_1d, polyval_1d};
use crate::types::{OrbitStateVector, SarError, SarResult, SPEED_OF_LIGHT, WGS84_A, WGS84_B};

/// Number of adjacent state vectors used for a local orbit fit
pub const INTERPOLATION_VECTORS: usize = 8;

/// Maximum Newton iterations for the geometry solvers
pub const MAX_ITERATIONS: usize = 10;

/// Position convergence threshold (m)
const POSITION_CRITERION: f64 = 1e-6;

/// Azimuth time convergence threshold (s)
const TIME_CRITERION: f64 = 1e-10;

/// Seconds per normalized time unit in the orbit polynomial
const TIME_SCALE: f64 = 10.0;

/// Time-ordered orbit state vectors of one image plus the interpolation degree
#[derive(Debug, Clone)]
pub struct OrbitModel {
    state_vectors: Vec<OrbitStateVector>,
    degree: usize,
}

impl OrbitModel {
    pub fn new(state_vectors: Vec<OrbitStateVector>, degree: usize) -> SarResult<Self> {
        if !(1..=5).contains(&degree) {
            return Err(SarError::Validation(format!(
                "orbit interpolation degree must be in [1, 5], got {}",
                degree
            )));
        }
        if state_vectors.len() < degree + 1 {
            return Err(SarError::Geometry(format!(
                "{} orbit state vectors cannot support degree {} interpolation",
                state_vectors.len(),
                degree
            )));
        }
        if state_vectors.windows(2).any(|w| !(w[1].time > w[0].time)) {
            return Err(SarError::Geometry(
                "orbit state vectors must be strictly increasing in time".to_string(),
            ));
        }

        log::debug!(
            "Orbit model: {} state vectors, degree {}",
            state_vectors.len(),
            degree
        );
        Ok(Self { state_vectors, degree })
    }

    pub fn state_vectors(&self) -> &[OrbitStateVector] {
        &self.state_vectors
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Local interpolator over the vectors nearest in time to `time`
    pub fn interpolator_around_time(&self, time: f64) -> SarResult<OrbitInterpolator> {
        let closest = binary_search_closest_time(&self.state_vectors, time);
        self.interpolator_from(adjacent_window(self.state_vectors.len(), closest))
    }

    /// Local interpolator over the vectors adjacent to the one closest to `point`
    pub fn interpolator_around_point(&self, point: &[f64; 3]) -> SarResult<OrbitInterpolator> {
        let closest = self
            .state_vectors
            .iter()
            .enumerate()
            .map(|(i, sv)| (i, norm(&sub(&sv.position, point))))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
            .unwrap_or(0);
        self.interpolator_from(adjacent_window(self.state_vectors.len(), closest))
    }

    /// Satellite position at `time` from a local fit around that time
    pub fn position_at_time(&self, time: f64) -> SarResult<[f64; 3]> {
        Ok(self.interpolator_around_time(time)?.position_at_time(time))
    }

    fn interpolator_from(&self, range: std::ops::Range<usize>) -> SarResult<OrbitInterpolator> {
        OrbitInterpolator::fit(&self.state_vectors[range], self.degree)
    }
}

/// Indices of up to eight adjacent vectors around `closest`, clamped at the list ends
fn adjacent_window(count: usize, closest: usize) -> std::ops::Range<usize> {
    if count <= INTERPOLATION_VECTORS {
        return 0..count;
    }
    let start = if closest < 3 {
        0
    } else if closest > count - 5 {
        count - INTERPOLATION_VECTORS
    } else {
        closest - 3
    };
    start..start + INTERPOLATION_VECTORS
}

/// Binary search for the state vector closest in time to `target`
fn binary_search_closest_time(state_vectors: &[OrbitStateVector], target: f64) -> usize {
    if state_vectors.is_empty() {
        return 0;
    }

    let mut left = 0;
    let mut right = state_vectors.len() - 1;

    while left < right {
        let mid = left + (right - left) / 2;
        if state_vectors[mid].time < target {
            left = mid + 1;
        } else {
            right = mid;
        }
    }

    if left > 0 {
        let left_dist = (state_vectors[left].time - target).abs();
        let left_minus_1_dist = (state_vectors[left - 1].time - target).abs();
        if left_minus_1_dist < left_dist {
            return left - 1;
        }
    }

    left
}

/// Zero-Doppler solution for a ground point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestApproach {
    pub azimuth_time: f64,
    /// One-way slant range time
    pub range_time: f64,
}

/// Polynomial fit of x, y, z against normalized time over a fixed vector subset
#[derive(Debug, Clone)]
pub struct OrbitInterpolator {
    reference_time: f64,
    coeff_x: Vec<f64>,
    coeff_y: Vec<f64>,
    coeff_z: Vec<f64>,
}

impl OrbitInterpolator {
    pub fn fit(state_vectors: &[OrbitStateVector], degree: usize) -> SarResult<Self> {
        if state_vectors.len() < degree + 1 {
            return Err(SarError::Geometry(format!(
                "{} orbit state vectors cannot support degree {} interpolation",
                state_vectors.len(),
                degree
            )));
        }

        let reference_time = state_vectors[state_vectors.len() / 2].time;
        let t: Vec<f64> = state_vectors
            .iter()
            .map(|sv| (sv.time - reference_time) / TIME_SCALE)
            .collect();
        let axis = |k: usize| -> Vec<f64> { state_vectors.iter().map(|sv| sv.position[k]).collect() };

        let fit_axis = |k: usize| {
            polyfit_1d(&t, &axis(k), degree).map_err(|e| {
                SarError::Geometry(format!("orbit polynomial fit failed: {}", e))
            })
        };

        Ok(Self {
            reference_time,
            coeff_x: fit_axis(0)?,
            coeff_y: fit_axis(1)?,
            coeff_z: fit_axis(2)?,
        })
    }

    pub fn reference_time(&self) -> f64 {
        self.reference_time
    }

    pub fn position_at_time(&self, time: f64) -> [f64; 3] {
        self.position_at_offset(time - self.reference_time)
    }

    pub fn velocity_at_time(&self, time: f64) -> [f64; 3] {
        self.velocity_at_offset(time - self.reference_time)
    }

    pub fn acceleration_at_time(&self, time: f64) -> [f64; 3] {
        self.acceleration_at_offset(time - self.reference_time)
    }

    // Offsets are seconds from `reference_time`.
    fn position_at_offset(&self, offset: f64) -> [f64; 3] {
        let t = offset / TIME_SCALE;
        [
            polyval_1d(t, &self.coeff_x),
            polyval_1d(t, &self.coeff_y),
            polyval_1d(t, &self.coeff_z),
        ]
    }

    fn velocity_at_offset(&self, offset: f64) -> [f64; 3] {
        let t = offset / TIME_SCALE;
        [
            derivative(t, &self.coeff_x) / TIME_SCALE,
            derivative(t, &self.coeff_y) / TIME_SCALE,
            derivative(t, &self.coeff_z) / TIME_SCALE,
        ]
    }

    fn acceleration_at_offset(&self, offset: f64) -> [f64; 3] {
        let t = offset / TIME_SCALE;
        let scale = TIME_SCALE * TIME_SCALE;
        [
            second_derivative(t, &self.coeff_x) / scale,
            second_derivative(t, &self.coeff_y) / scale,
            second_derivative(t, &self.coeff_z) / scale,
        ]
    }

    /// Ground position of a (line, pixel) at the given ellipsoid height.
    ///
    /// Newton solve of the Doppler, range and ellipsoid equations, starting at
    /// the approximate scene centre.
    pub fn ground_position(
        &self,
        line: f64,
        pixel: f64,
        height: f64,
        geometry: &SlcGeometry,
    ) -> SarResult<[f64; 3]> {
        let azimuth_time = geometry.line_to_azimuth_time(line);
        let range_time = geometry.pixel_to_slant_range_time(pixel);

        let satellite = self.position_at_time(azimuth_time);
        let velocity = self.velocity_at_time(azimuth_time);

        let ell_a = WGS84_A + height;
        let ell_b = WGS84_B + height;
        let slant_range = SPEED_OF_LIGHT * range_time;

        let mut point = geometry.scene_centre_xyz;
        for _ in 0..MAX_ITERATIONS {
            let d = sub(&point, &satellite);

            let residual = [
                -dot(&velocity, &d),
                -(dot(&d, &d) - slant_range * slant_range),
                -((point[0] * point[0] + point[1] * point[1]) / (ell_a * ell_a)
                    + (point[2] / ell_b).powi(2)
                    - 1.0),
            ];
            let partials = [
                velocity,
                [2.0 * d[0], 2.0 * d[1], 2.0 * d[2]],
                [
                    2.0 * point[0] / (ell_a * ell_a),
                    2.0 * point[1] / (ell_a * ell_a),
                    2.0 * point[2] / (ell_b * ell_b),
                ],
            ];

            let step = solve33(partials, residual)?;
            point = [point[0] + step[0], point[1] + step[1], point[2] + step[2]];

            if step.iter().all(|s| s.abs() < POSITION_CRITERION) {
                return Ok(point);
            }
        }

        Err(SarError::Geometry(format!(
            "line/pixel to ground position did not converge after {} iterations (line {}, pixel {})",
            MAX_ITERATIONS, line, pixel
        )))
    }

    /// Zero-Doppler azimuth time and one-way range time of `point`, searched
    /// from the scene centre time of `geometry`.
    pub fn time_of_closest_approach(
        &self,
        point: &[f64; 3],
        geometry: &SlcGeometry,
    ) -> SarResult<ClosestApproach> {
        let mut offset = geometry.scene_centre_azimuth_time() - self.reference_time;

        for _ in 0..MAX_ITERATIONS {
            let satellite = self.position_at_offset(offset);
            let velocity = self.velocity_at_offset(offset);
            let acceleration = self.acceleration_at_offset(offset);
            let d = sub(point, &satellite);

            let denominator = dot(&acceleration, &d) - dot(&velocity, &velocity);
            if denominator == 0.0 {
                return Err(SarError::Geometry(
                    "zero-Doppler search hit a stationary point".to_string(),
                ));
            }
            let step = dot(&velocity, &d) / denominator;
            offset -= step;

            if step.abs() < TIME_CRITERION {
                let satellite = self.position_at_offset(offset);
                return Ok(ClosestApproach {
                    azimuth_time: self.reference_time + offset,
                    range_time: norm(&sub(point, &satellite)) / SPEED_OF_LIGHT,
                });
            }
        }

        Err(SarError::Geometry(format!(
            "zero-Doppler time search did not converge after {} iterations for point [{:.1}, {:.1}, {:.1}]",
            MAX_ITERATIONS, point[0], point[1], point[2]
        )))
    }
}

fn derivative(t: f64, coefficients: &[f64]) -> f64 {
    coefficients
        .iter()
        .enumerate()
        .skip(1)
        .rev()
        .fold(0.0, |acc, (k, &c)| acc * t + k as f64 * c)
}

fn second_derivative(t: f64, coefficients: &[f64]) -> f64 {
    coefficients
        .iter()
        .enumerate()
        .skip(2)
        .rev()
        .fold(0.0, |acc, (k, &c)| acc * t + (k * (k - 1)) as f64 * c)
}
