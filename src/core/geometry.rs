use crate::types::{Polarization, SarError, SarResult, SPEED_OF_LIGHT, WGS84_A, WGS84_B};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Pixel spacing metadata used to derive a square-pixel coherence window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelSpacing {
    /// Range pixel spacing in meters (slant or ground, see `ground_range`)
    pub range_spacing: f64,
    /// Azimuth pixel spacing in meters
    pub azimuth_spacing: f64,
    /// Incidence angle at mid swath in degrees
    pub incidence_angle_mid: f64,
    /// True if `range_spacing` is already ground range
    pub ground_range: bool,
}

/// Per-image geometry of a single look complex acquisition.
///
/// Times are seconds since the product time epoch. Range times are one-way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlcGeometry {
    /// Radar wavelength in meters
    pub radar_wavelength: f64,
    /// Azimuth time of line 0
    pub first_line_time: f64,
    /// Azimuth time between consecutive lines
    pub line_time_interval: f64,
    /// One-way slant range time of pixel 0
    pub slant_range_time_first_pixel: f64,
    /// One-way slant range time between consecutive pixels
    pub range_time_interval: f64,
    pub num_lines: usize,
    pub num_pixels: usize,
    pub acquisition_date: NaiveDate,
    pub polarization: Option<Polarization>,
    pub sub_swath_index: Option<usize>,
    /// Approximate ECEF position of the scene centre on the ellipsoid
    pub scene_centre_xyz: [f64; 3],
    pub spacing: Option<PixelSpacing>,
}

impl SlcGeometry {
    /// Build a geometry from a slant range pixel spacing in meters.
    #[allow(clippy::too_many_arguments)]
    pub fn from_range_spacing(
        radar_wavelength: f64,
        first_line_time: f64,
        line_time_interval: f64,
        slant_range_time_first_pixel: f64,
        range_spacing: f64,
        num_lines: usize,
        num_pixels: usize,
        acquisition_date: NaiveDate,
        scene_centre_xyz: [f64; 3],
    ) -> Self {
        Self {
            radar_wavelength,
            first_line_time,
            line_time_interval,
            slant_range_time_first_pixel,
            range_time_interval: range_spacing / SPEED_OF_LIGHT,
            num_lines,
            num_pixels,
            acquisition_date,
            polarization: None,
            sub_swath_index: None,
            scene_centre_xyz,
            spacing: None,
        }
    }

    pub fn with_polarization(mut self, polarization: Polarization) -> Self {
        self.polarization = Some(polarization);
        self
    }

    pub fn with_sub_swath(mut self, sub_swath_index: usize) -> Self {
        self.sub_swath_index = Some(sub_swath_index);
        self
    }

    pub fn with_spacing(mut self, spacing: PixelSpacing) -> Self {
        self.spacing = Some(spacing);
        self
    }

    /// Check the values the geometry solvers divide by or iterate on
    pub fn validate(&self) -> SarResult<()> {
        if !(self.radar_wavelength > 0.0) {
            return Err(SarError::Validation(format!(
                "radar wavelength must be positive, got {}",
                self.radar_wavelength
            )));
        }
        if !(self.line_time_interval > 0.0) || !(self.range_time_interval > 0.0) {
            return Err(SarError::Validation(format!(
                "line ({}) and range ({}) time intervals must be positive",
                self.line_time_interval, self.range_time_interval
            )));
        }
        if !(self.slant_range_time_first_pixel > 0.0) {
            return Err(SarError::Validation(format!(
                "slant range time to first pixel must be positive, got {}",
                self.slant_range_time_first_pixel
            )));
        }
        if self.num_lines < 2 || self.num_pixels < 2 {
            return Err(SarError::Validation(format!(
                "image extent {} x {} is too small",
                self.num_lines, self.num_pixels
            )));
        }
        Ok(())
    }

    /// Azimuth time of a (fractional) line
    pub fn line_to_azimuth_time(&self, line: f64) -> f64 {
        self.first_line_time + line * self.line_time_interval
    }

    /// One-way slant range time of a (fractional) pixel
    pub fn pixel_to_slant_range_time(&self, pixel: f64) -> f64 {
        self.slant_range_time_first_pixel + pixel * self.range_time_interval
    }

    /// Azimuth time of the middle line, used to seed the zero-Doppler search
    pub fn scene_centre_azimuth_time(&self) -> f64 {
        self.line_to_azimuth_time(0.5 * (self.num_lines as f64 - 1.0))
    }

    /// Phase per unit of one-way range time, `-4*pi*c/lambda`
    pub fn phase_per_range_time(&self) -> f64 {
        -4.0 * std::f64::consts::PI * SPEED_OF_LIGHT / self.radar_wavelength
    }
}

/// Convert geodetic latitude/longitude (degrees) and ellipsoid height to WGS84 ECEF
pub fn geodetic_to_ecef(lat: f64, lon: f64, height: f64) -> [f64; 3] {
    let e2 = 1.0 - (WGS84_B * WGS84_B) / (WGS84_A * WGS84_A);

    let lat_rad = lat.to_radians();
    let lon_rad = lon.to_radians();

    let n = WGS84_A / (1.0 - e2 * lat_rad.sin().powi(2)).sqrt();

    let x = (n + height) * lat_rad.cos() * lon_rad.cos();
    let y = (n + height) * lat_rad.cos() * lon_rad.sin();
    let z = (n * (1.0 - e2) + height) * lat_rad.sin();

    [x, y, z]
}

pub(crate) fn sub(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

pub(crate) fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub(crate) fn norm(a: &[f64; 3]) -> f64 {
    dot(a, a).sqrt()
}

/// Solve a 3x3 linear system by Gaussian elimination with partial pivoting
pub(crate) fn solve33(a: [[f64; 3]; 3], b: [f64; 3]) -> SarResult<[f64; 3]> {
    let mut m = a;
    let mut r = b;

    for col in 0..3 {
        let pivot = (col..3)
            .max_by(|&i, &j| m[i][col].abs().total_cmp(&m[j][col].abs()))
            .unwrap_or(col);
        if m[pivot][col].abs() < f64::MIN_POSITIVE {
            return Err(SarError::Geometry(
                "singular 3x3 system in geometry solve".to_string(),
            ));
        }
        m.swap(col, pivot);
        r.swap(col, pivot);

        for row in (col + 1)..3 {
            let factor = m[row][col] / m[col][col];
            for k in col..3 {
                m[row][k] -= factor * m[col][k];
            }
            r[row] -= factor * r[col];
        }
    }

    let mut x = [0.0; 3];
    for row in (0..3).rev() {
        let mut sum = r[row];
        for k in (row + 1)..3 {
            sum -= m[row][k] * x[k];
        }
        x[row] = sum / m[row][row];
    }
    Ok(x)
}
