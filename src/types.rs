use ndarray::Array2;
use num_complex::Complex;
use serde::{Deserialize, Serialize};

/// Complex-valued SAR data type (I + jQ)
pub type SarComplex = Complex<f32>;

/// Real-valued coherence or phase data
pub type SarReal = f32;

/// 2D complex SAR data array (azimuth x range)
pub type SarImage = Array2<SarComplex>;

/// 2D real SAR data array (azimuth x range)
pub type SarRealImage = Array2<SarReal>;

/// Speed of light in vacuum (m/s)
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// WGS84 semi-major axis (m)
pub const WGS84_A: f64 = 6_378_137.0;

/// WGS84 semi-minor axis (m)
pub const WGS84_B: f64 = 6_356_752.314_245;

/// Polarization modes for Sentinel-1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Polarization {
    VV,
    VH,
    HV,
    HH,
}

impl std::fmt::Display for Polarization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Polarization::VV => write!(f, "VV"),
            Polarization::VH => write!(f, "VH"),
            Polarization::HV => write!(f, "HV"),
            Polarization::HH => write!(f, "HH"),
        }
    }
}

impl std::str::FromStr for Polarization {
    type Err = SarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "VV" => Ok(Polarization::VV),
            "VH" => Ok(Polarization::VH),
            "HV" => Ok(Polarization::HV),
            "HH" => Ok(Polarization::HH),
            _ => Err(SarError::Validation(format!("Invalid polarization: {}", s))),
        }
    }
}

/// Orbit state vector: time-tagged satellite position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrbitStateVector {
    /// Seconds since the product time epoch
    pub time: f64,
    /// [x, y, z] in meters (ECEF)
    pub position: [f64; 3],
}

impl OrbitStateVector {
    pub fn new(time: f64, position: [f64; 3]) -> Self {
        Self { time, position }
    }
}

/// Inclusive pixel rectangle in image coordinates.
///
/// `x` runs along range (pixels), `y` along azimuth (lines). Coordinates may be
/// negative when a window is border-extended past the image origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: i64,
    pub y: i64,
    pub width: usize,
    pub height: usize,
}

impl PixelRect {
    pub fn new(x: i64, y: i64, width: usize, height: usize) -> Self {
        Self { x, y, width, height }
    }

    /// First line (inclusive)
    pub fn first_line(&self) -> i64 {
        self.y
    }

    /// Last line (inclusive)
    pub fn last_line(&self) -> i64 {
        self.y + self.height as i64 - 1
    }

    pub fn first_pixel(&self) -> i64 {
        self.x
    }

    pub fn last_pixel(&self) -> i64 {
        self.x + self.width as i64 - 1
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of pixels covered
    pub fn area(&self) -> usize {
        self.width * self.height
    }

    /// Grow the rectangle by the given margins on each side.
    pub fn extend(&self, lines_before: usize, lines_after: usize, pixels_before: usize, pixels_after: usize) -> Self {
        Self {
            x: self.x - pixels_before as i64,
            y: self.y - lines_before as i64,
            width: self.width + pixels_before + pixels_after,
            height: self.height + lines_before + lines_after,
        }
    }

    /// Restrict the rectangle to the inclusive line range, keeping the pixel extent.
    pub fn clip_lines(&self, first_line: i64, last_line: i64) -> Option<Self> {
        let start = self.first_line().max(first_line);
        let end = self.last_line().min(last_line);
        if self.is_empty() || start > end {
            return None;
        }
        Some(Self {
            x: self.x,
            y: start,
            width: self.width,
            height: (end - start + 1) as usize,
        })
    }

    /// Same rectangle expressed relative to a new line origin.
    pub fn shift_lines(&self, line_origin: i64) -> Self {
        Self {
            y: self.y - line_origin,
            ..*self
        }
    }
}

impl std::fmt::Display for PixelRect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[lines {}..={}, pixels {}..={}]",
            self.first_line(),
            self.last_line(),
            self.first_pixel(),
            self.last_pixel()
        )
    }
}

/// Error types for interferometric processing
#[derive(Debug, thiserror::Error)]
pub enum SarError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Geometry error: {0}")]
    Geometry(String),

    #[error("Least-squares fit error: {0}")]
    Fit(String),

    #[error("DEM resolution error: {0}")]
    DemResolution(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Processing cancelled")]
    Cancelled,
}

/// Result type for SAR operations
pub type SarResult<T> = Result<T, SarError>;
