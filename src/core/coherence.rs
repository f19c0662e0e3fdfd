use crate::core::geometry::PixelSpacing;
use crate::types::{SarComplex, SarError, SarRealImage, SarResult};
use ndarray::{s, Array2, ArrayView2};
use num_complex::Complex64;
use std::ops::{Add, Sub};

/// Relative window power below which a window is treated as empty
pub const POWER_FLOOR: f64 = 1e-10;

/// Azimuth x range window for coherence estimation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoherenceWindow {
    pub azimuth: usize,
    pub range: usize,
}

impl CoherenceWindow {
    pub fn new(azimuth: usize, range: usize) -> SarResult<Self> {
        if azimuth == 0 || range == 0 {
            return Err(SarError::Validation(format!(
                "coherence window must be at least 1x1, got {}x{}",
                azimuth, range
            )));
        }
        Ok(Self { azimuth, range })
    }

    /// Lines added before the first output line
    pub fn leading_lines(&self) -> usize {
        (self.azimuth - 1) / 2
    }

    pub fn trailing_lines(&self) -> usize {
        self.azimuth / 2
    }

    pub fn leading_pixels(&self) -> usize {
        (self.range - 1) / 2
    }

    pub fn trailing_pixels(&self) -> usize {
        self.range / 2
    }
}

/// Derive a window that covers a roughly square ground footprint.
///
/// The azimuth size follows from the range size and the ratio of ground range
/// to azimuth spacing. Without spacing metadata the window is square in pixels.
pub fn derive_square_pixel_window(range_window: usize, spacing: Option<&PixelSpacing>) -> (usize, usize) {
    let spacing = match spacing {
        Some(s) if s.range_spacing > 0.0 && s.azimuth_spacing > 0.0 => s,
        _ => return (range_window, range_window),
    };

    let ground_range_spacing = if spacing.ground_range {
        spacing.range_spacing
    } else {
        spacing.range_spacing / spacing.incidence_angle_mid.to_radians().sin()
    };

    let azimuth = range_window as f64 * ground_range_spacing / spacing.azimuth_spacing;
    if azimuth < 1.0 {
        let range = (spacing.azimuth_spacing / ground_range_spacing).round().max(1.0) as usize;
        (2, range)
    } else {
        (azimuth.round() as usize, range_window)
    }
}

/// Coherence of two border-extended complex tiles.
///
/// The inputs carry `window - 1` extra lines and pixels around the output
/// region (leading `(w-1)/2`, trailing `w/2`), so the result is
/// `(rows - azimuth + 1) x (cols - range + 1)`. Range sums are rebuilt per
/// window and then carried along azimuth as running sums. Window powers below
/// `POWER_FLOOR` times the tile's largest window power count as empty and
/// give 0.
pub fn coherence_extended(
    master: ArrayView2<SarComplex>,
    secondary: ArrayView2<SarComplex>,
    window: CoherenceWindow,
) -> SarResult<SarRealImage> {
    if master.dim() != secondary.dim() {
        return Err(SarError::Processing(format!(
            "master {:?} and secondary {:?} tiles differ in shape",
            master.dim(),
            secondary.dim()
        )));
    }
    let (rows, cols) = master.dim();
    if rows < window.azimuth || cols < window.range {
        return Err(SarError::Processing(format!(
            "tile {}x{} is smaller than the {}x{} coherence window",
            rows, cols, window.azimuth, window.range
        )));
    }

    let mut cross = Array2::<Complex64>::zeros((rows, cols));
    let mut master_power = Array2::<f64>::zeros((rows, cols));
    let mut secondary_power = Array2::<f64>::zeros((rows, cols));
    for ((r, c), m) in master.indexed_iter() {
        let m = Complex64::new(m.re as f64, m.im as f64);
        let sv = secondary[[r, c]];
        let sv = Complex64::new(sv.re as f64, sv.im as f64);
        cross[[r, c]] = m * sv.conj();
        master_power[[r, c]] = m.norm_sqr();
        secondary_power[[r, c]] = sv.norm_sqr();
    }

    let cross = moving_sum(&cross, window);
    let master_power = moving_sum(&master_power, window);
    let secondary_power = moving_sum(&secondary_power, window);

    let master_floor = POWER_FLOOR * master_power.fold(0.0f64, |m, &v| m.max(v));
    let secondary_floor = POWER_FLOOR * secondary_power.fold(0.0f64, |m, &v| m.max(v));

    let mut coherence = Array2::<f32>::zeros(cross.dim());
    for ((r, c), value) in coherence.indexed_iter_mut() {
        let (pm, ps) = (master_power[[r, c]], secondary_power[[r, c]]);
        *value = if pm > master_floor && ps > secondary_floor {
            (cross[[r, c]].norm() / (pm * ps).sqrt()).clamp(0.0, 1.0) as f32
        } else {
            0.0
        };
    }

    Ok(coherence)
}

/// Coherence with output of the same shape as the inputs, zero-padding the borders.
pub fn complex_coherence(
    master: ArrayView2<SarComplex>,
    secondary: ArrayView2<SarComplex>,
    window: CoherenceWindow,
) -> SarResult<SarRealImage> {
    if secondary.dim() != master.dim() {
        return Err(SarError::Processing(format!(
            "master {:?} and secondary {:?} tiles differ in shape",
            master.dim(),
            secondary.dim()
        )));
    }

    let (rows, cols) = master.dim();
    let padded_dim = (rows + window.azimuth - 1, cols + window.range - 1);
    let (l0, p0) = (window.leading_lines(), window.leading_pixels());

    let mut master_padded = Array2::<SarComplex>::zeros(padded_dim);
    master_padded
        .slice_mut(s![l0..l0 + rows, p0..p0 + cols])
        .assign(&master);
    let mut secondary_padded = Array2::<SarComplex>::zeros(padded_dim);
    secondary_padded
        .slice_mut(s![l0..l0 + rows, p0..p0 + cols])
        .assign(&secondary);

    coherence_extended(master_padded.view(), secondary_padded.view(), window)
}

/// Correlation coefficient of two real (detected) images.
///
/// Each pixel uses the pixels within `window/2` on every side, clipped to the
/// image, and `|sum(m*s)| / sqrt(sum(m^2) * sum(s^2))`. A window with no
/// energy in either image (relative to `POWER_FLOOR` of the image total)
/// yields NaN.
pub fn detected_coherence(
    master: ArrayView2<f32>,
    secondary: ArrayView2<f32>,
    window: CoherenceWindow,
) -> SarResult<SarRealImage> {
    if master.dim() != secondary.dim() {
        return Err(SarError::Processing(format!(
            "master {:?} and secondary {:?} images differ in shape",
            master.dim(),
            secondary.dim()
        )));
    }
    let (rows, cols) = master.dim();

    let cross = summed_area(rows, cols, |r, c| master[[r, c]] as f64 * secondary[[r, c]] as f64);
    let master_power = summed_area(rows, cols, |r, c| (master[[r, c]] as f64).powi(2));
    let secondary_power = summed_area(rows, cols, |r, c| (secondary[[r, c]] as f64).powi(2));

    let half_az = window.azimuth / 2;
    let half_rg = window.range / 2;
    let master_floor = POWER_FLOOR * master_power[[rows, cols]];
    let secondary_floor = POWER_FLOOR * secondary_power[[rows, cols]];

    let mut coherence = Array2::<f32>::zeros((rows, cols));
    for ((r, c), value) in coherence.indexed_iter_mut() {
        let r0 = r.saturating_sub(half_az);
        let r1 = (r + half_az + 1).min(rows);
        let c0 = c.saturating_sub(half_rg);
        let c1 = (c + half_rg + 1).min(cols);

        let sum_ms = window_sum(&cross, r0, r1, c0, c1);
        let sum_mm = window_sum(&master_power, r0, r1, c0, c1);
        let sum_ss = window_sum(&secondary_power, r0, r1, c0, c1);

        *value = if sum_mm > master_floor && sum_ss > secondary_floor {
            (sum_ms.abs() / (sum_mm * sum_ss).sqrt()).min(1.0) as f32
        } else {
            f32::NAN
        };
    }

    Ok(coherence)
}

/// Window sums over every full window position.
///
/// Each range sum is added up afresh so rows without signal sum to exactly
/// zero. The azimuth pass is a running sum.
fn moving_sum<T>(data: &Array2<T>, window: CoherenceWindow) -> Array2<T>
where
    T: Copy + Default + Add<Output = T> + Sub<Output = T>,
{
    let (rows, cols) = data.dim();
    let out_cols = cols - window.range + 1;
    let out_rows = rows - window.azimuth + 1;

    let mut along_range = Array2::<T>::from_elem((rows, out_cols), T::default());
    for r in 0..rows {
        for c in 0..out_cols {
            along_range[[r, c]] = data
                .slice(s![r, c..c + window.range])
                .iter()
                .fold(T::default(), |sum, &v| sum + v);
        }
    }

    let mut result = Array2::<T>::from_elem((out_rows, out_cols), T::default());
    for c in 0..out_cols {
        let mut sum = T::default();
        for r in 0..window.azimuth {
            sum = sum + along_range[[r, c]];
        }
        result[[0, c]] = sum;
        for r in 1..out_rows {
            sum = sum + along_range[[r + window.azimuth - 1, c]] - along_range[[r - 1, c]];
            result[[r, c]] = sum;
        }
    }

    result
}

/// Summed-area table with a leading zero row and column
fn summed_area(rows: usize, cols: usize, value: impl Fn(usize, usize) -> f64) -> Array2<f64> {
    let mut table = Array2::<f64>::zeros((rows + 1, cols + 1));
    for r in 0..rows {
        for c in 0..cols {
            table[[r + 1, c + 1]] = value(r, c) + table[[r, c + 1]] + table[[r + 1, c]] - table[[r, c]];
        }
    }
    table
}

/// Sum over rows `r0..r1` and columns `c0..c1` (exclusive ends)
fn window_sum(table: &Array2<f64>, r0: usize, r1: usize, c0: usize, c1: usize) -> f64 {
    table[[r1, c1]] - table[[r0, c1]] - table[[r1, c0]] + table[[r0, c0]]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_window_margins() {
        let w = CoherenceWindow::new(5, 4).unwrap();
        assert_eq!((w.leading_lines(), w.trailing_lines()), (2, 2));
        assert_eq!((w.leading_pixels(), w.trailing_pixels()), (1, 2));
        assert!(CoherenceWindow::new(0, 3).is_err());
    }

    #[test]
    fn test_moving_sum_matches_direct_sum() {
        let data = Array2::from_shape_fn((7, 9), |(r, c)| (r * 9 + c) as f64);
        let window = CoherenceWindow::new(3, 4).unwrap();
        let sums = moving_sum(&data, window);
        assert_eq!(sums.dim(), (5, 6));
        for ((r, c), &v) in sums.indexed_iter() {
            let direct: f64 = data.slice(s![r..r + 3, c..c + 4]).sum();
            assert_abs_diff_eq!(v, direct, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_constant_phase_offset_is_fully_coherent() {
        let master = Array2::from_shape_fn((16, 16), |(r, c)| {
            SarComplex::from_polar(1.0 + (r % 3) as f32, 0.1 * (r * c) as f32)
        });
        let secondary = master.mapv(|v| v * SarComplex::from_polar(1.0, 0.7));
        let window = CoherenceWindow::new(3, 3).unwrap();
        let coh = complex_coherence(master.view(), secondary.view(), window).unwrap();
        for &v in coh.iter() {
            assert_abs_diff_eq!(v, 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_zero_input_gives_zero() {
        let zeros = Array2::<SarComplex>::zeros((8, 8));
        let window = CoherenceWindow::new(3, 3).unwrap();
        let coh = complex_coherence(zeros.view(), zeros.view(), window).unwrap();
        assert!(coh.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_empty_windows_after_strong_signal_are_zero() {
        let mut seed = 7u64;
        let mut noise = || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 11) as f64 / (1u64 << 53) as f64
        };
        let mut master = Array2::<SarComplex>::zeros((48, 70));
        let mut secondary = Array2::<SarComplex>::zeros((48, 70));
        for r in 0..30 {
            for c in 0..40 {
                master[[r, c]] = SarComplex::from_polar((3e4 * noise()) as f32, (6.28 * noise()) as f32);
                secondary[[r, c]] = SarComplex::from_polar((3e4 * noise()) as f32, (6.28 * noise()) as f32);
            }
        }
        let window = CoherenceWindow::new(10, 10).unwrap();
        let coh = coherence_extended(master.view(), secondary.view(), window).unwrap();
        for ((r, c), &v) in coh.indexed_iter() {
            assert!((0.0..=1.0).contains(&v));
            if r >= 30 || c >= 40 {
                assert_eq!(v, 0.0, "window at ({}, {}) holds no signal", r, c);
            }
        }
    }

    #[test]
    fn test_detected_coherence_nan_on_empty_window() {
        let zeros = Array2::<f32>::zeros((6, 6));
        let window = CoherenceWindow::new(3, 3).unwrap();
        let coh = detected_coherence(zeros.view(), zeros.view(), window).unwrap();
        assert!(coh.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_detected_coherence_clips_at_corner() {
        let master = Array2::from_shape_fn((5, 5), |(r, c)| 1.0 + (r + 2 * c) as f32);
        let window = CoherenceWindow::new(3, 3).unwrap();
        let coh = detected_coherence(master.view(), master.view(), window).unwrap();
        for &v in coh.iter() {
            assert_abs_diff_eq!(v, 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_square_pixel_window() {
        let spacing = PixelSpacing {
            range_spacing: 2.33,
            azimuth_spacing: 13.9,
            incidence_angle_mid: 39.0,
            ground_range: false,
        };
        // ground range ~3.70 m, 10 * 3.70 / 13.9 ~ 2.66
        assert_eq!(derive_square_pixel_window(10, Some(&spacing)), (3, 10));
        // 2 * 3.70 / 13.9 < 1
        assert_eq!(derive_square_pixel_window(2, Some(&spacing)), (2, 4));
        assert_eq!(derive_square_pixel_window(7, None), (7, 7));
    }
}
