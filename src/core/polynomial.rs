//! Least-squares polynomial fitting shared by the orbit model and the
//! flat-earth estimator.
//!
//! 2-D polynomials are stored in total-degree monomial order:
//! `A00 A10 A01 A20 A11 A02 A30 A21 A12 A03 ...` where `Aij` multiplies
//! `line^i * pixel^j` in normalized coordinates.

use crate::types::{SarError, SarResult};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Relative threshold on the diagonal of R below which a column is treated
/// as linearly dependent.
const RANK_TOLERANCE: f64 = 1e-10;

/// Number of coefficients of a 2-D polynomial of total degree `degree`
pub fn number_of_coefficients(degree: usize) -> usize {
    (degree + 1) * (degree + 2) / 2
}

/// Inverse of [`number_of_coefficients`]; `None` if `count` is not triangular.
pub fn degree_from_coefficients(count: usize) -> Option<usize> {
    (0..=count).find(|&d| number_of_coefficients(d) == count)
}

/// Map `value` from `[min, max]` onto `[-2, 2]`.
pub fn normalize(value: f64, min: f64, max: f64) -> f64 {
    (value - 0.5 * (min + max)) / (0.25 * (max - min))
}

/// Evaluate a 1-D polynomial `c0 + c1*x + c2*x^2 + ...` (Horner).
pub fn polyval_1d(x: f64, coefficients: &[f64]) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, &c| acc * x + c)
}

/// Fit a 1-D polynomial of the given degree through `(t, y)` by least squares.
pub fn polyfit_1d(t: &[f64], y: &[f64], degree: usize) -> SarResult<Vec<f64>> {
    if t.len() != y.len() {
        return Err(SarError::Processing(format!(
            "polyfit: abscissa ({}) and ordinate ({}) lengths differ",
            t.len(),
            y.len()
        )));
    }
    if t.len() < degree + 1 {
        return Err(SarError::Fit(format!(
            "polyfit: {} points cannot determine a degree {} polynomial",
            t.len(),
            degree
        )));
    }

    let mut design = Array2::<f64>::zeros((t.len(), degree + 1));
    for (i, &ti) in t.iter().enumerate() {
        let mut power = 1.0;
        for j in 0..=degree {
            design[[i, j]] = power;
            power *= ti;
        }
    }

    let solution = solve_least_squares(&design, &Array1::from(y.to_vec()))?;
    Ok(solution.to_vec())
}

/// Solve `min ||A x - y||` with Householder QR.
///
/// Fails with [`SarError::Fit`] when `A` has fewer rows than columns or is
/// numerically rank deficient; never returns a silent zero solution.
pub fn solve_least_squares(a: &Array2<f64>, y: &Array1<f64>) -> SarResult<Array1<f64>> {
    let (rows, cols) = a.dim();
    if y.len() != rows {
        return Err(SarError::Processing(format!(
            "least squares: design matrix has {} rows but {} observations",
            rows,
            y.len()
        )));
    }
    if rows < cols {
        return Err(SarError::Fit(format!(
            "least squares: {} observations for {} unknowns",
            rows, cols
        )));
    }

    let mut r = a.to_owned();
    let mut b = y.to_owned();
    let mut v = vec![0.0; rows];

    for k in 0..cols {
        let norm = (k..rows).map(|i| r[[i, k]] * r[[i, k]]).sum::<f64>().sqrt();
        if norm == 0.0 {
            continue;
        }
        let alpha = if r[[k, k]] > 0.0 { -norm } else { norm };

        for i in k..rows {
            v[i] = r[[i, k]];
        }
        v[k] -= alpha;
        let v_norm2: f64 = (k..rows).map(|i| v[i] * v[i]).sum();
        if v_norm2 == 0.0 {
            continue;
        }

        for j in k..cols {
            let dot: f64 = (k..rows).map(|i| v[i] * r[[i, j]]).sum();
            let f = 2.0 * dot / v_norm2;
            for i in k..rows {
                r[[i, j]] -= f * v[i];
            }
        }
        let dot: f64 = (k..rows).map(|i| v[i] * b[i]).sum();
        let f = 2.0 * dot / v_norm2;
        for i in k..rows {
            b[i] -= f * v[i];
        }
    }

    let max_diag = (0..cols).map(|k| r[[k, k]].abs()).fold(0.0, f64::max);
    if max_diag == 0.0 {
        return Err(SarError::Fit("least squares: design matrix is zero".to_string()));
    }
    for k in 0..cols {
        if r[[k, k]].abs() <= RANK_TOLERANCE * max_diag {
            return Err(SarError::Fit(format!(
                "least squares: design matrix is rank deficient (column {} of {})",
                k, cols
            )));
        }
    }

    let mut x = Array1::<f64>::zeros(cols);
    for k in (0..cols).rev() {
        let mut sum = b[k];
        for j in (k + 1)..cols {
            sum -= r[[k, j]] * x[j];
        }
        x[k] = sum / r[[k, k]];
    }

    Ok(x)
}

/// Line/pixel extent used to normalize coordinates before fitting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitWindow {
    pub min_line: f64,
    pub max_line: f64,
    pub min_pixel: f64,
    pub max_pixel: f64,
}

impl FitWindow {
    pub fn new(min_line: f64, max_line: f64, min_pixel: f64, max_pixel: f64) -> SarResult<Self> {
        if !(max_line > min_line) || !(max_pixel > min_pixel) {
            return Err(SarError::Validation(format!(
                "degenerate fit window: lines {}..{}, pixels {}..{}",
                min_line, max_line, min_pixel, max_pixel
            )));
        }
        Ok(Self {
            min_line,
            max_line,
            min_pixel,
            max_pixel,
        })
    }

    pub fn normalize_line(&self, line: f64) -> f64 {
        normalize(line, self.min_line, self.max_line)
    }

    pub fn normalize_pixel(&self, pixel: f64) -> f64 {
        normalize(pixel, self.min_pixel, self.max_pixel)
    }
}

/// 2-D polynomial in normalized (line, pixel) together with the window that
/// defines the normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polynomial2D {
    degree: usize,
    coefficients: Vec<f64>,
    window: FitWindow,
}

impl Polynomial2D {
    pub fn from_coefficients(coefficients: Vec<f64>, window: FitWindow) -> SarResult<Self> {
        let degree = degree_from_coefficients(coefficients.len()).ok_or_else(|| {
            SarError::Validation(format!(
                "{} coefficients do not form a complete 2-D polynomial",
                coefficients.len()
            ))
        })?;
        Ok(Self {
            degree,
            coefficients,
            window,
        })
    }

    /// Least-squares fit through `(line, pixel, value)` samples.
    pub fn fit(samples: &[(f64, f64, f64)], window: FitWindow, degree: usize) -> SarResult<Self> {
        let num_coefficients = number_of_coefficients(degree);
        if samples.len() < num_coefficients {
            return Err(SarError::Fit(format!(
                "{} samples cannot determine {} coefficients of a degree {} polynomial",
                samples.len(),
                num_coefficients,
                degree
            )));
        }

        let mut design = Array2::<f64>::zeros((samples.len(), num_coefficients));
        let mut observations = Array1::<f64>::zeros(samples.len());
        let mut row = vec![0.0; num_coefficients];
        for (i, &(line, pixel, value)) in samples.iter().enumerate() {
            monomials(
                window.normalize_line(line),
                window.normalize_pixel(pixel),
                degree,
                &mut row,
            );
            for (j, &m) in row.iter().enumerate() {
                design[[i, j]] = m;
            }
            observations[i] = value;
        }

        let coefficients = solve_least_squares(&design, &observations)?;
        Ok(Self {
            degree,
            coefficients: coefficients.to_vec(),
            window,
        })
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn window(&self) -> &FitWindow {
        &self.window
    }

    /// Evaluate at a (line, pixel) in the same coordinate frame as the fit.
    pub fn evaluate(&self, line: f64, pixel: f64) -> f64 {
        let l = self.window.normalize_line(line);
        let p = self.window.normalize_pixel(pixel);
        let mut value = 0.0;
        let mut index = 0;
        for j in 0..=self.degree {
            for k in 0..=j {
                value += self.coefficients[index] * l.powi((j - k) as i32) * p.powi(k as i32);
                index += 1;
            }
        }
        value
    }

    /// Evaluate over a regular grid of `lines.len() x pixels.len()` points.
    pub fn evaluate_grid(&self, lines: &[f64], pixels: &[f64]) -> Array2<f64> {
        let line_powers = self.powers(lines, |v| self.window.normalize_line(v));
        let pixel_powers = self.powers(pixels, |v| self.window.normalize_pixel(v));

        let mut grid = Array2::<f64>::zeros((lines.len(), pixels.len()));
        for (r, lp) in line_powers.iter().enumerate() {
            for (c, pp) in pixel_powers.iter().enumerate() {
                let mut value = 0.0;
                let mut index = 0;
                for j in 0..=self.degree {
                    for k in 0..=j {
                        value += self.coefficients[index] * lp[j - k] * pp[k];
                        index += 1;
                    }
                }
                grid[[r, c]] = value;
            }
        }
        grid
    }

    /// Residuals `observed - fitted` at the given samples.
    pub fn residuals(&self, samples: &[(f64, f64, f64)]) -> Vec<f64> {
        samples
            .iter()
            .map(|&(line, pixel, value)| value - self.evaluate(line, pixel))
            .collect()
    }

    fn powers(&self, values: &[f64], normalize: impl Fn(f64) -> f64) -> Vec<Vec<f64>> {
        values
            .iter()
            .map(|&v| {
                let n = normalize(v);
                let mut pows = Vec::with_capacity(self.degree + 1);
                let mut power = 1.0;
                for _ in 0..=self.degree {
                    pows.push(power);
                    power *= n;
                }
                pows
            })
            .collect()
    }
}

/// Fill `row` with the total-degree monomials of (line, pixel).
fn monomials(line: f64, pixel: f64, degree: usize, row: &mut [f64]) {
    let mut index = 0;
    for j in 0..=degree {
        for k in 0..=j {
            row[index] = line.powi((j - k) as i32) * pixel.powi(k as i32);
            index += 1;
        }
    }
}
