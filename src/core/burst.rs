use crate::core::geometry::SlcGeometry;
use crate::types::{PixelRect, SarError, SarResult};
use serde::{Deserialize, Serialize};

/// Timing and extent of one TOPS burst
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BurstDescriptor {
    pub index: usize,
    /// First image line of the burst (inclusive)
    pub first_line: usize,
    /// Last image line of the burst (inclusive)
    pub last_line: usize,
    pub first_line_time: f64,
    pub last_line_time: f64,
    pub samples_per_burst: usize,
    /// One-way slant range time of the first pixel
    pub slant_range_time_first_pixel: f64,
    /// One-way slant range time of the last pixel
    pub slant_range_time_last_pixel: f64,
    /// Ground position of the burst centre, if known
    pub scene_centre_xyz: Option<[f64; 3]>,
}

impl BurstDescriptor {
    /// Burst `index` of a sub-swath made of equally sized bursts stored back to back
    pub fn regular(
        index: usize,
        lines_per_burst: usize,
        first_line_time: f64,
        line_time_interval: f64,
        samples_per_burst: usize,
        slant_range_time_first_pixel: f64,
        range_time_interval: f64,
    ) -> SarResult<Self> {
        if lines_per_burst == 0 || samples_per_burst == 0 {
            return Err(SarError::Validation(format!(
                "Burst {} must have lines and samples, got {} x {}",
                index, lines_per_burst, samples_per_burst
            )));
        }
        let first_line = index * lines_per_burst;
        Ok(Self {
            index,
            first_line,
            last_line: first_line + lines_per_burst - 1,
            first_line_time,
            last_line_time: first_line_time + (lines_per_burst - 1) as f64 * line_time_interval,
            samples_per_burst,
            slant_range_time_first_pixel,
            slant_range_time_last_pixel: slant_range_time_first_pixel
                + (samples_per_burst - 1) as f64 * range_time_interval,
            scene_centre_xyz: None,
        })
    }

    pub fn with_scene_centre(mut self, scene_centre_xyz: [f64; 3]) -> Self {
        self.scene_centre_xyz = Some(scene_centre_xyz);
        self
    }

    pub fn lines_per_burst(&self) -> usize {
        self.last_line - self.first_line + 1
    }

    pub fn contains_line(&self, line: i64) -> bool {
        line >= self.first_line as i64 && line <= self.last_line as i64
    }

    /// Geometry of the burst alone, with line 0 at the burst's first line.
    pub fn local_geometry(&self, image: &SlcGeometry) -> SlcGeometry {
        SlcGeometry {
            first_line_time: self.first_line_time,
            slant_range_time_first_pixel: self.slant_range_time_first_pixel,
            num_lines: self.lines_per_burst(),
            num_pixels: self.samples_per_burst,
            scene_centre_xyz: self.scene_centre_xyz.unwrap_or(image.scene_centre_xyz),
            ..image.clone()
        }
    }
}

/// Part of a requested region that falls inside one burst or inside a gap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BurstSegment {
    Burst { index: usize, rect: PixelRect },
    Gap { rect: PixelRect },
}

impl BurstSegment {
    pub fn rect(&self) -> &PixelRect {
        match self {
            BurstSegment::Burst { rect, .. } | BurstSegment::Gap { rect } => rect,
        }
    }
}

/// Splits output regions of a TOPS sub-swath along burst boundaries
#[derive(Debug, Clone)]
pub struct BurstPartitioner {
    bursts: Vec<BurstDescriptor>,
}

impl BurstPartitioner {
    /// Bursts must be ordered and non-overlapping in line index; gaps are allowed.
    pub fn new(bursts: Vec<BurstDescriptor>) -> SarResult<Self> {
        if bursts.is_empty() {
            return Err(SarError::Validation(
                "No burst information available".to_string(),
            ));
        }

        for (i, burst) in bursts.iter().enumerate() {
            if burst.first_line > burst.last_line {
                return Err(SarError::Validation(format!(
                    "Burst {} has invalid line range: {}-{}",
                    burst.index, burst.first_line, burst.last_line
                )));
            }
            if i > 0 {
                let previous = &bursts[i - 1];
                if burst.first_line <= previous.last_line {
                    return Err(SarError::Validation(format!(
                        "Burst {} (lines {}-{}) overlaps burst {} (lines {}-{})",
                        burst.index,
                        burst.first_line,
                        burst.last_line,
                        previous.index,
                        previous.first_line,
                        previous.last_line
                    )));
                }
                if burst.first_line > previous.last_line + 1 {
                    log::warn!(
                        "Gap of {} lines between burst {} and burst {}",
                        burst.first_line - previous.last_line - 1,
                        previous.index,
                        burst.index
                    );
                }
            }
        }

        log::debug!("Burst partitioner built over {} bursts", bursts.len());
        Ok(Self { bursts })
    }

    pub fn bursts(&self) -> &[BurstDescriptor] {
        &self.bursts
    }

    pub fn burst(&self, index: usize) -> Option<&BurstDescriptor> {
        self.bursts.iter().find(|b| b.index == index)
    }

    pub fn burst_for_line(&self, line: i64) -> Option<&BurstDescriptor> {
        self.bursts.iter().find(|b| b.contains_line(line))
    }

    /// Check the bursts against the image dimensions
    pub fn validate_bursts(&self, slc_shape: (usize, usize)) -> SarResult<()> {
        let (total_lines, total_samples) = slc_shape;

        for burst in &self.bursts {
            if burst.last_line >= total_lines {
                return Err(SarError::Validation(format!(
                    "Burst {} end line ({}) exceeds SLC lines ({})",
                    burst.index, burst.last_line, total_lines
                )));
            }
            if burst.samples_per_burst > total_samples {
                return Err(SarError::Validation(format!(
                    "Burst {} samples ({}) exceed SLC samples ({})",
                    burst.index, burst.samples_per_burst, total_samples
                )));
            }
        }

        log::debug!("Burst validation passed");
        Ok(())
    }

    /// Split `rect` into per-burst and gap segments.
    ///
    /// The segments are ordered by line, share the pixel extent of `rect` and
    /// cover every line of `rect` exactly once.
    pub fn partition(&self, rect: &PixelRect) -> Vec<BurstSegment> {
        let mut segments = Vec::new();
        if rect.is_empty() {
            return segments;
        }

        let last = rect.last_line();
        let mut cursor = rect.first_line();

        for burst in &self.bursts {
            let burst_first = burst.first_line as i64;
            let burst_last = burst.last_line as i64;
            if burst_last < cursor {
                continue;
            }
            if burst_first > last {
                break;
            }

            if burst_first > cursor {
                if let Some(gap) = rect.clip_lines(cursor, burst_first - 1) {
                    segments.push(BurstSegment::Gap { rect: gap });
                }
            }

            if let Some(clipped) = rect.clip_lines(cursor.max(burst_first), burst_last) {
                log::debug!("Region {} intersects burst {} at {}", rect, burst.index, clipped);
                cursor = clipped.last_line() + 1;
                segments.push(BurstSegment::Burst {
                    index: burst.index,
                    rect: clipped,
                });
            }
        }

        if cursor <= last {
            if let Some(gap) = rect.clip_lines(cursor, last) {
                segments.push(BurstSegment::Gap { rect: gap });
            }
        }

        segments
    }
}
