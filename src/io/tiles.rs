//! Tile access seams between the interferometric core and the raster framework.

use crate::core::flat_earth::ImageGeometry;
use crate::core::interferogram::InterferometricProduct;
use crate::core::topo_phase::DemTile;
use crate::io::bands::ComplexBandRef;
use crate::types::{PixelRect, SarComplex, SarError, SarImage, SarRealImage, SarResult};
use ndarray::{s, Array2};
use std::collections::HashMap;
use std::sync::Mutex;

/// How pixels of a requested window outside the image are filled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BorderPolicy {
    #[default]
    Zero,
}

/// Complex samples over a pixel window with the source band's no-data value
#[derive(Debug, Clone)]
pub struct ComplexRasterTile {
    pub rect: PixelRect,
    pub data: SarImage,
    pub no_data_value: Option<f32>,
}

impl ComplexRasterTile {
    /// No-data test on the real component, as flagged by the source band
    pub fn is_no_data(&self, row: usize, col: usize) -> bool {
        match self.no_data_value {
            Some(nd) => self.data[[row, col]].re == nd,
            None => false,
        }
    }
}

/// Provides complex tiles of the source bands
pub trait TileSource: Send + Sync {
    fn complex_tile(
        &self,
        band: &ComplexBandRef,
        rect: &PixelRect,
        border: BorderPolicy,
    ) -> SarResult<ComplexRasterTile>;
}

/// Provides DEM elevations covering an image window
pub trait DemSource: Send + Sync {
    /// `extension_percent` widens the sampled area as a margin for the simulation
    fn dem_tile(
        &self,
        geometry: &ImageGeometry,
        rect: &PixelRect,
        extension_percent: f64,
    ) -> SarResult<DemTile>;
}

/// Products of one output tile, each array covering `rect`
#[derive(Debug, Clone)]
pub struct OutputTile {
    pub rect: PixelRect,
    pub interferogram: Option<SarImage>,
    pub coherence: Option<SarRealImage>,
    pub flat_earth_phase: Option<SarRealImage>,
    pub topo_phase: Option<SarRealImage>,
    pub elevation: Option<SarRealImage>,
}

/// Receives finished tiles
pub trait TileSink: Send + Sync {
    fn write_tile(&self, product: &InterferometricProduct, tile: &OutputTile) -> SarResult<()>;
}

/// Complex bands held in memory, keyed by the real band name
#[derive(Debug, Default)]
pub struct MemoryRaster {
    bands: HashMap<String, (SarImage, Option<f32>)>,
}

impl MemoryRaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, band: &ComplexBandRef, data: SarImage, no_data_value: Option<f32>) {
        self.bands.insert(band.real.clone(), (data, no_data_value));
    }
}

impl TileSource for MemoryRaster {
    fn complex_tile(
        &self,
        band: &ComplexBandRef,
        rect: &PixelRect,
        border: BorderPolicy,
    ) -> SarResult<ComplexRasterTile> {
        let (image, no_data_value) = self.bands.get(&band.real).ok_or_else(|| {
            SarError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("band {} not loaded", band.real),
            ))
        })?;

        let mut data = match border {
            BorderPolicy::Zero => Array2::<SarComplex>::zeros((rect.height, rect.width)),
        };

        let (rows, cols) = image.dim();
        let r0 = rect.first_line().max(0);
        let r1 = (rect.last_line() + 1).min(rows as i64);
        let c0 = rect.first_pixel().max(0);
        let c1 = (rect.last_pixel() + 1).min(cols as i64);
        if r0 < r1 && c0 < c1 {
            let (dr, dc) = ((r0 - rect.y) as usize, (c0 - rect.x) as usize);
            let (h, w) = ((r1 - r0) as usize, (c1 - c0) as usize);
            data.slice_mut(s![dr..dr + h, dc..dc + w])
                .assign(&image.slice(s![r0 as usize..r1 as usize, c0 as usize..c1 as usize]));
        }

        Ok(ComplexRasterTile {
            rect: *rect,
            data,
            no_data_value: *no_data_value,
        })
    }
}

/// Collects written tiles in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    tiles: Mutex<Vec<(String, OutputTile)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Written tiles with the product's pair suffix, in write order
    pub fn tiles(&self) -> Vec<(String, OutputTile)> {
        self.tiles.lock().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.tiles.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TileSink for MemorySink {
    fn write_tile(&self, product: &InterferometricProduct, tile: &OutputTile) -> SarResult<()> {
        self.tiles
            .lock()
            .map_err(|_| SarError::Processing("tile sink lock poisoned".to_string()))?
            .push((product.suffix.clone(), tile.clone()));
        Ok(())
    }
}
