use crate::core::burst::BurstDescriptor;
use crate::core::flat_earth::{ImageGeometry, ImagePairKey};
use crate::types::{PixelRect, SarError, SarResult};
use ndarray::Array2;

/// Minimum DEM tile size (rows and columns) for topographic phase simulation
pub const MIN_DEM_SIZE: usize = 3;

/// Elevations covering an image window
#[derive(Debug, Clone)]
pub struct DemTile {
    pub data: Array2<f32>,
    pub no_data_value: f32,
}

impl DemTile {
    pub fn new(data: Array2<f32>, no_data_value: f32) -> Self {
        Self { data, no_data_value }
    }

    pub fn valid_samples(&self) -> usize {
        self.data
            .iter()
            .filter(|&&h| h.is_finite() && h != self.no_data_value)
            .count()
    }
}

/// Refuse DEM tiles too coarse or too empty to simulate the window
pub fn check_dem_resolution(dem: &DemTile, rect: &PixelRect) -> SarResult<()> {
    let (rows, cols) = dem.data.dim();
    if rows < MIN_DEM_SIZE || cols < MIN_DEM_SIZE {
        log::warn!("DEM tile of {}x{} samples for window {}", rows, cols, rect);
        return Err(SarError::DemResolution(format!(
            "the resolution of the selected DEM is too low for window {} ({}x{} samples)",
            rect, rows, cols
        )));
    }

    let valid = dem.valid_samples();
    if valid < MIN_DEM_SIZE * MIN_DEM_SIZE {
        log::warn!("DEM tile for window {} has {} valid samples", rect, valid);
        return Err(SarError::DemResolution(format!(
            "DEM tile for window {} has only {} valid samples",
            rect, valid
        )));
    }
    Ok(())
}

/// Pair context handed to the topographic phase simulation
#[derive(Debug, Clone, Copy)]
pub struct TopoPhaseRequest<'a> {
    pub key: &'a ImagePairKey,
    pub master: &'a ImageGeometry,
    pub secondary: &'a ImageGeometry,
    pub burst: Option<&'a BurstDescriptor>,
}

/// Simulated topography of an image window
#[derive(Debug, Clone)]
pub struct SimulatedTopography {
    /// Topographic phase in radians
    pub phase: Array2<f64>,
    /// Terrain height in metres, when the simulator provides it
    pub elevation: Option<Array2<f64>>,
}

impl SimulatedTopography {
    pub fn new(phase: Array2<f64>) -> Self {
        Self { phase, elevation: None }
    }

    pub fn with_elevation(mut self, elevation: Array2<f64>) -> Self {
        self.elevation = Some(elevation);
        self
    }
}

/// Simulates the topographic phase of a pair over an image window.
///
/// The returned rasters must have the shape of `rect`.
pub trait TopoPhaseSimulator: Send + Sync {
    fn simulate_topo_phase(
        &self,
        request: &TopoPhaseRequest<'_>,
        rect: &PixelRect,
        dem: &DemTile,
    ) -> SarResult<SimulatedTopography>;
}

impl<F> TopoPhaseSimulator for F
where
    F: Fn(&TopoPhaseRequest<'_>, &PixelRect, &DemTile) -> SarResult<SimulatedTopography> + Send + Sync,
{
    fn simulate_topo_phase(
        &self,
        request: &TopoPhaseRequest<'_>,
        rect: &PixelRect,
        dem: &DemTile,
    ) -> SarResult<SimulatedTopography> {
        self(request, rect, dem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_dem_rejected() {
        let dem = DemTile::new(Array2::from_elem((2, 10), 100.0), -32768.0);
        let rect = PixelRect::new(0, 0, 64, 64);
        assert!(matches!(
            check_dem_resolution(&dem, &rect),
            Err(SarError::DemResolution(_))
        ));
    }

    #[test]
    fn test_mostly_void_dem_rejected() {
        let mut data = Array2::from_elem((10, 10), -32768.0f32);
        data[[5, 5]] = 120.0;
        let dem = DemTile::new(data, -32768.0);
        assert_eq!(dem.valid_samples(), 1);
        assert!(check_dem_resolution(&dem, &PixelRect::new(0, 0, 8, 8)).is_err());
    }

    #[test]
    fn test_valid_dem_accepted() {
        let dem = DemTile::new(Array2::from_elem((4, 4), 50.0), 0.0);
        assert!(check_dem_resolution(&dem, &PixelRect::new(0, 0, 8, 8)).is_ok());
    }
}
