use crate::core::burst::{BurstDescriptor, BurstPartitioner, BurstSegment};
use crate::core::coherence::{coherence_extended, derive_square_pixel_window, CoherenceWindow};
use crate::core::flat_earth::{
    FlatEarthCache, FlatEarthEstimator, ImageGeometry, ImagePairKey, SecondaryRangeTime,
};
use crate::core::orbit::OrbitModel;
use crate::core::topo_phase::{
    check_dem_resolution, SimulatedTopography, TopoPhaseRequest, TopoPhaseSimulator,
};
use crate::io::bands::BandPair;
use crate::io::tiles::{BorderPolicy, DemSource, OutputTile, TileSink, TileSource};
use crate::types::{PixelRect, SarComplex, SarError, SarImage, SarRealImage, SarResult};
use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Estimation point counts accepted for the flat-earth fit
pub const ESTIMATION_POINT_CHOICES: [usize; 8] = [301, 401, 501, 601, 701, 801, 901, 1001];

/// Maximum coherence window size along either axis
pub const MAX_COHERENCE_WINDOW: usize = 90;

/// DEM used for topographic phase simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DemSelection {
    /// A DEM known to the DEM service, e.g. "SRTM 3Sec"
    Named(String),
    External { path: PathBuf, no_data_value: f64 },
}

impl Default for DemSelection {
    fn default() -> Self {
        DemSelection::Named("SRTM 3Sec".to_string())
    }
}

/// Interferogram and coherence processing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsarParams {
    /// Coherence window along azimuth (lines)
    pub coherence_window_azimuth: usize,
    /// Coherence window along range (pixels)
    pub coherence_window_range: usize,
    /// Derive the azimuth window from the range window for square ground pixels
    pub square_pixel: bool,
    pub flat_earth_degree: usize,
    pub estimation_points: usize,
    pub orbit_degree: usize,
    pub subtract_flat_earth: bool,
    pub subtract_topographic_phase: bool,
    /// Write the flattened interferogram; off for coherence-only products
    pub output_interferogram: bool,
    pub include_coherence: bool,
    pub dem: DemSelection,
    /// Extra DEM margin around each tile, percent of the tile size
    pub tile_extension_percent: f64,
    pub secondary_range_time: SecondaryRangeTime,
    pub output_flat_earth_phase: bool,
    pub output_topo_phase: bool,
    /// Terrain height from the topographic phase simulation
    pub output_elevation: bool,
}

impl Default for InsarParams {
    fn default() -> Self {
        Self {
            coherence_window_azimuth: 10,
            coherence_window_range: 10,
            square_pixel: true,
            flat_earth_degree: 5,
            estimation_points: 501,
            orbit_degree: 3,
            subtract_flat_earth: true,
            subtract_topographic_phase: false,
            output_interferogram: true,
            include_coherence: true,
            dem: DemSelection::default(),
            tile_extension_percent: 100.0,
            secondary_range_time: SecondaryRangeTime::Independent,
            output_flat_earth_phase: false,
            output_topo_phase: false,
            output_elevation: false,
        }
    }
}

impl InsarParams {
    pub fn validate(&self) -> SarResult<()> {
        for (name, size) in [
            ("coherence_window_azimuth", self.coherence_window_azimuth),
            ("coherence_window_range", self.coherence_window_range),
        ] {
            if size < 2 || size > MAX_COHERENCE_WINDOW {
                return Err(SarError::Validation(format!(
                    "{} must be in [2, {}], got {}",
                    name, MAX_COHERENCE_WINDOW, size
                )));
            }
        }
        if !(1..=8).contains(&self.flat_earth_degree) {
            return Err(SarError::Validation(format!(
                "flat_earth_degree must be in [1, 8], got {}",
                self.flat_earth_degree
            )));
        }
        if !ESTIMATION_POINT_CHOICES.contains(&self.estimation_points) {
            return Err(SarError::Validation(format!(
                "estimation_points must be one of {:?}, got {}",
                ESTIMATION_POINT_CHOICES, self.estimation_points
            )));
        }
        if !(1..=5).contains(&self.orbit_degree) {
            return Err(SarError::Validation(format!(
                "orbit_degree must be in [1, 5], got {}",
                self.orbit_degree
            )));
        }
        if !self.tile_extension_percent.is_finite() || self.tile_extension_percent < 0.0 {
            return Err(SarError::Validation(format!(
                "tile_extension_percent must be a non-negative number, got {}",
                self.tile_extension_percent
            )));
        }
        if let DemSelection::External { path, .. } = &self.dem {
            if path.as_os_str().is_empty() {
                return Err(SarError::Validation("external DEM path is empty".to_string()));
            }
        }
        if !self.subtract_flat_earth && self.output_flat_earth_phase {
            return Err(SarError::Validation(
                "output_flat_earth_phase requires subtract_flat_earth".to_string(),
            ));
        }
        if !self.subtract_topographic_phase && self.output_topo_phase {
            return Err(SarError::Validation(
                "output_topo_phase requires subtract_topographic_phase".to_string(),
            ));
        }
        if !self.subtract_topographic_phase && self.output_elevation {
            return Err(SarError::Validation(
                "output_elevation requires subtract_topographic_phase".to_string(),
            ));
        }
        if !self.output_interferogram && !self.include_coherence {
            return Err(SarError::Validation(
                "output_interferogram and include_coherence are both off, nothing to produce".to_string(),
            ));
        }
        Ok(())
    }
}

/// Units of the declared output bands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandUnit {
    Real,
    Imaginary,
    Coherence,
    Phase,
    Meters,
}

impl BandUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            BandUnit::Real => "REAL",
            BandUnit::Imaginary => "IMAGINARY",
            BandUnit::Coherence => "COHERENCE",
            BandUnit::Phase => "PHASE",
            BandUnit::Meters => "meters",
        }
    }
}

/// Output band declaration
#[derive(Debug, Clone, PartialEq)]
pub struct OutputBand {
    pub name: String,
    pub unit: BandUnit,
    pub no_data_value: f32,
}

/// One master/secondary pair with its declared output bands
#[derive(Debug, Clone)]
pub struct InterferometricProduct {
    pub key: ImagePairKey,
    pub bands: BandPair,
    pub suffix: String,
    pub outputs: Vec<OutputBand>,
    /// Written to interferogram and coherence wherever an input is no-data
    pub no_data_value: f32,
}

impl InterferometricProduct {
    pub fn new(bands: BandPair, params: &InsarParams, no_data_value: f32) -> Self {
        let suffix = bands.suffix();
        let mut key = ImagePairKey::new(bands.master.date_tag(), bands.secondary.date_tag());
        if let Some(sw) = bands.master.sub_swath_index() {
            key = key.with_sub_swath(sw);
        }

        let band = |prefix: &str, unit| OutputBand {
            name: format!("{}{}", prefix, suffix),
            unit,
            no_data_value,
        };
        let mut outputs = Vec::new();
        if params.output_interferogram {
            outputs.push(band("i_ifg", BandUnit::Real));
            outputs.push(band("q_ifg", BandUnit::Imaginary));
        }
        if params.include_coherence {
            outputs.push(band("coh", BandUnit::Coherence));
        }
        if params.output_flat_earth_phase {
            outputs.push(band("fep", BandUnit::Phase));
        }
        if params.output_topo_phase {
            outputs.push(band("tp", BandUnit::Phase));
        }
        if params.output_elevation {
            outputs.push(band("elevation", BandUnit::Meters));
        }

        Self {
            key,
            bands,
            suffix,
            outputs,
            no_data_value,
        }
    }
}

/// Product plus the geometry of both images
#[derive(Debug, Clone)]
pub struct InsarPair {
    pub product: InterferometricProduct,
    pub master: Arc<ImageGeometry>,
    pub secondary: Arc<ImageGeometry>,
}

/// Cooperative cancellation flag shared with the caller
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Summary of a completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub tiles_written: usize,
}

struct PreparedPair {
    pair: InsarPair,
    partitioner: Option<BurstPartitioner>,
}

/// Segment results before assembly into the output tile
struct SegmentOutput {
    interferogram: Option<SarImage>,
    coherence: Option<SarRealImage>,
    flat_earth_phase: Option<SarRealImage>,
    topo_phase: Option<SarRealImage>,
    elevation: Option<SarRealImage>,
}

/// Flattened interferogram and coherence generation over tiles
pub struct InsarProcessor {
    params: InsarParams,
    window: CoherenceWindow,
    estimator: FlatEarthEstimator,
    pairs: Vec<PreparedPair>,
    topo: Option<Box<dyn TopoPhaseSimulator>>,
}

impl InsarProcessor {
    /// Validate the configuration and pairs before any tile is processed
    pub fn new(
        params: InsarParams,
        pairs: Vec<InsarPair>,
        topo: Option<Box<dyn TopoPhaseSimulator>>,
    ) -> SarResult<Self> {
        params.validate()?;
        if pairs.is_empty() {
            return Err(SarError::Validation("no image pairs to process".to_string()));
        }
        if params.subtract_topographic_phase && topo.is_none() {
            return Err(SarError::Validation(
                "subtract_topographic_phase requires a topographic phase simulator".to_string(),
            ));
        }

        let (azimuth, range) = if params.square_pixel {
            derive_square_pixel_window(
                params.coherence_window_range,
                pairs[0].master.slc.spacing.as_ref(),
            )
        } else {
            (params.coherence_window_azimuth, params.coherence_window_range)
        };
        let window = CoherenceWindow::new(azimuth.min(MAX_COHERENCE_WINDOW), range.min(MAX_COHERENCE_WINDOW))?;

        let estimator = FlatEarthEstimator::new(
            params.flat_earth_degree,
            params.estimation_points,
            params.secondary_range_time,
        )?;

        let mut prepared = Vec::with_capacity(pairs.len());
        for pair in pairs {
            pair.master.slc.validate()?;
            pair.secondary.slc.validate()?;
            let pair = InsarPair {
                master: with_orbit_degree(&pair.master, params.orbit_degree)?,
                secondary: with_orbit_degree(&pair.secondary, params.orbit_degree)?,
                product: pair.product,
            };

            let partitioner = if pair.master.bursts.is_empty() {
                None
            } else {
                if pair.secondary.bursts.len() != pair.master.bursts.len() {
                    return Err(SarError::Validation(format!(
                        "{}: master has {} bursts but secondary has {}",
                        pair.product.key,
                        pair.master.bursts.len(),
                        pair.secondary.bursts.len()
                    )));
                }
                let partitioner = BurstPartitioner::new(pair.master.bursts.clone())?;
                partitioner.validate_bursts((pair.master.slc.num_lines, pair.master.slc.num_pixels))?;
                Some(partitioner)
            };
            prepared.push(PreparedPair { pair, partitioner });
        }

        log::info!(
            "InSAR processor: {} pairs, interferogram {}, coherence window {}x{}, flat earth {} (degree {}, {} points), topo phase {}, DEM {:?}",
            prepared.len(),
            params.output_interferogram,
            window.azimuth,
            window.range,
            params.subtract_flat_earth,
            params.flat_earth_degree,
            params.estimation_points,
            params.subtract_topographic_phase,
            params.dem
        );

        Ok(Self {
            params,
            window,
            estimator,
            pairs: prepared,
            topo,
        })
    }

    pub fn params(&self) -> &InsarParams {
        &self.params
    }

    pub fn coherence_window(&self) -> CoherenceWindow {
        self.window
    }

    pub fn products(&self) -> Vec<&InterferometricProduct> {
        self.pairs.iter().map(|p| &p.pair.product).collect()
    }

    /// Process every pair over every rectangle, writing each finished tile to `sink`.
    ///
    /// Cancellation is checked before a tile starts and before it is written.
    pub fn run(
        &self,
        rects: &[PixelRect],
        source: &dyn TileSource,
        dem: Option<&dyn DemSource>,
        sink: &dyn TileSink,
        cancel: &CancellationToken,
    ) -> SarResult<RunSummary> {
        let cache = FlatEarthCache::new();
        self.run_with_cache(rects, source, dem, sink, cancel, &cache)
    }

    pub fn run_with_cache(
        &self,
        rects: &[PixelRect],
        source: &dyn TileSource,
        dem: Option<&dyn DemSource>,
        sink: &dyn TileSink,
        cancel: &CancellationToken,
        cache: &FlatEarthCache,
    ) -> SarResult<RunSummary> {
        let tasks: Vec<(usize, PixelRect)> = (0..self.pairs.len())
            .flat_map(|p| rects.iter().map(move |r| (p, *r)))
            .collect();
        log::info!("Processing {} tiles", tasks.len());

        let written = AtomicUsize::new(0);
        let process = |&(pair_index, rect): &(usize, PixelRect)| -> SarResult<()> {
            if cancel.is_cancelled() {
                return Err(SarError::Cancelled);
            }
            let tile = self.process_tile(pair_index, &rect, source, dem, cache)?;
            if cancel.is_cancelled() {
                log::debug!("Dropping tile {} after cancellation", rect);
                return Err(SarError::Cancelled);
            }
            sink.write_tile(&self.pairs[pair_index].pair.product, &tile)?;
            written.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            tasks.par_iter().try_for_each(process)?;
        }
        #[cfg(not(feature = "parallel"))]
        tasks.iter().try_for_each(process)?;

        let tiles_written = written.load(Ordering::SeqCst);
        log::info!("✅ InSAR processing completed: {} tiles written", tiles_written);
        Ok(RunSummary { tiles_written })
    }

    /// Compute all outputs of pair `pair_index` over `rect`
    pub fn process_tile(
        &self,
        pair_index: usize,
        rect: &PixelRect,
        source: &dyn TileSource,
        dem: Option<&dyn DemSource>,
        cache: &FlatEarthCache,
    ) -> SarResult<OutputTile> {
        let prepared = self.pairs.get(pair_index).ok_or_else(|| {
            SarError::Validation(format!("pair index {} out of range", pair_index))
        })?;
        let pair = &prepared.pair;
        let no_data = pair.product.no_data_value;

        let segments: Vec<(PixelRect, Option<&BurstDescriptor>)> = match &prepared.partitioner {
            None => vec![(*rect, None)],
            Some(partitioner) => {
                let mut segments = Vec::new();
                for segment in partitioner.partition(rect) {
                    match segment {
                        BurstSegment::Gap { rect: gap } => log::debug!(
                            "{}: lines {}..={} fall in a burst gap",
                            pair.product.key,
                            gap.first_line(),
                            gap.last_line()
                        ),
                        BurstSegment::Burst { index, rect: r } => {
                            let burst = partitioner.burst(index).ok_or_else(|| {
                                SarError::Processing(format!("burst {} missing from partitioner", index))
                            })?;
                            segments.push((r, Some(burst)));
                        }
                    }
                }
                segments
            }
        };

        let shape = (rect.height, rect.width);
        let filled = |wanted: bool| wanted.then(|| Array2::from_elem(shape, no_data));
        let mut tile = OutputTile {
            rect: *rect,
            interferogram: self
                .params
                .output_interferogram
                .then(|| Array2::from_elem(shape, SarComplex::new(no_data, no_data))),
            coherence: filled(self.params.include_coherence),
            flat_earth_phase: filled(self.params.output_flat_earth_phase),
            topo_phase: filled(self.params.output_topo_phase),
            elevation: filled(self.params.output_elevation),
        };

        for (segment_rect, burst) in segments {
            let output = self.process_segment(pair, &segment_rect, burst, source, dem, cache)?;

            let offset = (segment_rect.y - rect.y) as usize;
            let rows = s![offset..offset + segment_rect.height, ..];
            if let (Some(dst), Some(src)) = (tile.interferogram.as_mut(), output.interferogram.as_ref()) {
                dst.slice_mut(&rows).assign(src);
            }
            for (dst, src) in [
                (tile.coherence.as_mut(), output.coherence.as_ref()),
                (tile.flat_earth_phase.as_mut(), output.flat_earth_phase.as_ref()),
                (tile.topo_phase.as_mut(), output.topo_phase.as_ref()),
                (tile.elevation.as_mut(), output.elevation.as_ref()),
            ] {
                if let (Some(dst), Some(src)) = (dst, src) {
                    dst.slice_mut(&rows).assign(src);
                }
            }
        }

        Ok(tile)
    }

    fn process_segment(
        &self,
        pair: &InsarPair,
        rect: &PixelRect,
        burst: Option<&BurstDescriptor>,
        source: &dyn TileSource,
        dem: Option<&dyn DemSource>,
        cache: &FlatEarthCache,
    ) -> SarResult<SegmentOutput> {
        let window = self.window;
        let extended = if self.params.include_coherence {
            rect.extend(
                window.leading_lines(),
                window.trailing_lines(),
                window.leading_pixels(),
                window.trailing_pixels(),
            )
        } else {
            *rect
        };
        let (l0, p0) = ((rect.y - extended.y) as usize, (rect.x - extended.x) as usize);
        let (height, width) = (rect.height, rect.width);

        let master_tile = source.complex_tile(&pair.product.bands.master, &extended, BorderPolicy::Zero)?;
        let secondary_tile = source.complex_tile(&pair.product.bands.secondary, &extended, BorderPolicy::Zero)?;
        for tile in [&master_tile, &secondary_tile] {
            if tile.data.dim() != (extended.height, extended.width) {
                return Err(SarError::Processing(format!(
                    "tile source returned {:?} for window {}",
                    tile.data.dim(),
                    extended
                )));
            }
        }

        // Interferogram no-data follows either input, coherence only the secondary
        let secondary_invalid =
            Array2::from_shape_fn((height, width), |(r, c)| secondary_tile.is_no_data(r + l0, c + p0));
        let invalid = Array2::from_shape_fn((height, width), |(r, c)| {
            secondary_invalid[[r, c]] || master_tile.is_no_data(r + l0, c + p0)
        });

        let mut master = master_tile.data;
        let mut secondary = secondary_tile.data;

        // Lines of neighbouring bursts never enter a burst's windows
        if let Some(b) = burst {
            for (r, line) in (extended.first_line()..=extended.last_line()).enumerate() {
                if !b.contains_line(line) {
                    master.row_mut(r).fill(SarComplex::new(0.0, 0.0));
                    secondary.row_mut(r).fill(SarComplex::new(0.0, 0.0));
                }
            }
        }

        let line_origin = burst.map(|b| b.first_line as i64).unwrap_or(0);
        let lines: Vec<f64> = (extended.first_line()..=extended.last_line())
            .map(|l| (l - line_origin) as f64)
            .collect();
        let pixels: Vec<f64> = (extended.first_pixel()..=extended.last_pixel())
            .map(|p| p as f64)
            .collect();

        let mut flat_earth_phase = None;
        if self.params.subtract_flat_earth {
            let key = match burst {
                Some(b) => pair.product.key.with_burst(b.index),
                None => pair.product.key.clone(),
            };
            let polynomial = cache.get_or_compute(&key, || match burst {
                Some(b) => self.estimator.estimate_for_burst(&pair.master, &pair.secondary, b.index),
                None => self.estimator.estimate_for_pair(&pair.master, &pair.secondary),
            })?;
            let phase = polynomial.evaluate_grid(&lines, &pixels);
            apply_phase(&mut secondary, &phase);
            flat_earth_phase = Some(phase);
        }

        let mut topo_phase = None;
        let mut elevation = None;
        if self.params.subtract_topographic_phase {
            let simulator = self.topo.as_ref().ok_or_else(|| {
                SarError::Validation("no topographic phase simulator configured".to_string())
            })?;
            let dem_source = dem.ok_or_else(|| {
                SarError::Validation("topographic phase requested without a DEM source".to_string())
            })?;
            let dem_tile = dem_source.dem_tile(&pair.master, &extended, self.params.tile_extension_percent)?;
            check_dem_resolution(&dem_tile, &extended)?;

            let request = TopoPhaseRequest {
                key: &pair.product.key,
                master: &pair.master,
                secondary: &pair.secondary,
                burst,
            };
            let SimulatedTopography { phase, elevation: heights } =
                simulator.simulate_topo_phase(&request, &extended, &dem_tile)?;
            if phase.dim() != master.dim() {
                return Err(SarError::Processing(format!(
                    "topographic phase {:?} does not match window {}",
                    phase.dim(),
                    extended
                )));
            }
            if self.params.output_elevation {
                match &heights {
                    Some(h) if h.dim() == master.dim() => {}
                    Some(h) => {
                        return Err(SarError::Processing(format!(
                            "elevation {:?} does not match window {}",
                            h.dim(),
                            extended
                        )))
                    }
                    None => {
                        return Err(SarError::Processing(
                            "output_elevation requested but the simulator returned no elevation".to_string(),
                        ))
                    }
                }
            }
            apply_phase(&mut secondary, &phase);
            topo_phase = Some(phase);
            elevation = heights;
        }

        let inner = s![l0..l0 + height, p0..p0 + width];
        let no_data = pair.product.no_data_value;

        let interferogram = self.params.output_interferogram.then(|| {
            Array2::from_shape_fn((height, width), |(r, c)| {
                if invalid[[r, c]] {
                    SarComplex::new(no_data, no_data)
                } else {
                    master[[r + l0, c + p0]] * secondary[[r + l0, c + p0]].conj()
                }
            })
        });

        let coherence = if self.params.include_coherence {
            let mut coherence = coherence_extended(master.view(), secondary.view(), window)?;
            for ((r, c), value) in coherence.indexed_iter_mut() {
                if secondary_invalid[[r, c]] {
                    *value = no_data;
                }
            }
            Some(coherence)
        } else {
            None
        };

        let to_output = |phase: Option<Array2<f64>>, wanted: bool| {
            phase
                .filter(|_| wanted)
                .map(|p| p.slice(&inner).mapv(|v| v as f32))
        };

        Ok(SegmentOutput {
            interferogram,
            coherence,
            flat_earth_phase: to_output(flat_earth_phase, self.params.output_flat_earth_phase),
            topo_phase: to_output(topo_phase, self.params.output_topo_phase),
            elevation: to_output(elevation, self.params.output_elevation),
        })
    }
}

/// Same image with its orbit refitted at the configured interpolation degree
fn with_orbit_degree(image: &Arc<ImageGeometry>, degree: usize) -> SarResult<Arc<ImageGeometry>> {
    if image.orbit.degree() == degree {
        return Ok(Arc::clone(image));
    }
    let mut rebuilt = (**image).clone();
    rebuilt.orbit = OrbitModel::new(image.orbit.state_vectors().to_vec(), degree)?;
    Ok(Arc::new(rebuilt))
}

/// Rotate `data` by `exp(i*phase)` element-wise
fn apply_phase(data: &mut SarImage, phase: &Array2<f64>) {
    for (value, &p) in data.iter_mut().zip(phase.iter()) {
        let (sin, cos) = p.sin_cos();
        let re = value.re as f64;
        let im = value.im as f64;
        *value = SarComplex::new((re * cos - im * sin) as f32, (re * sin + im * cos) as f32);
    }
}
