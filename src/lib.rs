//! sardine-insar: interferometric phase flattening and coherence estimation
//!
//! Builds flattened interferograms and coherence maps from co-registered
//! Sentinel-1 SLC pairs, including burst-wise processing of TOPS sub-swaths.

pub mod core;
pub mod io;
pub mod types;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use types::{
    OrbitStateVector, PixelRect, Polarization, SarComplex, SarError, SarImage, SarRealImage,
    SarResult,
};

pub use crate::core::{
    complex_coherence, detected_coherence, BurstDescriptor, BurstPartitioner, CancellationToken,
    CoherenceWindow, FlatEarthCache, FlatEarthEstimator, FlatEarthPolynomial, ImageGeometry,
    ImagePairKey, InsarParams, InsarProcessor, OrbitModel, SlcGeometry,
};
pub use io::{BandCatalog, MemoryRaster, MemorySink, TileSink, TileSource};
