//! Core interferometric processing modules

pub mod burst;
pub mod coherence;
pub mod flat_earth;
pub mod geometry;
pub mod interferogram;
pub mod orbit;
pub mod polynomial;
pub mod topo_phase;

// Re-export main types
pub use burst::{BurstDescriptor, BurstPartitioner, BurstSegment};
pub use coherence::{
    coherence_extended, complex_coherence, derive_square_pixel_window, detected_coherence,
    CoherenceWindow,
};
pub use flat_earth::{
    distribute_points, fit_polynomial, FlatEarthCache, FlatEarthEstimator, FlatEarthPolynomial,
    ImageGeometry, ImagePairKey, SecondaryRangeTime,
};
pub use geometry::{geodetic_to_ecef, PixelSpacing, SlcGeometry};
pub use interferogram::{
    CancellationToken, DemSelection, InsarPair, InsarParams, InsarProcessor,
    InterferometricProduct, OutputBand, BandUnit, RunSummary,
};
pub use orbit::{ClosestApproach, OrbitInterpolator, OrbitModel};
pub use polynomial::{FitWindow, Polynomial2D};
pub use topo_phase::{
    check_dem_resolution, DemTile, SimulatedTopography, TopoPhaseRequest, TopoPhaseSimulator,
};
