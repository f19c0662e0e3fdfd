//! Band lookup and tile access for interferometric stacks

pub mod bands;
pub mod tiles;

pub use bands::{BandCatalog, BandPair, ComplexBandRef, ImageRole};
pub use tiles::{
    BorderPolicy, ComplexRasterTile, DemSource, MemoryRaster, MemorySink, OutputTile, TileSink,
    TileSource,
};
