//! Map-algebra engine: masked rasters, deferred expressions, regions and spatial reductions

pub mod expr;
pub mod masked;
pub mod reduce;
pub mod region;

pub use expr::{BinaryOp, RasterExpr, UnaryOp};
pub use masked::{quantize, MaskedRaster};
pub use reduce::{aggregation_factor, block_average, reduce_region, RegionReduction, SpatialReducer};
pub use region::{Geometry, Region, Ring};
