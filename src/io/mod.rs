//! Input/output: product metadata, local archives, configuration, boundaries and exports

pub mod product_id;
pub mod mtl;
pub mod archive;
pub mod boundaries;
pub mod config;
pub mod export;

pub use product_id::{ProcessingLevel, ProductId};
pub use mtl::{MtlDocument, MtlParser, ThermalConstants};
pub use archive::{ArchiveProduct, LandsatArchive};
pub use boundaries::{AdminLevel, BoundarySet};
pub use config::{RegionConfig, RunConfig};
pub use export::{DirectorySink, ExportSink, MemorySink};
