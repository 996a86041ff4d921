//! Core LST processing modules

pub mod sensor_catalog;
pub mod scene;
pub mod quality_mask;
pub mod spectral_index;
pub mod emissivity;
pub mod providers;
pub mod harmonize;
pub mod temporal_composite;
pub mod histogram;
pub mod batch;

// Re-export main types
pub use sensor_catalog::{spec_for, SensorSpec};
pub use scene::{Scene, SceneCollection, SceneFilter, LST_BAND};
pub use quality_mask::{MaskPolicy, QualityFlags, QualityKind};
pub use emissivity::{EmissivityMethod, NdviEmissivityModel};
pub use providers::{
    AsterEmissivityProvider, ConstantTpw, EmissivityCorrectedBrightness, FvcProvider, SplitWindowAlgorithm,
    TpwProvider,
};
pub use harmonize::{HarmonizerParams, InMemorySceneSource, ModelProviders, SceneHarmonizer, SceneSource};
pub use temporal_composite::{Composite, CompositeParams, RegionStats, StatType, TemporalCompositor};
pub use histogram::{HistogramBin, HistogramParams};
pub use batch::{BatchReport, RunContext, RunSettings, SceneRecord};
