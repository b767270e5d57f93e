// Time-lapse pipeline: rate decimation, rotation, the per-source driver and batches

pub mod batch;
pub mod naming;
pub mod processor;
pub mod rate;
pub mod rotation;

pub use batch::{expand_inputs, run_batch, BatchReport, SourceReport};
pub use naming::OutputNaming;
pub use processor::{
    drive, process_source, Backends, FrameProcessor, JobSettings, ProcessingStats, SourceOutcome,
};
pub use rate::RateReconciler;
pub use rotation::{RotationMap, RotationMapper};
