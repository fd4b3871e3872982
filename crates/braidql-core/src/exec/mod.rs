//! Execution layer: plan execution, masking, and the orchestration
//! service tying the pipeline together.

pub mod executor;
pub mod masking;
pub mod service;

pub use executor::QueryExecutor;
pub use masking::{apply_field_masks, MASKED_VALUE};
pub use service::QueryService;
