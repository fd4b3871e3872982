//! Model integration: transport, extraction, synthesis, validation.
//!
//! Model output is free-form text; everything here exists to turn it into
//! strictly-shaped plans and verdicts. The transport contract retries on
//! transport kinds only; semantic failures surface immediately.

pub mod extract;
pub mod synthesizer;
pub mod transport;
pub mod validator;

pub use extract::{extract_json, strip_thought_block};
pub use synthesizer::PlanSynthesizer;
pub use transport::{
    Candidate, GenerateResponse, GenerationParams, GeminiTransport, GeminiTransportFactory,
    ModelTransport, Part, TransportFactory,
};
pub use validator::{PlanValidator, Severity, ValidationVerdict};
