pub mod orchestrator;
pub mod payload;

pub use orchestrator::RecordingOrchestrator;
pub use payload::{build_payment_request, BuiltPayload, RecordingContext};
