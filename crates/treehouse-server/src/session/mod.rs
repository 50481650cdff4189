pub mod orchestrator;
pub mod output;
pub mod registry;

pub use orchestrator::{SessionOrchestrator, StartRequest};
pub use registry::{EventSink, SessionRegistry};
