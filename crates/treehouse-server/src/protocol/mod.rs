pub mod messages;

pub use messages::{ClientMessage, OutputStream, ServerEvent};
