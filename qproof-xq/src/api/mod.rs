//! HTTP API handlers for qproof-xq

pub mod fixes;
pub mod health;
pub mod patterns;
pub mod process;
pub mod sse;

pub use fixes::fix_routes;
pub use health::health_routes;
pub use patterns::pattern_routes;
pub use process::process_routes;
pub use sse::event_stream;
