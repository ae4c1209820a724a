// Library surface for headless/integration tests and reuse.
// Terminal rendering stays in the binary.
pub mod app;
pub mod app_dirs;
pub mod config;
pub mod input;
pub mod metrics;
pub mod passage;
pub mod report;
pub mod runtime;
pub mod session;
pub mod store;
pub mod util;
