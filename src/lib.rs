// Public API - the runner, its error type and connection settings
pub mod db;
pub mod error;
pub mod runner;

// Internal modules - organized by subsystem
mod config;
mod formats;
mod io;
mod loader;
mod telemetry;
