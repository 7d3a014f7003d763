//! Lamp Configuration Module
//!
//! Capture, serial, queue, pacing and logging settings loaded from TOML.
//!
//! ## Loading Order
//!
//! 1. `--config PATH` on the command line
//! 2. `NETLAMP_CONFIG` environment variable (path to TOML file)
//! 3. `netlamp.toml` in the current working directory
//! 4. Built-in defaults
//!
//! Command-line flags are applied on top with [`LampConfig::apply_overrides`].
//! The resulting value is passed explicitly into the pipeline; nothing reads
//! configuration from global state.

mod lamp_config;
pub mod defaults;
pub mod validation;

pub use lamp_config::*;
