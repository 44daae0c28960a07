#![forbid(unsafe_code)]

//! Profile and launch-script management for lsfg-vk frame generation.
//!
//! [`ConfigService`] is the entry point: it reads and writes the TOML
//! profile document and keeps the `lsfg` launch script in step with the
//! active profile.

pub mod config;
pub mod constants;
pub mod error;
pub mod ipc;
pub mod persistence;
pub mod script;
pub mod service;

pub use error::{Error, Result};
pub use service::ConfigService;
