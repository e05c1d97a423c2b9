//! Common types for the mgpu multi-device dispatch benchmark.
//!
//! This crate holds everything the dispatch core and the command-line
//! front end agree on: the benchmark configuration, launch geometry, the
//! error taxonomy and the numeric status codes backends report.

pub mod config;
pub mod error;
pub mod launch;
pub mod status;

pub use config::{BackendKind, BenchConfig, ConfigError, DeviceType, ImageCount};
pub use error::{BackendError, BufferRole, DispatchError, MgpuError, Result, SetupError};
pub use launch::LaunchDims;
