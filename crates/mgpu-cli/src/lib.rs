//! mgpu CLI library
//!
//! Exposes the option parser, report formatting and exit codes for testing.

pub mod exit;
pub mod options;
pub mod output;
