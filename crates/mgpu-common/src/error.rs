//! Error taxonomy for setup, dispatch and teardown.
//!
//! Leaf operations never terminate the process; they return one of these
//! values and the top-level runner decides to abort.

use std::fmt;
use std::path::PathBuf;

use crate::config::ConfigError;
use crate::status;

/// A non-success status reported by a compute backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} ({}, status {status})", crate::status::name(*.status))]
pub struct BackendError {
    /// Originating numeric status (OpenCL `cl_int` semantics).
    pub status: i32,
    pub message: String,
}

impl BackendError {
    pub fn new(status: i32, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }
}

/// Which of a device's two buffers an operation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferRole {
    Input,
    Output,
}

impl fmt::Display for BufferRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// Failures while bringing up devices, programs, kernels or buffers.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("no compute devices available: {reason}")]
    NoDevices { reason: String },

    #[error("backend initialisation failed")]
    Backend(#[source] BackendError),

    #[error("could not read kernel source '{}'", .path.display())]
    KernelSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("program build failed")]
    ProgramBuild(#[source] BackendError),

    #[error("creating kernel '{entry_point}' on device {device} failed")]
    KernelCreate {
        entry_point: String,
        device: usize,
        #[source]
        source: BackendError,
    },

    #[error("allocating {role} buffer ({bytes} bytes) for device {device} failed")]
    Allocation {
        device: usize,
        role: BufferRole,
        bytes: usize,
        #[source]
        source: BackendError,
    },

    #[error("invalid benchmark shape: {0}")]
    InvalidShape(String),

    #[error("worker pool creation failed: {0}")]
    Executor(String),
}

impl SetupError {
    /// Backend status that caused the failure, if one exists.
    pub fn status(&self) -> Option<i32> {
        match self {
            Self::Backend(e) | Self::ProgramBuild(e) => Some(e.status),
            Self::KernelCreate { source, .. } | Self::Allocation { source, .. } => {
                Some(source.status)
            }
            _ => None,
        }
    }
}

/// Failures inside a dispatch round. Every one of these is fatal to the run.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    #[error("upload to device {device} failed")]
    Upload {
        device: usize,
        #[source]
        source: BackendError,
    },

    #[error("binding kernel arguments on device {device} failed")]
    BindArgs {
        device: usize,
        #[source]
        source: BackendError,
    },

    #[error("enqueueing kernel on device {device} failed")]
    Enqueue {
        device: usize,
        #[source]
        source: BackendError,
    },

    #[error("waiting for completion on device {device} failed")]
    Wait {
        device: usize,
        #[source]
        source: BackendError,
    },

    #[error("image has {actual} elements but device buffers hold {expected}")]
    ImageShape { expected: usize, actual: usize },
}

impl DispatchError {
    pub fn device(&self) -> Option<usize> {
        match self {
            Self::Upload { device, .. }
            | Self::BindArgs { device, .. }
            | Self::Enqueue { device, .. }
            | Self::Wait { device, .. } => Some(*device),
            Self::ImageShape { .. } => None,
        }
    }

    pub fn status(&self) -> Option<i32> {
        match self {
            Self::Upload { source, .. }
            | Self::BindArgs { source, .. }
            | Self::Enqueue { source, .. }
            | Self::Wait { source, .. } => Some(source.status),
            Self::ImageShape { .. } => Some(status::INVALID_VALUE),
        }
    }
}

/// Umbrella error for a whole benchmark invocation.
#[derive(Debug, thiserror::Error)]
pub enum MgpuError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("setup failed")]
    Setup(#[from] SetupError),

    #[error("dispatch failed")]
    Dispatch(#[from] DispatchError),

    #[error("teardown failed")]
    Teardown(#[source] BackendError),
}

impl MgpuError {
    pub fn status(&self) -> Option<i32> {
        match self {
            Self::Config(_) => None,
            Self::Setup(e) => e.status(),
            Self::Dispatch(e) => e.status(),
            Self::Teardown(e) => Some(e.status),
        }
    }
}

pub type Result<T, E = MgpuError> = std::result::Result<T, E>;
