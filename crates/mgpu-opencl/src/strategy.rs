//! How an image becomes visible to each device before launch.

use std::fmt;

use mgpu_common::{BackendError, DispatchError, status};
use tracing::trace;

use crate::backend::{CompletionEvent, ComputeBackend};
use crate::buffer_pool::DeviceBufferPool;

/// Upload policy for one measured run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchStrategy {
    /// Upload the image into every device's own input buffer; each device
    /// reads only its private copy.
    Copy,
    /// Upload the image once into device 0's input buffer; every device
    /// reads that buffer and writes its own output.
    ///
    /// Precondition: the platform lets a device read a buffer resident on
    /// another device of the same context. This crate does not provide that
    /// access; it only measures what the runtime's implicit migration costs.
    PassThrough,
}

impl DispatchStrategy {
    /// Execution order used by the benchmark.
    pub const ALL: [DispatchStrategy; 2] = [DispatchStrategy::Copy, DispatchStrategy::PassThrough];

    /// Label used in the summary line.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Copy => "Copy",
            Self::PassThrough => "Pass-through",
        }
    }

    /// Index of the input buffer the kernel on `device` reads.
    pub fn input_index(&self, device: usize) -> usize {
        match self {
            Self::Copy => device,
            Self::PassThrough => 0,
        }
    }

    pub fn uploads_per_image(&self, device_count: usize) -> usize {
        match self {
            Self::Copy => device_count,
            Self::PassThrough => 1,
        }
    }

    /// Upload `image` as this strategy requires, waiting for every transfer
    /// to complete. Returns the number of uploads issued.
    pub fn upload<B: ComputeBackend>(
        &self,
        backend: &B,
        pool: &mut DeviceBufferPool<B>,
        image: &[f32],
    ) -> Result<usize, DispatchError> {
        let targets = self.uploads_per_image(pool.device_count());
        for device in 0..targets {
            let buffer = pool.input_mut(device).ok_or_else(|| DispatchError::Upload {
                device,
                source: BackendError::new(status::INVALID_DEVICE, "no input buffer for device"),
            })?;
            backend
                .write_buffer(device, buffer, image)
                .and_then(CompletionEvent::wait)
                .map_err(|source| DispatchError::Upload { device, source })?;
            trace!(device, elements = image.len(), strategy = self.name(), "upload complete");
        }
        Ok(targets)
    }
}

impl fmt::Display for DispatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for DispatchStrategy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "copy" => Ok(Self::Copy),
            "pass-through" | "passthrough" | "pass_through" => Ok(Self::PassThrough),
            other => Err(format!("unknown strategy: {other}")),
        }
    }
}
