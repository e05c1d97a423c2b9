//! Multi-device kernel dispatch core.
//!
//! Compares two ways of feeding the same image to every device of a shared
//! compute context:
//!
//! - [`DispatchStrategy::Copy`] uploads the image into each device's own
//!   input buffer.
//! - [`DispatchStrategy::PassThrough`] uploads once into device 0's buffer
//!   and lets every device read it through the runtime's implicit
//!   cross-device access.
//!
//! The core is generic over [`ComputeBackend`]. With the `opencl-runtime`
//! feature the OpenCL backend drives real devices; the host
//! [`ReferenceBackend`] is always available.

pub mod backend;
pub mod buffer_pool;
pub mod dispatcher;
pub mod host_images;
pub mod kernels;
pub mod reference;
pub mod runner;
pub mod strategy;

#[cfg(feature = "opencl-runtime")]
pub mod context;
#[cfg(feature = "opencl-runtime")]
pub mod device;

pub use backend::{CompletionEvent, ComputeBackend};
pub use buffer_pool::DeviceBufferPool;
pub use dispatcher::{DispatchRecord, Dispatcher, RoundReport};
pub use host_images::{HostImageSet, HostLedger, ReleasedImages};
pub use kernels::{KernelSource, NLM_ENTRY, NLM_SRC};
pub use reference::ReferenceBackend;
pub use runner::{BenchmarkRunner, StrategyTiming, TeardownReport};
pub use strategy::DispatchStrategy;

#[cfg(feature = "opencl-runtime")]
pub use context::OpenClBackend;

use mgpu_common::{BackendKind, SetupError};

/// Whether the OpenCL backend was compiled in.
pub const OPENCL_AVAILABLE: bool = cfg!(feature = "opencl-runtime");

/// Turn [`BackendKind::Auto`] into a concrete backend and reject OpenCL
/// when it was not compiled in.
pub fn resolve_backend(kind: BackendKind) -> Result<BackendKind, SetupError> {
    match kind {
        BackendKind::Auto if OPENCL_AVAILABLE => Ok(BackendKind::OpenCl),
        BackendKind::Auto => Ok(BackendKind::Reference),
        BackendKind::OpenCl if !OPENCL_AVAILABLE => Err(SetupError::NoDevices {
            reason: "built without the `opencl-runtime` feature".into(),
        }),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_always_resolves() {
        assert_eq!(resolve_backend(BackendKind::Reference).unwrap(), BackendKind::Reference);
    }

    #[test]
    fn auto_follows_feature() {
        let expected = if OPENCL_AVAILABLE { BackendKind::OpenCl } else { BackendKind::Reference };
        assert_eq!(resolve_backend(BackendKind::Auto).unwrap(), expected);
    }

    #[test]
    fn opencl_without_feature_is_setup_error() {
        let result = resolve_backend(BackendKind::OpenCl);
        if OPENCL_AVAILABLE {
            assert_eq!(result.unwrap(), BackendKind::OpenCl);
        } else {
            assert!(matches!(result, Err(SetupError::NoDevices { .. })));
        }
    }
}
