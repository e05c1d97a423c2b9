//! Per-device buffers and kernel instances.
//!
//! Every device owns one input buffer, one output buffer and one kernel
//! instance, all created once at setup and reused for every round of both
//! strategies. Buffers are never resized.

use mgpu_common::{BackendError, BufferRole, SetupError};
use tracing::{debug, warn};

use crate::backend::ComputeBackend;

/// Input/output buffers plus the kernel instance for each device.
pub struct DeviceBufferPool<B: ComputeBackend> {
    inputs: Vec<B::Buffer>,
    outputs: Vec<B::Buffer>,
    kernels: Vec<B::Kernel>,
    image_bytes: usize,
}

impl<B: ComputeBackend> std::fmt::Debug for DeviceBufferPool<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBufferPool")
            .field("devices", &self.kernels.len())
            .field("image_bytes", &self.image_bytes)
            .finish()
    }
}

impl<B: ComputeBackend> DeviceBufferPool<B> {
    /// Create one input buffer, one output buffer and one `entry_point`
    /// kernel for each of the first `device_count` devices.
    ///
    /// On failure everything created by this call is released before the
    /// error is returned.
    pub fn allocate(
        backend: &B,
        program: &B::Program,
        entry_point: &str,
        image_bytes: usize,
        device_count: usize,
    ) -> Result<Self, SetupError> {
        if device_count == 0 || device_count > backend.device_count() {
            return Err(SetupError::InvalidShape(format!(
                "cannot allocate for {device_count} devices, backend '{}' has {}",
                backend.name(),
                backend.device_count()
            )));
        }

        let mut pool = Self {
            inputs: Vec::with_capacity(device_count),
            outputs: Vec::with_capacity(device_count),
            kernels: Vec::with_capacity(device_count),
            image_bytes,
        };

        for device in 0..device_count {
            if let Err(e) = pool.allocate_device(backend, program, entry_point, device) {
                pool.release_partial(backend);
                return Err(e);
            }
        }

        debug!(
            devices = device_count,
            image_bytes,
            backend = backend.name(),
            "device buffer pool allocated"
        );
        Ok(pool)
    }

    fn allocate_device(
        &mut self,
        backend: &B,
        program: &B::Program,
        entry_point: &str,
        device: usize,
    ) -> Result<(), SetupError> {
        let bytes = self.image_bytes;
        let input = backend.create_buffer(bytes).map_err(|source| SetupError::Allocation {
            device,
            role: BufferRole::Input,
            bytes,
            source,
        })?;
        self.inputs.push(input);

        let output = backend.create_buffer(bytes).map_err(|source| SetupError::Allocation {
            device,
            role: BufferRole::Output,
            bytes,
            source,
        })?;
        self.outputs.push(output);

        let kernel = backend.create_kernel(program, entry_point, device).map_err(|source| {
            SetupError::KernelCreate { entry_point: entry_point.to_string(), device, source }
        })?;
        self.kernels.push(kernel);
        Ok(())
    }

    fn release_partial(self, backend: &B) {
        let created = self.inputs.len() + self.outputs.len();
        if let Err(e) = self.release(backend) {
            warn!(created, error = %e, "releasing partially allocated buffers failed");
        }
    }

    pub fn device_count(&self) -> usize {
        self.kernels.len()
    }

    pub fn image_bytes(&self) -> usize {
        self.image_bytes
    }

    /// Elements of `f32` each buffer holds.
    pub fn image_elements(&self) -> usize {
        self.image_bytes / std::mem::size_of::<f32>()
    }

    pub fn input(&self, device: usize) -> Option<&B::Buffer> {
        self.inputs.get(device)
    }

    pub fn input_mut(&mut self, device: usize) -> Option<&mut B::Buffer> {
        self.inputs.get_mut(device)
    }

    pub fn output(&self, device: usize) -> Option<&B::Buffer> {
        self.outputs.get(device)
    }

    /// Borrow inputs and outputs shared while kernels are borrowed mutably,
    /// one per worker.
    pub fn launch_view(&mut self) -> (&[B::Buffer], &[B::Buffer], &mut [B::Kernel]) {
        (&self.inputs, &self.outputs, &mut self.kernels)
    }

    /// Release every buffer, returning how many were released.
    ///
    /// All releases are attempted; the first failure is reported. Must not be
    /// called while a round is in flight, which ownership already rules out.
    pub fn release(self, backend: &B) -> Result<usize, BackendError> {
        let mut released = 0;
        let mut first_error = None;
        drop(self.kernels);

        for buffer in self.inputs.into_iter().chain(self.outputs) {
            match backend.release_buffer(buffer) {
                Ok(()) => released += 1,
                Err(e) => {
                    warn!(error = %e, "buffer release failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                debug!(released, "device buffer pool released");
                Ok(released)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::{NLM_ENTRY, NLM_SRC};
    use crate::reference::ReferenceBackend;

    #[test]
    fn allocates_two_buffers_per_device() {
        let backend = ReferenceBackend::new(3);
        let program = backend.build_program(NLM_SRC, "").unwrap();
        let pool = DeviceBufferPool::allocate(&backend, &program, NLM_ENTRY, 64, 3).unwrap();
        assert_eq!(pool.device_count(), 3);
        assert_eq!(pool.image_elements(), 16);
        assert_eq!(backend.live_buffers(), 6);
        for d in 0..3 {
            assert_eq!(pool.input(d).unwrap().len(), 16);
            assert_eq!(pool.output(d).unwrap().len(), 16);
        }
        assert_eq!(pool.release(&backend).unwrap(), 6);
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn kernel_failure_releases_created_buffers() {
        let backend = ReferenceBackend::new(2);
        let program = backend.build_program(NLM_SRC, "").unwrap();
        let err = DeviceBufferPool::allocate(&backend, &program, "missing", 64, 2).unwrap_err();
        assert!(matches!(err, SetupError::KernelCreate { device: 0, .. }));
        assert_eq!(backend.live_buffers(), 0);
        assert_eq!(backend.released_buffers(), 2);
    }

    #[test]
    fn invalid_size_is_allocation_error() {
        let backend = ReferenceBackend::new(1);
        let program = backend.build_program(NLM_SRC, "").unwrap();
        let err = DeviceBufferPool::allocate(&backend, &program, NLM_ENTRY, 0, 1).unwrap_err();
        assert!(matches!(err, SetupError::Allocation { device: 0, role: BufferRole::Input, .. }));
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn more_devices_than_backend_has() {
        let backend = ReferenceBackend::new(1);
        let program = backend.build_program(NLM_SRC, "").unwrap();
        let err = DeviceBufferPool::allocate(&backend, &program, NLM_ENTRY, 16, 2).unwrap_err();
        assert!(matches!(err, SetupError::InvalidShape(_)));
    }
}
