//! Compute backend abstraction.
//!
//! Everything the benchmark needs from a compute runtime: one context
//! shared by N devices, a queue per device, buffers any device can
//! address, and one kernel object per device. The OpenCL runtime and the
//! host reference backend both implement [`ComputeBackend`]; tests add a
//! scripted fake.

use mgpu_common::{BackendError, LaunchDims};

/// Completion handle for an enqueued command.
pub trait CompletionEvent: Send {
    /// Block until the command finishes, surfacing its execution status.
    fn wait(self) -> Result<(), BackendError>;
}

/// A compute runtime exposing `device_count()` devices in one shared context.
///
/// Devices are addressed by index `0..device_count()`. Buffers belong to the
/// context, so a buffer created once may be bound as a kernel argument on
/// any device; whether the runtime migrates the data implicitly is a
/// property of the platform.
pub trait ComputeBackend: Send + Sync {
    type Buffer: Send + Sync;
    type Kernel: Send;
    type Program;
    type Event: CompletionEvent;

    /// Short name used in log output.
    fn name(&self) -> &str;

    fn device_count(&self) -> usize;

    fn device_name(&self, device: usize) -> String;

    /// Compile `source` for every device in the context.
    fn build_program(&self, source: &str, options: &str) -> Result<Self::Program, BackendError>;

    /// Instantiate `entry_point` for one device.
    fn create_kernel(
        &self,
        program: &Self::Program,
        entry_point: &str,
        device: usize,
    ) -> Result<Self::Kernel, BackendError>;

    /// Allocate an uninitialised read-write buffer of `bytes` bytes.
    fn create_buffer(&self, bytes: usize) -> Result<Self::Buffer, BackendError>;

    fn release_buffer(&self, buffer: Self::Buffer) -> Result<(), BackendError>;

    /// Enqueue a host-to-device copy of `data` on `device`'s queue.
    fn write_buffer(
        &self,
        device: usize,
        buffer: &mut Self::Buffer,
        data: &[f32],
    ) -> Result<Self::Event, BackendError>;

    /// Bind `(input, output)` as arguments 0 and 1.
    fn set_kernel_args(
        &self,
        kernel: &mut Self::Kernel,
        input: &Self::Buffer,
        output: &Self::Buffer,
    ) -> Result<(), BackendError>;

    /// Enqueue a 2-D launch of `kernel` on `device`'s queue.
    fn enqueue_kernel(
        &self,
        device: usize,
        kernel: &Self::Kernel,
        dims: &LaunchDims,
    ) -> Result<Self::Event, BackendError>;
}
