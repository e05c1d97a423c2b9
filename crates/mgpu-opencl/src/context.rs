//! OpenCL implementation of [`ComputeBackend`].
//!
//! One context spans every selected device of a platform, with one
//! in-order command queue per device. Buffers are created on the context,
//! so any device may be handed any buffer as a kernel argument.

use std::ptr;

use mgpu_common::{BackendError, DeviceType, LaunchDims, SetupError, status};
use opencl3::command_queue::CommandQueue;
use opencl3::context::Context;
use opencl3::error_codes::ClError;
use opencl3::event::Event;
use opencl3::kernel::Kernel;
use opencl3::memory::{Buffer, CL_MEM_READ_WRITE, ClMem};
use opencl3::program::Program;
use opencl3::types::{CL_BLOCKING, cl_device_id};
use tracing::{debug, info};

use crate::backend::{CompletionEvent, ComputeBackend};
use crate::device::PlatformDevices;

fn cl_error(op: &str, err: ClError) -> BackendError {
    BackendError::new(err.0, format!("{op}: {err}"))
}

/// Device buffer of `f32` elements.
#[derive(Debug)]
pub struct OpenClBuffer(Buffer<f32>);

/// Kernel instance owned by one device's worker.
#[derive(Debug)]
pub struct OpenClKernel(Kernel);

/// Completion event of an enqueued command.
#[derive(Debug)]
pub struct OpenClEvent(Event);

// SAFETY: OpenCL memory, kernel and event objects are reference-counted
// handles the runtime allows to be used from any host thread. Kernel
// arguments are only rebound by the single worker that owns the kernel
// for the duration of a round.
unsafe impl Send for OpenClBuffer {}
unsafe impl Sync for OpenClBuffer {}
unsafe impl Send for OpenClKernel {}
unsafe impl Send for OpenClEvent {}

impl CompletionEvent for OpenClEvent {
    fn wait(self) -> Result<(), BackendError> {
        self.0.wait().map_err(|e| cl_error("clWaitForEvents", e))
    }
}

/// Shared context plus one command queue per device.
pub struct OpenClBackend {
    platform_name: String,
    device_names: Vec<String>,
    device_ids: Vec<cl_device_id>,
    context: Context,
    queues: Vec<CommandQueue>,
}

// SAFETY: the context and command queues are thread-safe OpenCL objects;
// each queue receives commands from at most one worker per round.
unsafe impl Send for OpenClBackend {}
unsafe impl Sync for OpenClBackend {}

impl std::fmt::Debug for OpenClBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenClBackend")
            .field("platform", &self.platform_name)
            .field("devices", &self.device_names)
            .finish()
    }
}

impl OpenClBackend {
    /// Open every device of `kind` on the first platform that has one.
    pub fn new(kind: DeviceType, max_devices: Option<usize>) -> Result<Self, SetupError> {
        let found = PlatformDevices::discover(kind, max_devices)?;
        let device_ids: Vec<cl_device_id> = found.devices.iter().map(|d| d.id()).collect();

        let context = Context::from_devices(&device_ids, &[], None, ptr::null_mut())
            .map_err(|e| SetupError::Backend(cl_error("clCreateContext", e)))?;

        let mut queues = Vec::with_capacity(device_ids.len());
        for (index, &id) in device_ids.iter().enumerate() {
            #[allow(deprecated, unused_unsafe)]
            let queue = unsafe { CommandQueue::create(&context, id, 0) }.map_err(|e| {
                SetupError::Backend(cl_error(&format!("clCreateCommandQueue (device {index})"), e))
            })?;
            queues.push(queue);
        }

        info!(
            "OpenCL context on '{}' with {} device(s)",
            found.platform_name,
            device_ids.len()
        );
        Ok(Self {
            platform_name: found.platform_name,
            device_names: found.device_names,
            device_ids,
            context,
            queues,
        })
    }

    pub fn platform_name(&self) -> &str {
        &self.platform_name
    }

    fn queue(&self, device: usize) -> Result<&CommandQueue, BackendError> {
        self.queues.get(device).ok_or_else(|| {
            BackendError::new(status::INVALID_COMMAND_QUEUE, format!("no queue for device {device}"))
        })
    }
}

impl ComputeBackend for OpenClBackend {
    type Buffer = OpenClBuffer;
    type Kernel = OpenClKernel;
    type Program = Program;
    type Event = OpenClEvent;

    fn name(&self) -> &str {
        "opencl"
    }

    fn device_count(&self) -> usize {
        self.device_ids.len()
    }

    fn device_name(&self, device: usize) -> String {
        self.device_names.get(device).cloned().unwrap_or_default()
    }

    fn build_program(&self, source: &str, options: &str) -> Result<Program, BackendError> {
        let program = Program::create_and_build_from_source(&self.context, source, options)
            .map_err(|log| BackendError::new(status::BUILD_PROGRAM_FAILURE, log))?;
        debug!("Compiled OpenCL program for {} device(s)", self.device_ids.len());
        Ok(program)
    }

    fn create_kernel(
        &self,
        program: &Program,
        entry_point: &str,
        device: usize,
    ) -> Result<OpenClKernel, BackendError> {
        if device >= self.device_ids.len() {
            return Err(BackendError::new(status::INVALID_DEVICE, format!("device {device}")));
        }
        Kernel::create(program, entry_point)
            .map(OpenClKernel)
            .map_err(|e| cl_error(&format!("clCreateKernel({entry_point})"), e))
    }

    fn create_buffer(&self, bytes: usize) -> Result<OpenClBuffer, BackendError> {
        let count = bytes / std::mem::size_of::<f32>();
        let buffer = unsafe {
            Buffer::<f32>::create(&self.context, CL_MEM_READ_WRITE, count, ptr::null_mut())
        }
        .map_err(|e| cl_error("clCreateBuffer", e))?;
        Ok(OpenClBuffer(buffer))
    }

    fn release_buffer(&self, buffer: OpenClBuffer) -> Result<(), BackendError> {
        // clReleaseMemObject runs in Buffer's Drop.
        drop(buffer);
        Ok(())
    }

    fn write_buffer(
        &self,
        device: usize,
        buffer: &mut OpenClBuffer,
        data: &[f32],
    ) -> Result<OpenClEvent, BackendError> {
        let queue = self.queue(device)?;
        let event = unsafe { queue.enqueue_write_buffer(&mut buffer.0, CL_BLOCKING, 0, data, &[]) }
            .map_err(|e| cl_error("clEnqueueWriteBuffer", e))?;
        Ok(OpenClEvent(event))
    }

    fn set_kernel_args(
        &self,
        kernel: &mut OpenClKernel,
        input: &OpenClBuffer,
        output: &OpenClBuffer,
    ) -> Result<(), BackendError> {
        unsafe {
            kernel.0.set_arg(0, &input.0.get()).map_err(|e| cl_error("clSetKernelArg(0)", e))?;
            kernel.0.set_arg(1, &output.0.get()).map_err(|e| cl_error("clSetKernelArg(1)", e))?;
        }
        Ok(())
    }

    fn enqueue_kernel(
        &self,
        device: usize,
        kernel: &OpenClKernel,
        dims: &LaunchDims,
    ) -> Result<OpenClEvent, BackendError> {
        let queue = self.queue(device)?;
        let local_ptr = dims.local.as_ref().map_or(ptr::null(), |l| l.as_ptr());
        let event = unsafe {
            queue.enqueue_nd_range_kernel(
                kernel.0.get(),
                2,
                ptr::null(),
                dims.global.as_ptr(),
                local_ptr,
                &[],
            )
        }
        .map_err(|e| cl_error("clEnqueueNDRangeKernel", e))?;
        Ok(OpenClEvent(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::{NLM_ENTRY, NLM_SRC};

    #[test]
    fn cl_error_keeps_status() {
        let e = cl_error("clCreateBuffer", ClError(status::MEM_OBJECT_ALLOCATION_FAILURE));
        assert_eq!(e.status, status::MEM_OBJECT_ALLOCATION_FAILURE);
        assert!(e.message.starts_with("clCreateBuffer"));
    }

    #[test]
    fn nlm_round_trip_when_hardware_present() {
        let Ok(backend) = OpenClBackend::new(DeviceType::All, Some(1)) else {
            return;
        };
        assert!(!backend.platform_name().is_empty());
        let program = backend.build_program(NLM_SRC, "").unwrap();
        let mut kernel = backend.create_kernel(&program, NLM_ENTRY, 0).unwrap();
        let mut input = backend.create_buffer(16).unwrap();
        let output = backend.create_buffer(16).unwrap();

        backend.write_buffer(0, &mut input, &[0.5; 4]).unwrap().wait().unwrap();
        backend.set_kernel_args(&mut kernel, &input, &output).unwrap();
        backend.enqueue_kernel(0, &kernel, &LaunchDims::new(2, 2)).unwrap().wait().unwrap();

        backend.release_buffer(input).unwrap();
        backend.release_buffer(output).unwrap();
    }
}
