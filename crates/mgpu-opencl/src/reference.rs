//! Host reference backend.
//!
//! Simulates N devices sharing one context entirely in host memory. Every
//! enqueued command runs to completion before the call returns, so events
//! are always already signalled. Useful on machines without an OpenCL
//! driver and as the executable model for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use mgpu_common::{BackendError, LaunchDims, status};
use tracing::trace;

use crate::backend::{CompletionEvent, ComputeBackend};
use crate::kernels::{NLM_ENTRY, entry_points, nlm_reference};

type Storage = Arc<RwLock<Vec<f32>>>;

/// Context-wide buffer shared by all simulated devices.
#[derive(Debug)]
pub struct ReferenceBuffer {
    id: usize,
    data: Storage,
}

impl ReferenceBuffer {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn len(&self) -> usize {
        self.data.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> Vec<f32> {
        self.data.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[derive(Debug)]
pub struct ReferenceProgram {
    entry_points: Vec<String>,
}

impl ReferenceProgram {
    pub fn entry_points(&self) -> &[String] {
        &self.entry_points
    }
}

#[derive(Debug)]
pub struct ReferenceKernel {
    device: usize,
    args: Option<BoundArgs>,
}

#[derive(Debug)]
struct BoundArgs {
    input_id: usize,
    input: Storage,
    output_id: usize,
    output: Storage,
}

/// Already-completed event.
#[derive(Debug)]
pub struct ReferenceEvent;

impl CompletionEvent for ReferenceEvent {
    fn wait(self) -> Result<(), BackendError> {
        Ok(())
    }
}

/// Host-memory backend with `devices` simulated devices.
#[derive(Debug)]
pub struct ReferenceBackend {
    devices: usize,
    next_id: AtomicUsize,
    live: AtomicUsize,
    released: AtomicUsize,
    launches: AtomicUsize,
}

impl ReferenceBackend {
    pub fn new(devices: usize) -> Self {
        Self {
            devices,
            next_id: AtomicUsize::new(0),
            live: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
            launches: AtomicUsize::new(0),
        }
    }

    /// Buffers created and not yet released.
    pub fn live_buffers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn released_buffers(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Kernel launches executed so far.
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    fn check_device(&self, device: usize, code: i32) -> Result<(), BackendError> {
        if device < self.devices {
            Ok(())
        } else {
            Err(BackendError::new(
                code,
                format!("device index {device} out of range (have {})", self.devices),
            ))
        }
    }
}

impl ComputeBackend for ReferenceBackend {
    type Buffer = ReferenceBuffer;
    type Kernel = ReferenceKernel;
    type Program = ReferenceProgram;
    type Event = ReferenceEvent;

    fn name(&self) -> &str {
        "reference"
    }

    fn device_count(&self) -> usize {
        self.devices
    }

    fn device_name(&self, device: usize) -> String {
        format!("host reference device {device}")
    }

    fn build_program(&self, source: &str, _options: &str) -> Result<ReferenceProgram, BackendError> {
        let entry_points = entry_points(source);
        if entry_points.is_empty() {
            return Err(BackendError::new(
                status::BUILD_PROGRAM_FAILURE,
                "source declares no __kernel entry points",
            ));
        }
        Ok(ReferenceProgram { entry_points })
    }

    fn create_kernel(
        &self,
        program: &ReferenceProgram,
        entry_point: &str,
        device: usize,
    ) -> Result<ReferenceKernel, BackendError> {
        self.check_device(device, status::INVALID_DEVICE)?;
        if !program.entry_points.iter().any(|e| e == entry_point) {
            return Err(BackendError::new(
                status::INVALID_KERNEL_NAME,
                format!("program has no kernel named '{entry_point}'"),
            ));
        }
        if entry_point != NLM_ENTRY {
            return Err(BackendError::new(
                status::INVALID_KERNEL_NAME,
                format!("reference backend cannot execute '{entry_point}'"),
            ));
        }
        Ok(ReferenceKernel { device, args: None })
    }

    fn create_buffer(&self, bytes: usize) -> Result<ReferenceBuffer, BackendError> {
        let elem = std::mem::size_of::<f32>();
        if bytes == 0 || bytes % elem != 0 {
            return Err(BackendError::new(
                status::INVALID_BUFFER_SIZE,
                format!("buffer size {bytes} is not a positive multiple of {elem}"),
            ));
        }
        let mut data = Vec::new();
        data.try_reserve_exact(bytes / elem).map_err(|e| {
            BackendError::new(status::MEM_OBJECT_ALLOCATION_FAILURE, format!("{bytes} bytes: {e}"))
        })?;
        data.resize(bytes / elem, 0.0);

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        trace!(id, bytes, "reference buffer created");
        Ok(ReferenceBuffer { id, data: Arc::new(RwLock::new(data)) })
    }

    fn release_buffer(&self, buffer: ReferenceBuffer) -> Result<(), BackendError> {
        trace!(id = buffer.id, "reference buffer released");
        drop(buffer);
        self.live.fetch_sub(1, Ordering::SeqCst);
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn write_buffer(
        &self,
        device: usize,
        buffer: &mut ReferenceBuffer,
        data: &[f32],
    ) -> Result<ReferenceEvent, BackendError> {
        self.check_device(device, status::INVALID_COMMAND_QUEUE)?;
        let mut dst = buffer.data.write().unwrap_or_else(PoisonError::into_inner);
        if data.len() != dst.len() {
            return Err(BackendError::new(
                status::INVALID_VALUE,
                format!("write of {} elements into buffer of {}", data.len(), dst.len()),
            ));
        }
        dst.copy_from_slice(data);
        Ok(ReferenceEvent)
    }

    fn set_kernel_args(
        &self,
        kernel: &mut ReferenceKernel,
        input: &ReferenceBuffer,
        output: &ReferenceBuffer,
    ) -> Result<(), BackendError> {
        kernel.args = Some(BoundArgs {
            input_id: input.id,
            input: Arc::clone(&input.data),
            output_id: output.id,
            output: Arc::clone(&output.data),
        });
        Ok(())
    }

    fn enqueue_kernel(
        &self,
        device: usize,
        kernel: &ReferenceKernel,
        dims: &LaunchDims,
    ) -> Result<ReferenceEvent, BackendError> {
        self.check_device(device, status::INVALID_COMMAND_QUEUE)?;
        if kernel.device != device {
            return Err(BackendError::new(
                status::INVALID_COMMAND_QUEUE,
                format!("kernel for device {} enqueued on device {device}", kernel.device),
            ));
        }
        let args = kernel
            .args
            .as_ref()
            .ok_or_else(|| BackendError::new(status::INVALID_KERNEL_ARGS, "kernel arguments not set"))?;
        if args.input_id == args.output_id {
            return Err(BackendError::new(
                status::MEM_COPY_OVERLAP,
                "input and output refer to the same buffer",
            ));
        }
        if !dims.local_divides_global() {
            return Err(BackendError::new(
                status::INVALID_WORK_GROUP_SIZE,
                format!("local size does not divide global size {dims}"),
            ));
        }

        let elements = dims.elements().filter(|&n| n > 0).ok_or_else(|| {
            BackendError::new(status::INVALID_GLOBAL_WORK_SIZE, format!("global size {dims}"))
        })?;
        let input = args.input.read().unwrap_or_else(PoisonError::into_inner);
        let mut output = args.output.write().unwrap_or_else(PoisonError::into_inner);
        if input.len() < elements || output.len() < elements {
            return Err(BackendError::new(
                status::INVALID_GLOBAL_WORK_SIZE,
                format!("global size {dims} exceeds buffer of {} elements", input.len()),
            ));
        }

        nlm_reference(&input, &mut output, dims.width(), dims.height());
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(ReferenceEvent)
    }
}
