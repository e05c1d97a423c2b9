//! Fork/join execution of one dispatch round.
//!
//! A round uploads one image according to the strategy, then submits one
//! task per device to a dedicated worker pool. Each task binds its kernel's
//! arguments, enqueues the 2-D launch and blocks on the completion event.
//! The round returns only after every task has finished; a device whose
//! event never signals stalls the round indefinitely.

use mgpu_common::{DispatchError, LaunchDims, SetupError};
use tracing::trace;

use crate::backend::{CompletionEvent, ComputeBackend};
use crate::buffer_pool::DeviceBufferPool;
use crate::strategy::DispatchStrategy;

/// What one worker did during a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchRecord {
    pub device: usize,
    /// Input buffer the launch read from.
    pub input_index: usize,
}

/// Outcome of a completed round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundReport {
    pub uploads: usize,
    /// One record per device, ordered by device index.
    pub records: Vec<DispatchRecord>,
}

impl RoundReport {
    pub fn launches(&self) -> usize {
        self.records.len()
    }
}

/// Worker pool with one thread per device.
pub struct Dispatcher {
    workers: rayon::ThreadPool,
    device_count: usize,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").field("device_count", &self.device_count).finish()
    }
}

impl Dispatcher {
    pub fn new(device_count: usize) -> Result<Self, SetupError> {
        if device_count == 0 {
            return Err(SetupError::InvalidShape("dispatcher needs at least one device".into()));
        }
        let workers = rayon::ThreadPoolBuilder::new()
            .num_threads(device_count)
            .thread_name(|idx| format!("mgpu-dev-{idx}"))
            .build()
            .map_err(|e| SetupError::Executor(e.to_string()))?;
        Ok(Self { workers, device_count })
    }

    pub fn device_count(&self) -> usize {
        self.device_count
    }

    pub fn worker_threads(&self) -> usize {
        self.workers.current_num_threads()
    }

    /// Run one image through every device.
    ///
    /// Uploads complete before any worker starts. Any failing status aborts
    /// the round with the first error in device order.
    pub fn run_round<B: ComputeBackend>(
        &self,
        backend: &B,
        pool: &mut DeviceBufferPool<B>,
        strategy: DispatchStrategy,
        image: &[f32],
        dims: &LaunchDims,
    ) -> Result<RoundReport, DispatchError> {
        let expected = pool.image_elements();
        if image.len() != expected {
            return Err(DispatchError::ImageShape { expected, actual: image.len() });
        }

        let uploads = strategy.upload(backend, pool, image)?;
        let device_count = pool.device_count();
        let (inputs, outputs, kernels) = pool.launch_view();

        let mut outcomes: Vec<Option<Result<DispatchRecord, DispatchError>>> =
            (0..device_count).map(|_| None).collect();

        self.workers.scope(|scope| {
            for ((device, kernel), slot) in kernels.iter_mut().enumerate().zip(outcomes.iter_mut())
            {
                let input_index = strategy.input_index(device);
                let input = &inputs[input_index];
                let output = &outputs[device];
                scope.spawn(move |_| {
                    *slot = Some(
                        launch_on_device(backend, device, kernel, input, output, dims)
                            .map(|()| DispatchRecord { device, input_index }),
                    );
                });
            }
        });

        let records = outcomes.into_iter().flatten().collect::<Result<Vec<_>, _>>()?;
        trace!(uploads, launches = records.len(), strategy = strategy.name(), "round complete");
        Ok(RoundReport { uploads, records })
    }
}

fn launch_on_device<B: ComputeBackend>(
    backend: &B,
    device: usize,
    kernel: &mut B::Kernel,
    input: &B::Buffer,
    output: &B::Buffer,
    dims: &LaunchDims,
) -> Result<(), DispatchError> {
    backend
        .set_kernel_args(kernel, input, output)
        .map_err(|source| DispatchError::BindArgs { device, source })?;
    let event = backend
        .enqueue_kernel(device, kernel, dims)
        .map_err(|source| DispatchError::Enqueue { device, source })?;
    event.wait().map_err(|source| DispatchError::Wait { device, source })
}
