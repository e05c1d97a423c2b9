//! Benchmark driver: setup, timed strategy runs and teardown.

use std::time::{Duration, Instant};

use mgpu_common::{BackendError, BenchConfig, LaunchDims, MgpuError, SetupError};
use tracing::{debug, info, warn};

use crate::backend::ComputeBackend;
use crate::buffer_pool::DeviceBufferPool;
use crate::dispatcher::Dispatcher;
use crate::host_images::HostImageSet;
use crate::kernels::{KernelSource, NLM_ENTRY};
use crate::strategy::DispatchStrategy;

/// Wall-clock result of one strategy run over all images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyTiming {
    pub strategy: DispatchStrategy,
    pub elapsed: Duration,
    pub rounds: usize,
    pub uploads: usize,
    pub launches: usize,
}

impl StrategyTiming {
    pub fn seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// Resources released at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TeardownReport {
    pub host_images: usize,
    pub single_results: usize,
    pub multi_results: usize,
    pub device_buffers: usize,
}

/// Owns everything a benchmark needs between setup and teardown.
pub struct BenchmarkRunner<'b, B: ComputeBackend> {
    backend: &'b B,
    images: HostImageSet,
    pool: DeviceBufferPool<B>,
    dispatcher: Dispatcher,
    dims: LaunchDims,
}

impl<B: ComputeBackend> std::fmt::Debug for BenchmarkRunner<'_, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BenchmarkRunner")
            .field("backend", &self.backend.name())
            .field("num_images", &self.images.len())
            .field("dims", &self.dims)
            .field("pool", &self.pool)
            .finish()
    }
}

impl<'b, B: ComputeBackend> BenchmarkRunner<'b, B> {
    /// Build the program, generate host images and allocate per-device
    /// resources. Nothing is left allocated when this fails.
    pub fn setup(backend: &'b B, config: &BenchConfig) -> Result<Self, MgpuError> {
        config.validate()?;

        let device_count = backend.device_count();
        if device_count == 0 {
            return Err(SetupError::NoDevices {
                reason: format!("backend '{}' reports zero devices", backend.name()),
            }
            .into());
        }
        for device in 0..device_count {
            debug!(device, name = %backend.device_name(device), "using device");
        }

        let dims = config.launch_dims();
        let image_bytes = dims.image_bytes().ok_or_else(|| {
            SetupError::InvalidShape(format!("{dims} image overflows the address space"))
        })?;

        let source = KernelSource::from_path(config.kernel_path.clone());
        let code = source.load()?;
        let program = backend
            .build_program(&code, &config.build_options)
            .map_err(SetupError::ProgramBuild)?;
        debug!(source = %source.describe(), options = %config.build_options, "program built");

        let num_images = config.num_images.resolve(device_count);
        let images = HostImageSet::generate(num_images, dims.width(), dims.height(), config.seed)?;

        let pool = DeviceBufferPool::allocate(backend, &program, NLM_ENTRY, image_bytes, device_count)?;
        let dispatcher = match Dispatcher::new(device_count) {
            Ok(d) => d,
            Err(e) => {
                if let Err(release) = pool.release(backend) {
                    warn!(error = %release, "releasing buffers after failed setup");
                }
                return Err(e.into());
            }
        };

        info!(
            backend = backend.name(),
            devices = device_count,
            num_images,
            dims = %dims,
            "benchmark ready"
        );
        Ok(Self { backend, images, pool, dispatcher, dims })
    }

    pub fn num_images(&self) -> usize {
        self.images.len()
    }

    pub fn dims(&self) -> LaunchDims {
        self.dims
    }

    pub fn device_count(&self) -> usize {
        self.pool.device_count()
    }

    pub fn images(&self) -> &HostImageSet {
        &self.images
    }

    pub fn pool(&self) -> &DeviceBufferPool<B> {
        &self.pool
    }

    /// Push every image through `strategy`, one round at a time, timing
    /// the whole sequence.
    pub fn execute(&mut self, strategy: DispatchStrategy) -> Result<StrategyTiming, MgpuError> {
        let mut uploads = 0;
        let mut launches = 0;

        let start = Instant::now();
        for (index, image) in self.images.images().enumerate() {
            let report =
                self.dispatcher.run_round(self.backend, &mut self.pool, strategy, image, &self.dims)?;
            uploads += report.uploads;
            launches += report.launches();
            debug!(strategy = strategy.name(), image = index, "round done");
        }
        let elapsed = start.elapsed();

        let timing = StrategyTiming {
            strategy,
            elapsed,
            rounds: self.images.len(),
            uploads,
            launches,
        };
        info!(
            strategy = strategy.name(),
            seconds = timing.seconds(),
            rounds = timing.rounds,
            uploads,
            launches,
            "strategy complete"
        );
        Ok(timing)
    }

    /// Copy then Pass-through against the same buffers.
    pub fn execute_all(&mut self) -> Result<Vec<StrategyTiming>, MgpuError> {
        DispatchStrategy::ALL.iter().map(|&s| self.execute(s)).collect()
    }

    /// Release device buffers and host images.
    pub fn teardown(self) -> Result<TeardownReport, BackendError> {
        let released = self.images.release();
        let device_buffers = self.pool.release(self.backend)?;
        let report = TeardownReport {
            host_images: released.images,
            single_results: released.single_results,
            multi_results: released.multi_results,
            device_buffers,
        };
        debug!(?report, "teardown complete");
        Ok(report)
    }
}
