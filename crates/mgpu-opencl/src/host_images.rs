//! Host-side image storage.
//!
//! Every host array carries a guard that records its own drop in a shared
//! [`HostLedger`], so teardown reports frees that actually happened.

use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use mgpu_common::SetupError;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArrayKind {
    Image = 0,
    SingleResult = 1,
    MultiResult = 2,
}

/// Allocation and free counters for the arrays of one [`HostImageSet`].
#[derive(Debug, Default)]
pub struct HostLedger {
    allocated: [AtomicUsize; 3],
    freed: [AtomicUsize; 3],
}

impl HostLedger {
    /// Arrays allocated but not yet dropped.
    pub fn live(&self) -> usize {
        let allocated: usize = self.allocated.iter().map(|c| c.load(Ordering::Acquire)).sum();
        let freed: usize = self.freed.iter().map(|c| c.load(Ordering::Acquire)).sum();
        allocated - freed
    }

    /// Arrays dropped so far, by kind.
    pub fn freed(&self) -> ReleasedImages {
        let count = |kind: ArrayKind| self.freed[kind as usize].load(Ordering::Acquire);
        ReleasedImages {
            images: count(ArrayKind::Image),
            single_results: count(ArrayKind::SingleResult),
            multi_results: count(ArrayKind::MultiResult),
        }
    }
}

/// One host array; its drop is recorded in the owning ledger.
#[derive(Debug)]
struct HostArray {
    data: Vec<f32>,
    kind: ArrayKind,
    ledger: Arc<HostLedger>,
}

impl HostArray {
    fn new(data: Vec<f32>, kind: ArrayKind, ledger: &Arc<HostLedger>) -> Self {
        ledger.allocated[kind as usize].fetch_add(1, Ordering::AcqRel);
        Self { data, kind, ledger: Arc::clone(ledger) }
    }
}

impl Deref for HostArray {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.data
    }
}

impl Drop for HostArray {
    fn drop(&mut self) {
        self.ledger.freed[self.kind as usize].fetch_add(1, Ordering::AcqRel);
    }
}

/// Input images plus the two result sets, one per strategy.
///
/// Inputs are filled with uniform values in `[0, 1)`. Result images are
/// allocated zeroed and kept for symmetry with the device side; nothing
/// reads device output back into them.
#[derive(Debug)]
pub struct HostImageSet {
    width: usize,
    height: usize,
    seed: u64,
    images: Vec<HostArray>,
    single_results: Vec<HostArray>,
    multi_results: Vec<HostArray>,
    ledger: Arc<HostLedger>,
}

/// Arrays freed by [`HostImageSet::release`], as counted by their drop guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReleasedImages {
    pub images: usize,
    pub single_results: usize,
    pub multi_results: usize,
}

impl HostImageSet {
    /// Generate `num_images` random images of `width × height` floats.
    ///
    /// With `seed` unset a seed is drawn from the thread RNG and logged so
    /// the run can be reproduced.
    pub fn generate(
        num_images: usize,
        width: usize,
        height: usize,
        seed: Option<u64>,
    ) -> Result<Self, SetupError> {
        if width == 0 || height == 0 {
            return Err(SetupError::InvalidShape(format!(
                "image dimensions must be positive, got {width}x{height}"
            )));
        }
        let elements = width.checked_mul(height).ok_or_else(|| {
            SetupError::InvalidShape(format!("{width}x{height} image overflows usize"))
        })?;

        let seed = seed.unwrap_or_else(|| rand::rng().random());
        debug!(seed, num_images, width, height, "generating host images");

        let ledger = Arc::new(HostLedger::default());
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let images = (0..num_images)
            .map(|_| {
                let data = (0..elements).map(|_| rng.random::<f32>()).collect();
                HostArray::new(data, ArrayKind::Image, &ledger)
            })
            .collect();
        let zeroed = |kind: ArrayKind| -> Vec<HostArray> {
            (0..num_images)
                .map(|_| HostArray::new(vec![0.0f32; elements], kind, &ledger))
                .collect()
        };

        Ok(Self {
            width,
            height,
            seed,
            images,
            single_results: zeroed(ArrayKind::SingleResult),
            multi_results: zeroed(ArrayKind::MultiResult),
            ledger,
        })
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Elements per image.
    pub fn elements(&self) -> usize {
        self.width * self.height
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn image(&self, index: usize) -> Option<&[f32]> {
        self.images.get(index).map(|a| &**a)
    }

    pub fn images(&self) -> impl ExactSizeIterator<Item = &[f32]> {
        self.images.iter().map(|a| &**a)
    }

    pub fn single_results(&self) -> impl ExactSizeIterator<Item = &[f32]> {
        self.single_results.iter().map(|a| &**a)
    }

    pub fn multi_results(&self) -> impl ExactSizeIterator<Item = &[f32]> {
        self.multi_results.iter().map(|a| &**a)
    }

    /// Shared counters; outlives the set so frees can be checked afterwards.
    pub fn ledger(&self) -> Arc<HostLedger> {
        Arc::clone(&self.ledger)
    }

    /// Drop every host array and report how many were freed.
    pub fn release(self) -> ReleasedImages {
        let ledger = self.ledger();
        drop(self);
        let released = ledger.freed();
        debug!(?released, live = ledger.live(), "host images released");
        released
    }
}
