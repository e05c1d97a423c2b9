//! Kernel sources and their host-side reference implementation.
//!
//! The benchmark launches a single kernel, `nlm`, with the argument layout
//! `(input, output)`. The source is compiled at runtime by the backend; a
//! path in the configuration replaces the embedded copy.

use std::borrow::Cow;
use std::path::PathBuf;

use mgpu_common::SetupError;

/// Non-local means denoise kernel.
pub const NLM_SRC: &str = include_str!("../kernels/nlm.cl");

/// Entry point launched for every image.
pub const NLM_ENTRY: &str = "nlm";

pub const SEARCH_RADIUS: isize = 3;
pub const PATCH_RADIUS: isize = 1;
pub const FILTER_STRENGTH: f32 = 0.1;

/// Where the program source comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelSource {
    Embedded,
    File(PathBuf),
}

impl KernelSource {
    pub fn from_path(path: Option<PathBuf>) -> Self {
        path.map_or(Self::Embedded, Self::File)
    }

    pub fn load(&self) -> Result<Cow<'static, str>, SetupError> {
        match self {
            Self::Embedded => Ok(Cow::Borrowed(NLM_SRC)),
            Self::File(path) => std::fs::read_to_string(path)
                .map(Cow::Owned)
                .map_err(|source| SetupError::KernelSource { path: path.clone(), source }),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Embedded => "embedded nlm.cl".to_string(),
            Self::File(path) => path.display().to_string(),
        }
    }
}

/// Names of the `__kernel` entry points declared in an OpenCL C source.
pub fn entry_points(source: &str) -> Vec<String> {
    let tokens: Vec<&str> = source
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .collect();

    tokens
        .windows(3)
        .filter(|w| (w[0] == "__kernel" || w[0] == "kernel") && w[1] == "void")
        .map(|w| w[2].to_string())
        .collect()
}

/// Host implementation of the `nlm` kernel, matching `nlm.cl` pixel for pixel
/// up to floating-point reassociation.
pub fn nlm_reference(input: &[f32], output: &mut [f32], width: usize, height: usize) {
    debug_assert!(input.len() >= width * height);
    debug_assert!(output.len() >= width * height);

    let h2 = FILTER_STRENGTH * FILTER_STRENGTH;
    let fetch = |x: isize, y: isize| -> f32 {
        let x = x.clamp(0, width as isize - 1) as usize;
        let y = y.clamp(0, height as isize - 1) as usize;
        input[y * width + x]
    };

    for y in 0..height as isize {
        for x in 0..width as isize {
            let mut total_weight = 0.0f32;
            let mut accumulated = 0.0f32;

            for dy in -SEARCH_RADIUS..=SEARCH_RADIUS {
                for dx in -SEARCH_RADIUS..=SEARCH_RADIUS {
                    let mut distance = 0.0f32;
                    for py in -PATCH_RADIUS..=PATCH_RADIUS {
                        for px in -PATCH_RADIUS..=PATCH_RADIUS {
                            let diff = fetch(x + px, y + py) - fetch(x + dx + px, y + dy + py);
                            distance += diff * diff;
                        }
                    }
                    let weight = (-distance / h2).exp();
                    total_weight += weight;
                    accumulated += weight * fetch(x + dx, y + dy);
                }
            }

            output[y as usize * width + x as usize] = accumulated / total_weight;
        }
    }
}
