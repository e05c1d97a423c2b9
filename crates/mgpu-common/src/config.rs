//! Benchmark configuration.
//!
//! Loads [`BenchConfig`] from a TOML file with environment variable
//! overrides via `MGPU_*` prefixed variables. Command-line flags are
//! applied on top of the result by the front end, which then calls
//! [`BenchConfig::validate`] once on the merged value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::launch::{LaunchDims, parse_pair};

pub const DEFAULT_WIDTH: usize = 1024;
pub const DEFAULT_HEIGHT: usize = 1024;

/// Images per device when the image count is left unspecified.
pub const IMAGES_PER_DEVICE: usize = 16;

/// How many images each strategy pushes through the devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<i64>", into = "Option<usize>")]
pub enum ImageCount {
    /// Resolved to `16 × device_count` once the device count is known.
    #[default]
    Unspecified,
    Fixed(usize),
}

impl ImageCount {
    pub fn resolve(self, device_count: usize) -> usize {
        match self {
            Self::Unspecified => IMAGES_PER_DEVICE * device_count,
            Self::Fixed(n) => n,
        }
    }

    /// Interpret a signed command-line value; negative means unspecified.
    pub fn from_signed(value: i64) -> Self {
        usize::try_from(value).map_or(Self::Unspecified, Self::Fixed)
    }

    pub fn is_unspecified(&self) -> bool {
        matches!(self, Self::Unspecified)
    }
}

impl From<Option<i64>> for ImageCount {
    fn from(value: Option<i64>) -> Self {
        value.map_or(Self::Unspecified, Self::from_signed)
    }
}

impl From<ImageCount> for Option<usize> {
    fn from(value: ImageCount) -> Self {
        match value {
            ImageCount::Unspecified => None,
            ImageCount::Fixed(n) => Some(n),
        }
    }
}

impl fmt::Display for ImageCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unspecified => write!(f, "auto"),
            Self::Fixed(n) => write!(f, "{n}"),
        }
    }
}

impl std::str::FromStr for ImageCount {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" | "unspecified" => Ok(Self::Unspecified),
            other => other
                .parse::<i64>()
                .map(Self::from_signed)
                .map_err(|e| format!("invalid image count '{other}': {e}")),
        }
    }
}

/// Which compute backend drives the benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// OpenCL when compiled in, otherwise the host reference backend.
    #[default]
    Auto,
    OpenCl,
    Reference,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::OpenCl => write!(f, "opencl"),
            Self::Reference => write!(f, "reference"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "opencl" => Ok(Self::OpenCl),
            "reference" | "cpu-ref" => Ok(Self::Reference),
            other => Err(format!("unknown backend: {other}")),
        }
    }
}

/// Device class to enumerate on the OpenCL platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    #[default]
    Gpu,
    Cpu,
    Accelerator,
    All,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gpu => write!(f, "gpu"),
            Self::Cpu => write!(f, "cpu"),
            Self::Accelerator => write!(f, "accelerator"),
            Self::All => write!(f, "all"),
        }
    }
}

impl std::str::FromStr for DeviceType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gpu" => Ok(Self::Gpu),
            "cpu" => Ok(Self::Cpu),
            "accelerator" => Ok(Self::Accelerator),
            "all" => Ok(Self::All),
            other => Err(format!("unknown device type: {other}")),
        }
    }
}

/// Benchmark configuration loaded from TOML with environment overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Images per strategy run.
    /// Override: `MGPU_NUM_IMAGES`
    #[serde(skip_serializing_if = "ImageCount::is_unspecified")]
    pub num_images: ImageCount,

    /// Image width in pixels.
    /// Override: `MGPU_WIDTH`
    pub width: usize,

    /// Image height in pixels.
    /// Override: `MGPU_HEIGHT`
    pub height: usize,

    /// Override: `MGPU_BACKEND`
    pub backend: BackendKind,

    /// Override: `MGPU_DEVICE_TYPE`
    pub device_type: DeviceType,

    /// Upper bound on the number of devices used.
    /// Override: `MGPU_MAX_DEVICES`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_devices: Option<usize>,

    /// Simulated device count for the reference backend.
    /// Override: `MGPU_REFERENCE_DEVICES`
    pub reference_devices: usize,

    /// Kernel source file; the embedded `nlm` source is used when unset.
    /// Override: `MGPU_KERNEL_PATH`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kernel_path: Option<PathBuf>,

    /// Options passed to the program build.
    /// Override: `MGPU_BUILD_OPTIONS`
    pub build_options: String,

    /// Explicit work-group size; runtime default when unset.
    /// Override: `MGPU_LOCAL_SIZE` (`WxH`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_size: Option<[usize; 2]>,

    /// Seed for the input images; drawn from entropy when unset.
    /// Override: `MGPU_SEED`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            num_images: ImageCount::Unspecified,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            backend: BackendKind::Auto,
            device_type: DeviceType::Gpu,
            max_devices: None,
            reference_devices: 1,
            kernel_path: None,
            build_options: String::new(),
            local_size: None,
            seed: None,
        }
    }
}

/// Errors that can occur when loading or validating a [`BenchConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML")]
    Parse(#[from] toml::de::Error),
    #[error("failed to render TOML")]
    Render(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Validation(String),
    #[error("invalid environment override {key}={value}: {reason}")]
    EnvOverride { key: String, value: String, reason: String },
}

impl BenchConfig {
    /// Render the default configuration as TOML.
    pub fn default_toml() -> String {
        Self::default().to_toml().unwrap_or_default()
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load from a TOML file, then apply environment overrides.
    ///
    /// Not validated: higher layers may still replace any value.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut cfg: BenchConfig = toml::from_str(toml_str)?;
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    /// Defaults plus environment overrides; not validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    /// Launch geometry for one image.
    pub fn launch_dims(&self) -> LaunchDims {
        LaunchDims::new(self.width, self.height).with_local(self.local_size)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Validation(format!(
                "image dimensions must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if self.launch_dims().image_bytes().is_none() {
            return Err(ConfigError::Validation(format!(
                "image of {}x{} floats overflows the address space",
                self.width, self.height
            )));
        }
        if self.num_images == ImageCount::Fixed(0) {
            return Err(ConfigError::Validation("num_images must be > 0".into()));
        }
        if self.reference_devices == 0 {
            return Err(ConfigError::Validation("reference_devices must be > 0".into()));
        }
        if self.max_devices == Some(0) {
            return Err(ConfigError::Validation("max_devices must be > 0".into()));
        }
        if let Some(local) = self.local_size {
            if !self.launch_dims().local_divides_global() {
                return Err(ConfigError::Validation(format!(
                    "local size {}x{} must be positive and divide {}x{}",
                    local[0], local[1], self.width, self.height
                )));
            }
        }
        Ok(())
    }

    /// Apply `MGPU_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(val) = env_var("MGPU_NUM_IMAGES") {
            self.num_images = parse_env("MGPU_NUM_IMAGES", &val, |v| v.parse::<ImageCount>())?;
        }
        if let Some(val) = env_var("MGPU_WIDTH") {
            self.width = parse_env("MGPU_WIDTH", &val, |v| v.parse::<usize>())?;
        }
        if let Some(val) = env_var("MGPU_HEIGHT") {
            self.height = parse_env("MGPU_HEIGHT", &val, |v| v.parse::<usize>())?;
        }
        if let Some(val) = env_var("MGPU_BACKEND") {
            self.backend = parse_env("MGPU_BACKEND", &val, |v| v.parse::<BackendKind>())?;
        }
        if let Some(val) = env_var("MGPU_DEVICE_TYPE") {
            self.device_type = parse_env("MGPU_DEVICE_TYPE", &val, |v| v.parse::<DeviceType>())?;
        }
        if let Some(val) = env_var("MGPU_MAX_DEVICES") {
            self.max_devices = Some(parse_env("MGPU_MAX_DEVICES", &val, |v| v.parse::<usize>())?);
        }
        if let Some(val) = env_var("MGPU_REFERENCE_DEVICES") {
            self.reference_devices =
                parse_env("MGPU_REFERENCE_DEVICES", &val, |v| v.parse::<usize>())?;
        }
        if let Some(val) = env_var("MGPU_KERNEL_PATH") {
            self.kernel_path = Some(PathBuf::from(val));
        }
        if let Some(val) = env_var("MGPU_BUILD_OPTIONS") {
            self.build_options = val;
        }
        if let Some(val) = env_var("MGPU_LOCAL_SIZE") {
            self.local_size = Some(parse_env("MGPU_LOCAL_SIZE", &val, parse_pair)?);
        }
        if let Some(val) = env_var("MGPU_SEED") {
            self.seed = Some(parse_env("MGPU_SEED", &val, |v| v.parse::<u64>())?);
        }
        Ok(())
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn parse_env<T, E: fmt::Display>(
    key: &str,
    value: &str,
    parse: impl FnOnce(&str) -> Result<T, E>,
) -> Result<T, ConfigError> {
    parse(value).map_err(|e| ConfigError::EnvOverride {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}
