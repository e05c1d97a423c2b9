//! Command-line options and their merge into [`BenchConfig`].
//!
//! `-h` sets the image height, so help is only reachable as `--help`.

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};
use mgpu_common::launch::parse_pair;
use mgpu_common::{BackendKind, BenchConfig, ConfigError, DeviceType, ImageCount};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Multi-device kernel dispatch benchmark
#[derive(Debug, Parser)]
#[command(name = "mgpu")]
#[command(about = "Compare explicit per-device copies with implicit cross-device buffer access")]
#[command(long_about = r#"
Runs the `nlm` kernel over a set of random images on every device of a shared
compute context, first copying each image to every device ("Copy"), then
uploading it once and letting all devices read device 0's buffer
("Pass-through"). Prints the total wall-clock time of each strategy.

Examples:
  # Default: 16 images per device, 1024x1024
  mgpu

  # 32 images of 512x256 on the host reference backend with 4 devices
  mgpu -n 32 -w 512 -h 256 --backend reference --reference-devices 4
"#)]
#[command(version, disable_help_flag = true)]
pub struct Cli {
    /// Number of images; negative means 16 per device
    #[arg(short = 'n', long = "num-images", value_name = "N", allow_negative_numbers = true)]
    pub num_images: Option<i64>,

    /// Image width in pixels
    #[arg(short = 'w', long, value_name = "PIXELS")]
    pub width: Option<usize>,

    /// Image height in pixels
    #[arg(short = 'h', long, value_name = "PIXELS")]
    pub height: Option<usize>,

    /// Configuration file (TOML)
    #[arg(short = 'c', long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Compute backend (auto, opencl, reference)
    #[arg(long, value_name = "BACKEND")]
    pub backend: Option<BackendKind>,

    /// OpenCL device class (gpu, cpu, accelerator, all)
    #[arg(long, value_name = "TYPE")]
    pub device_type: Option<DeviceType>,

    /// Use at most this many devices
    #[arg(long, value_name = "N")]
    pub max_devices: Option<usize>,

    /// Simulated devices for the reference backend
    #[arg(long, value_name = "N")]
    pub reference_devices: Option<usize>,

    /// Kernel source file replacing the embedded nlm.cl
    #[arg(long = "kernel", value_name = "PATH")]
    pub kernel_path: Option<PathBuf>,

    /// Options passed to the program build
    #[arg(long, value_name = "OPTS", allow_hyphen_values = true)]
    pub build_options: Option<String>,

    /// Explicit work-group size
    #[arg(long, value_name = "WxH", value_parser = parse_pair)]
    pub local_size: Option<[usize; 2]>,

    /// Seed for the random input images
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    pub print_config: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Log format
    #[arg(long, value_enum, value_name = "FORMAT", default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    pub help: Option<bool>,
}

impl Cli {
    /// Defaults, then the config file, then `MGPU_*`, then these flags.
    pub fn resolve_config(&self) -> Result<BenchConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => BenchConfig::load(path)?,
            None => BenchConfig::from_env()?,
        };
        self.apply_to(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply_to(&self, config: &mut BenchConfig) {
        if let Some(n) = self.num_images {
            config.num_images = ImageCount::from_signed(n);
        }
        if let Some(w) = self.width {
            config.width = w;
        }
        if let Some(h) = self.height {
            config.height = h;
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(kind) = self.device_type {
            config.device_type = kind;
        }
        if self.max_devices.is_some() {
            config.max_devices = self.max_devices;
        }
        if let Some(n) = self.reference_devices {
            config.reference_devices = n;
        }
        if self.kernel_path.is_some() {
            config.kernel_path = self.kernel_path.clone();
        }
        if let Some(opts) = &self.build_options {
            config.build_options = opts.clone();
        }
        if self.local_size.is_some() {
            config.local_size = self.local_size;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
    }

    /// Level used when `RUST_LOG` is unset.
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("warn")
    }
}
