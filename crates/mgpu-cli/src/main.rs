//! mgpu: multi-device kernel dispatch benchmark
//!
//! Times the Copy and Pass-through strategies back to back on one set of
//! devices and prints one summary line per strategy.

use std::io::{self, IsTerminal};

use anyhow::{Context, Result};
use clap::Parser;
use clap::error::ErrorKind;
use tracing::{debug, error};

use mgpu_cli::exit::{EXIT_OPTION_FAIL, EXIT_SUCCESS, code_for};
use mgpu_cli::options::{Cli, LogFormat};
use mgpu_cli::output::{Report, current_host, current_user};
use mgpu_common::{BackendKind, BenchConfig, MgpuError, SetupError};
use mgpu_opencl::{BenchmarkRunner, ComputeBackend, DispatchStrategy, ReferenceBackend};

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            std::process::exit(EXIT_SUCCESS);
        }
        Err(e) => {
            eprintln!("Option parsing failed: {e}");
            std::process::exit(EXIT_OPTION_FAIL);
        }
    };

    if let Err(e) = setup_logging(&cli) {
        eprintln!("Logging setup failed: {e}");
    }

    if let Err(e) = run(&cli) {
        error!("Benchmark failed: {}", e);
        let mut source = e.source();
        while let Some(err) = source {
            error!("  Caused by: {}", err);
            source = err.source();
        }
        std::process::exit(code_for(&e));
    }
}

/// Setup logging on stderr; stdout carries only the report.
fn setup_logging(cli: &Cli) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log_level()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal());

    let installed = match cli.log_format {
        LogFormat::Json => subscriber
            .json()
            .with_timer(tracing_subscriber::fmt::time::uptime())
            .try_init(),
        LogFormat::Compact => subscriber.compact().try_init(),
        LogFormat::Pretty => subscriber.pretty().try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("{e}"))
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.resolve_config().map_err(MgpuError::from)?;

    if cli.print_config {
        let rendered = config.to_toml().context("Failed to serialize configuration")?;
        print!("{rendered}");
        return Ok(());
    }

    match mgpu_opencl::resolve_backend(config.backend).map_err(MgpuError::from)? {
        BackendKind::Reference => {
            let backend = ReferenceBackend::new(config.reference_devices);
            run_with(&backend, &config)
        }
        #[cfg(feature = "opencl-runtime")]
        BackendKind::OpenCl => {
            let backend = mgpu_opencl::OpenClBackend::new(config.device_type, config.max_devices)
                .map_err(MgpuError::from)?;
            debug!(
                platform = backend.platform_name(),
                devices = backend.device_count(),
                "OpenCL backend ready"
            );
            run_with(&backend, &config)
        }
        other => Err(MgpuError::from(SetupError::NoDevices {
            reason: format!("backend '{other}' is not available in this build"),
        })
        .into()),
    }
}

fn run_with<B: ComputeBackend>(backend: &B, config: &BenchConfig) -> Result<()> {
    let mut report = Report::new(io::stdout().lock());
    report.identity(&current_user(), &current_host())?;

    let mut runner = BenchmarkRunner::setup(backend, config)?;
    report.configuration(runner.num_images(), &runner.dims())?;

    for strategy in DispatchStrategy::ALL {
        let timing = runner.execute(strategy)?;
        report.summary(&timing)?;
    }

    let released = runner.teardown().map_err(MgpuError::Teardown)?;
    debug!(?released, "resources released");
    Ok(())
}
