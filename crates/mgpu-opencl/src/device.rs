//! Device enumeration for the OpenCL backend.

use mgpu_common::{DeviceType, SetupError};
use opencl3::device::{
    CL_DEVICE_TYPE_ACCELERATOR, CL_DEVICE_TYPE_ALL, CL_DEVICE_TYPE_CPU, CL_DEVICE_TYPE_GPU,
    Device,
};
use opencl3::platform::get_platforms;
use opencl3::types::cl_device_type;
use tracing::{debug, info};

/// Devices of one platform that will share a context.
#[derive(Debug)]
pub struct PlatformDevices {
    pub(crate) devices: Vec<Device>,
    pub platform_name: String,
    pub device_names: Vec<String>,
}

pub(crate) fn device_type_mask(kind: DeviceType) -> cl_device_type {
    match kind {
        DeviceType::Gpu => CL_DEVICE_TYPE_GPU,
        DeviceType::Cpu => CL_DEVICE_TYPE_CPU,
        DeviceType::Accelerator => CL_DEVICE_TYPE_ACCELERATOR,
        DeviceType::All => CL_DEVICE_TYPE_ALL,
    }
}

impl PlatformDevices {
    /// Pick the first platform exposing at least one device of `kind`,
    /// keeping at most `max_devices` of them.
    pub fn discover(kind: DeviceType, max_devices: Option<usize>) -> Result<Self, SetupError> {
        let platforms = get_platforms().map_err(|e| SetupError::NoDevices {
            reason: format!("querying OpenCL platforms failed: {e}"),
        })?;
        if platforms.is_empty() {
            return Err(SetupError::NoDevices { reason: "no OpenCL platforms".into() });
        }

        for platform in platforms {
            let platform_name = platform.name().unwrap_or_else(|_| "unknown".to_string());
            debug!("Scanning OpenCL platform: {}", platform_name);

            let mut ids = platform.get_devices(device_type_mask(kind)).unwrap_or_default();
            if ids.is_empty() {
                continue;
            }
            if let Some(max) = max_devices {
                ids.truncate(max);
            }

            let devices: Vec<Device> = ids.into_iter().map(Device::new).collect();
            let device_names: Vec<String> =
                devices.iter().map(|d| d.name().unwrap_or_default()).collect();
            info!(
                "Selected platform '{}' with {} {} device(s)",
                platform_name,
                devices.len(),
                kind
            );
            return Ok(Self { devices, platform_name, device_names });
        }

        Err(SetupError::NoDevices { reason: format!("no OpenCL platform exposes a {kind} device") })
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
