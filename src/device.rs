//! Compute device handles.

use crate::constants::env_vars;
use crate::error::{TrainerError, TrainerResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a training run executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    Cpu,
    Cuda { index: u32 },
}

/// Source of truth for GPU availability
pub trait DeviceProbe {
    fn cuda_device_count(&self) -> u32;
}

/// Probes the host: honours `CUDA_VISIBLE_DEVICES` and counts `/dev/nvidiaN`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDeviceProbe;

impl DeviceProbe for SystemDeviceProbe {
    fn cuda_device_count(&self) -> u32 {
        let physical = count_nvidia_device_nodes();
        match std::env::var(env_vars::CUDA_VISIBLE_DEVICES) {
            Ok(visible) => visible_device_count(&visible).min(physical),
            Err(_) => physical,
        }
    }
}

fn count_nvidia_device_nodes() -> u32 {
    let Ok(entries) = std::fs::read_dir("/dev") else {
        return 0;
    };
    let count = entries
        .filter_map(Result::ok)
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .and_then(|name| name.strip_prefix("nvidia"))
                .is_some_and(|suffix| !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()))
        })
        .count();
    u32::try_from(count).unwrap_or(u32::MAX)
}

/// Number of devices listed in a `CUDA_VISIBLE_DEVICES` value
///
/// The list stops at the first invalid (e.g. `-1`) entry, as the CUDA
/// runtime does.
fn visible_device_count(visible: &str) -> u32 {
    let count = visible
        .split(',')
        .map(str::trim)
        .take_while(|entry| !entry.is_empty() && !entry.starts_with('-'))
        .count();
    u32::try_from(count).unwrap_or(u32::MAX)
}

impl Device {
    /// GPU `index`, failing when the probe does not see it
    pub fn cuda(index: u32, probe: &dyn DeviceProbe) -> TrainerResult<Self> {
        let available = probe.cuda_device_count();
        if index >= available {
            return Err(TrainerError::DeviceUnavailable(format!(
                "cuda:{index} requested but {available} CUDA device(s) visible"
            )));
        }
        Ok(Device::Cuda { index })
    }

    /// Parse `name` and confirm the device exists; a bare `cuda` means
    /// `cuda:{default_gpu}`
    pub fn resolve(name: &str, default_gpu: u32, probe: &dyn DeviceProbe) -> TrainerResult<Self> {
        if name.trim().eq_ignore_ascii_case("cuda") {
            return Device::cuda(default_gpu, probe);
        }
        name.parse::<Device>()?.ensure_available(probe)
    }

    pub fn is_gpu(&self) -> bool {
        matches!(self, Device::Cuda { .. })
    }

    /// Confirm a parsed device exists on this host
    pub fn ensure_available(self, probe: &dyn DeviceProbe) -> TrainerResult<Self> {
        match self {
            Device::Cpu => Ok(self),
            Device::Cuda { index } => Device::cuda(index, probe),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda { index } => write!(f, "cuda:{index}"),
        }
    }
}

impl FromStr for Device {
    type Err = TrainerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        match name.split_once(':') {
            None if name == "cpu" => Ok(Device::Cpu),
            None if name == "cuda" => Ok(Device::Cuda { index: 0 }),
            Some(("cuda", index)) => index
                .parse()
                .map(|index| Device::Cuda { index })
                .map_err(|_| TrainerError::Configuration(format!("Invalid CUDA ordinal in '{s}'"))),
            _ => Err(TrainerError::Configuration(format!(
                "Unknown device '{s}', expected cpu, cuda or cuda:N"
            ))),
        }
    }
}
