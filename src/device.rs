//! Compute device selection.
//!
//! Devices are named the way torch names them (`cpu`, `cuda`, `cuda:1`) with
//! two extra spellings: `gpu` for the first CUDA device and `auto`, which picks
//! CUDA when present and falls back to the CPU like [`tch::Device::cuda_if_available`].

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::{ConfigError, Constraint, Result};

/// Answers whether CUDA devices exist on this host.
///
/// The default [`TchProbe`] asks libtorch; tests pass a fixed probe so they do
/// not depend on the machine they run on.
pub trait DeviceProbe {
    fn cuda_device_count(&self) -> usize;
}

/// Queries libtorch.
#[derive(Debug, Default, Clone, Copy)]
pub struct TchProbe;

impl DeviceProbe for TchProbe {
    fn cuda_device_count(&self) -> usize {
        if tch::Cuda::is_available() {
            usize::try_from(tch::Cuda::device_count()).unwrap_or(0)
        } else {
            0
        }
    }
}

/// Probe with a fixed number of CUDA devices.
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe(pub usize);

impl DeviceProbe for FixedProbe {
    fn cuda_device_count(&self) -> usize {
        self.0
    }
}

/// A device name as written in configuration, before availability is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRequest {
    Auto,
    Cpu,
    Cuda(usize),
}

impl FromStr for DeviceRequest {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        match name.as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda(0)),
            _ => name
                .strip_prefix("cuda:")
                .and_then(|ordinal| ordinal.parse::<usize>().ok())
                .map(Self::Cuda)
                .ok_or_else(|| s.to_string()),
        }
    }
}

impl DeviceRequest {
    /// Resolves the request to a device that exists according to `probe`.
    pub fn resolve(self, field: &str, probe: &dyn DeviceProbe) -> Result<ComputeDevice> {
        let available = probe.cuda_device_count();
        match self {
            Self::Cpu => Ok(ComputeDevice::Cpu),
            Self::Auto if available > 0 => Ok(ComputeDevice::Cuda(0)),
            Self::Auto => {
                log::warn!("no CUDA device found, `auto` falls back to cpu");
                Ok(ComputeDevice::Cpu)
            }
            Self::Cuda(ordinal) if ordinal < available => Ok(ComputeDevice::Cuda(ordinal)),
            Self::Cuda(ordinal) => Err(ConfigError::new(
                field,
                Constraint::DeviceUnavailable(ComputeDevice::Cuda(ordinal).to_string()),
            )),
        }
    }
}

impl From<ComputeDevice> for DeviceRequest {
    fn from(device: ComputeDevice) -> Self {
        match device {
            ComputeDevice::Cpu => Self::Cpu,
            ComputeDevice::Cuda(ordinal) => Self::Cuda(ordinal),
        }
    }
}

/// A device the training components can place tensors on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComputeDevice {
    Cpu,
    /// CUDA device by ordinal.
    Cuda(usize),
}

impl ComputeDevice {
    pub fn is_gpu(self) -> bool {
        matches!(self, Self::Cuda(_))
    }

    /// Parses and resolves a device name in one step.
    pub fn parse(name: &str, field: &str, probe: &dyn DeviceProbe) -> Result<Self> {
        name.parse::<DeviceRequest>()
            .map_err(|bad| ConfigError::new(field, Constraint::UnknownDevice(bad)))?
            .resolve(field, probe)
    }
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda(ordinal) => write!(f, "cuda:{ordinal}"),
        }
    }
}

impl Serialize for ComputeDevice {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl From<ComputeDevice> for tch::Device {
    fn from(device: ComputeDevice) -> Self {
        match device {
            ComputeDevice::Cpu => tch::Device::Cpu,
            ComputeDevice::Cuda(ordinal) => tch::Device::Cuda(ordinal),
        }
    }
}
