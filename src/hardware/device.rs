//! Device and dtype selection
//!
//! `auto` prefers CUDA, then Metal, then CPU, limited to the backends this
//! binary was compiled with.

use std::fmt;
use std::str::FromStr;

use candle_core::{DType, Device};

use crate::error::{LlamaError, LlamaResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceChoice {
    Auto,
    Cpu,
    Cuda(usize),
    Metal,
}

impl FromStr for DeviceChoice {
    type Err = LlamaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "auto" => Ok(DeviceChoice::Auto),
            "cpu" => Ok(DeviceChoice::Cpu),
            "cuda" => Ok(DeviceChoice::Cuda(0)),
            "metal" => Ok(DeviceChoice::Metal),
            other => match other.strip_prefix("cuda:") {
                Some(ordinal) => ordinal
                    .parse()
                    .map(DeviceChoice::Cuda)
                    .map_err(|_| LlamaError::Config(format!("invalid CUDA ordinal: {}", ordinal))),
                None => Err(LlamaError::Config(format!(
                    "unknown device '{}' (expected auto, cpu, cuda, cuda:N or metal)",
                    other
                ))),
            },
        }
    }
}

impl fmt::Display for DeviceChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceChoice::Auto => write!(f, "auto"),
            DeviceChoice::Cpu => write!(f, "cpu"),
            DeviceChoice::Cuda(n) => write!(f, "cuda:{}", n),
            DeviceChoice::Metal => write!(f, "metal"),
        }
    }
}

/// Resolve a device choice to a candle device
pub fn select_device(choice: DeviceChoice) -> LlamaResult<Device> {
    let device = match choice {
        DeviceChoice::Cpu => Device::Cpu,
        DeviceChoice::Auto => auto_device()?,
        DeviceChoice::Cuda(ordinal) => cuda_device(ordinal)?,
        DeviceChoice::Metal => metal_device()?,
    };
    tracing::info!(requested = %choice, device = ?device, "Selected device");
    Ok(device)
}

fn auto_device() -> LlamaResult<Device> {
    #[cfg(feature = "cuda")]
    {
        if candle_core::utils::cuda_is_available() {
            return cuda_device(0);
        }
    }

    #[cfg(all(feature = "metal", target_os = "macos"))]
    {
        if candle_core::utils::metal_is_available() {
            return metal_device();
        }
    }

    Ok(Device::Cpu)
}

#[cfg(feature = "cuda")]
fn cuda_device(ordinal: usize) -> LlamaResult<Device> {
    Device::new_cuda(ordinal)
        .map_err(|e| crate::error::ModelError::load_failed(format!("CUDA device {}: {}", ordinal, e)).into())
}

#[cfg(not(feature = "cuda"))]
fn cuda_device(_ordinal: usize) -> LlamaResult<Device> {
    Err(LlamaError::Config(
        "CUDA requested but this build has no `cuda` feature".to_string(),
    ))
}

#[cfg(feature = "metal")]
fn metal_device() -> LlamaResult<Device> {
    Device::new_metal(0).map_err(|e| crate::error::ModelError::load_failed(format!("Metal device: {}", e)).into())
}

#[cfg(not(feature = "metal"))]
fn metal_device() -> LlamaResult<Device> {
    Err(LlamaError::Config(
        "Metal requested but this build has no `metal` feature".to_string(),
    ))
}

/// Weight dtype: explicit name, else f16 on accelerators and f32 on CPU
pub fn select_dtype(name: Option<&str>, device: &Device) -> LlamaResult<DType> {
    match name.map(|n| n.trim().to_ascii_lowercase()).as_deref() {
        Some("f16") => Ok(DType::F16),
        Some("bf16") => Ok(DType::BF16),
        Some("f32") => Ok(DType::F32),
        Some(other) => Err(LlamaError::Config(format!("unsupported dtype {}", other))),
        None if device.is_cpu() => Ok(DType::F32),
        None => Ok(DType::F16),
    }
}
