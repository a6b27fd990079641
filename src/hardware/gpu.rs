//! GPU Detection
//!
//! Queries `nvidia-smi` for the first NVIDIA GPU. Used for logging what the
//! machine has before the weights are placed; the device itself is chosen
//! in `device`.

use serde::{Deserialize, Serialize};
use std::process::Command;

/// GPU type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuType {
    Nvidia,
    Cpu,
}

impl GpuType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GpuType::Nvidia => "nvidia",
            GpuType::Cpu => "cpu",
        }
    }
}

/// GPU detection result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuInfo {
    pub gpu_type: GpuType,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vram_mb: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_version: Option<String>,
}

impl GpuInfo {
    pub fn cpu_fallback() -> Self {
        GpuInfo {
            gpu_type: GpuType::Cpu,
            name: "CPU Only".to_string(),
            vram_mb: None,
            driver_version: None,
        }
    }
}

/// Detect the first NVIDIA GPU, falling back to CPU
pub fn detect_gpu() -> GpuInfo {
    match detect_nvidia() {
        Some(info) => {
            tracing::info!(name = %info.name, vram_mb = ?info.vram_mb, "Detected NVIDIA GPU");
            info
        }
        None => {
            tracing::info!("No NVIDIA GPU detected");
            GpuInfo::cpu_fallback()
        }
    }
}

fn detect_nvidia() -> Option<GpuInfo> {
    let output = Command::new("nvidia-smi")
        .args(["--query-gpu=name,memory.total,driver_version", "--format=csv,noheader,nounits"])
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_nvidia_smi_line(stdout.lines().next()?)
}

/// Parse one `name, memory.total, driver_version` CSV row
pub fn parse_nvidia_smi_line(line: &str) -> Option<GpuInfo> {
    let parts: Vec<&str> = line.split(',').map(|s| s.trim()).collect();
    if parts.len() < 3 || parts[0].is_empty() {
        return None;
    }

    Some(GpuInfo {
        gpu_type: GpuType::Nvidia,
        name: parts[0].to_string(),
        vram_mb: parts[1].parse().ok(),
        driver_version: if parts[2].is_empty() { None } else { Some(parts[2].to_string()) },
    })
}
