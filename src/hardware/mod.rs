//! Hardware Module
//!
//! GPU detection and compute device selection.

pub mod device;
pub mod gpu;

pub use device::{select_device, select_dtype, DeviceChoice};
pub use gpu::{detect_gpu, GpuInfo};
