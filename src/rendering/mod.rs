pub mod gpu;
pub mod recording;
pub mod wgpu_context;

// Re-export the context trait and the wgpu backend as the main interface
pub use gpu::{GpuContext, GpuError, GpuHandle, GpuLimits};
pub use wgpu_context::WgpuContext;
