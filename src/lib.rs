// heightfield: procedural terrain grid, elevation and diffuse textures,
// and the GPU resources that draw them

pub mod assets;
pub mod config;
pub mod rendering;
pub mod utils;
pub mod world;

// Re-export commonly used types for convenience
pub use assets::{GridMesh, MeshError, TextureError};
pub use config::{HeightfieldSettings, LoggingSettings, TerrainSettings};
pub use rendering::{GpuContext, GpuError, GpuHandle, WgpuContext};
pub use world::{TerrainError, TerrainMesh};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
