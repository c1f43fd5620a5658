pub mod mesh;
pub mod texture;

pub use mesh::{GridMesh, MeshError};
pub use texture::{TextureError, TextureImage, TextureKind};
