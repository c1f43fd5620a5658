pub mod terrain;

pub use terrain::{TerrainError, TerrainMesh};
