use glam::{Vec2, Vec3};

/// Largest tessellation whose index count still fits in a `u32`.
pub const MAX_TESSELLATION: u32 = 26_754;

/// Attribute location of the grid position, three tightly packed `f32`.
pub const POSITION_LOCATION: u32 = 0;
/// Attribute location of the grid uv, two tightly packed `f32`.
pub const UV_LOCATION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MeshError {
    #[error("Tessellation {requested} is outside 1..={max}")]
    InvalidTessellation { requested: u32, max: u32 },
}

/// A flat grid over the square (-1, 0, -1)..(1, 0, 1), indexed as a triangle list.
///
/// Vertex `(x, z)` lives at index `z * (N + 1) + x`. Every quad is split into
/// `(top_left, top_right, bottom_left)` and `(top_right, bottom_right, bottom_left)`.
#[derive(Debug, Clone, PartialEq)]
pub struct GridMesh {
    pub tessellation: u32,
    pub positions: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub indices: Vec<u32>,
}

impl GridMesh {
    pub fn generate(tessellation: u32) -> Result<Self, MeshError> {
        if tessellation == 0 || tessellation > MAX_TESSELLATION {
            return Err(MeshError::InvalidTessellation {
                requested: tessellation,
                max: MAX_TESSELLATION,
            });
        }

        let n = tessellation;
        let side = n + 1;
        let step = 2.0 / n as f32;
        let vertex_count = (side * side) as usize;

        let mut positions = Vec::with_capacity(vertex_count);
        let mut uvs = Vec::with_capacity(vertex_count);
        for z in 0..=n {
            for x in 0..=n {
                positions.push(Vec3::new(-1.0 + x as f32 * step, 0.0, -1.0 + z as f32 * step));
                uvs.push(Vec2::new(x as f32 / n as f32, z as f32 / n as f32));
            }
        }

        let mut indices = Vec::with_capacity(6 * (n * n) as usize);
        for z in 0..n {
            for x in 0..n {
                let top_left = z * side + x;
                let top_right = top_left + 1;
                let bottom_left = (z + 1) * side + x;
                let bottom_right = bottom_left + 1;

                indices.extend_from_slice(&[top_left, top_right, bottom_left]);
                indices.extend_from_slice(&[top_right, bottom_right, bottom_left]);
            }
        }

        Ok(Self {
            tessellation,
            positions,
            uvs,
            indices,
        })
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn position_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.positions)
    }

    pub fn uv_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.uvs)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

const POSITION_ATTRIBS: [wgpu::VertexAttribute; 1] =
    wgpu::vertex_attr_array![POSITION_LOCATION => Float32x3];
const UV_ATTRIBS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![UV_LOCATION => Float32x2];

/// Buffer layouts a render pipeline drawing the grid must declare, one
/// vertex buffer per attribute, in slot order.
pub fn vertex_buffer_layouts() -> [wgpu::VertexBufferLayout<'static>; 2] {
    use std::mem;

    [
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<Vec3>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &POSITION_ATTRIBS,
        },
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<Vec2>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &UV_ATTRIBS,
        },
    ]
}
