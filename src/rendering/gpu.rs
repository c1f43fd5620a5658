use std::fmt;

use crate::assets::texture::TextureImage;

macro_rules! gpu_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

gpu_id!(
    /// Identifies a texture owned by a [`GpuContext`].
    TextureId
);
gpu_id!(
    /// Identifies a vertex, uv or index buffer owned by a [`GpuContext`].
    BufferId
);
gpu_id!(
    /// Identifies a vertex-array descriptor owned by a [`GpuContext`].
    VertexArrayId
);

/// A resource slot that is either empty or holds exactly one allocated handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuHandle<T> {
    Unallocated,
    Allocated(T),
}

impl<T> Default for GpuHandle<T> {
    fn default() -> Self {
        Self::Unallocated
    }
}

impl<T: Copy> GpuHandle<T> {
    pub fn get(&self) -> Option<T> {
        match self {
            Self::Unallocated => None,
            Self::Allocated(id) => Some(*id),
        }
    }

    pub fn is_allocated(&self) -> bool {
        matches!(self, Self::Allocated(_))
    }

    /// Returns the held handle, allocating it with `allocate` on first use.
    pub fn get_or_allocate(&mut self, allocate: impl FnOnce() -> T) -> T {
        match *self {
            Self::Allocated(id) => id,
            Self::Unallocated => {
                let id = allocate();
                *self = Self::Allocated(id);
                id
            }
        }
    }

    /// Empties the slot, returning whatever it held.
    pub fn take(&mut self) -> Option<T> {
        std::mem::take(self).get()
    }
}

/// Sampling state applied when a texture is uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerConfig {
    pub address_mode: wgpu::AddressMode,
    pub mag_filter: wgpu::FilterMode,
    pub min_filter: wgpu::FilterMode,
    /// Filter between mip levels, `None` when the texture has a single level.
    pub mipmap_filter: Option<wgpu::FilterMode>,
}

impl SamplerConfig {
    /// Clamped, bilinear, single level.
    pub const fn linear_clamped() -> Self {
        Self {
            address_mode: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: None,
        }
    }

    /// Clamped, trilinear over a full mip chain.
    pub const fn trilinear_clamped() -> Self {
        Self {
            mipmap_filter: Some(wgpu::FilterMode::Linear),
            ..Self::linear_clamped()
        }
    }

    pub fn is_mipmapped(&self) -> bool {
        self.mipmap_filter.is_some()
    }
}

/// Resource limits of the device behind a [`GpuContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuLimits {
    pub max_buffer_size: u64,
    pub max_texture_dimension_2d: u32,
}

impl GpuLimits {
    pub fn check_buffer(&self, len: usize) -> Result<(), GpuError> {
        let size = len as u64;
        if size > self.max_buffer_size {
            return Err(GpuError::BufferTooLarge {
                size,
                max: self.max_buffer_size,
            });
        }
        Ok(())
    }

    pub fn check_texture(&self, width: u32, height: u32) -> Result<(), GpuError> {
        let max = self.max_texture_dimension_2d;
        if width > max || height > max {
            return Err(GpuError::TextureTooLarge { width, height, max });
        }
        Ok(())
    }
}

impl Default for GpuLimits {
    fn default() -> Self {
        Self::from(&wgpu::Limits::default())
    }
}

impl From<&wgpu::Limits> for GpuLimits {
    fn from(limits: &wgpu::Limits) -> Self {
        Self {
            max_buffer_size: limits.max_buffer_size,
            max_texture_dimension_2d: limits.max_texture_dimension_2d,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GpuError {
    #[error("{0} was not created by this context")]
    UnknownTexture(TextureId),
    #[error("{0} was not created by this context")]
    UnknownBuffer(BufferId),
    #[error("Texel data does not match a {width}x{height} image")]
    TexelMismatch { width: u32, height: u32 },
    #[error("{width}x{height} texture exceeds the device limit of {max} texels per side")]
    TextureTooLarge { width: u32, height: u32, max: u32 },
    #[error("{size} byte buffer exceeds the device limit of {max} bytes")]
    BufferTooLarge { size: u64, max: u64 },
    #[error("Device could not allocate {size} bytes")]
    OutOfMemory { size: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    Vertex,
    Index,
}

/// Maps a tightly packed `f32` buffer onto a vertex attribute location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub buffer: BufferId,
    pub components: u32,
}

/// The GPU operations the terrain needs from whatever context is current.
///
/// Calls are executed in order and to completion. Uploads report failure
/// and leave the target untouched when they fail; the other commands log
/// and ignore ids they never handed out.
pub trait GpuContext {
    fn limits(&self) -> GpuLimits;

    fn create_texture(&mut self, label: &str) -> TextureId;
    /// Replaces the base level of `texture` and its sampling state.
    fn upload_texture(
        &mut self,
        texture: TextureId,
        image: &TextureImage,
        sampler: &SamplerConfig,
    ) -> Result<(), GpuError>;
    /// Rebuilds every mip level below the base from the last upload.
    fn generate_mipmaps(&mut self, texture: TextureId);
    fn delete_texture(&mut self, texture: TextureId);

    fn create_buffer(&mut self, label: &str) -> BufferId;
    /// Replaces the whole content of `buffer`.
    fn upload_buffer(
        &mut self,
        buffer: BufferId,
        target: BufferTarget,
        data: &[u8],
    ) -> Result<(), GpuError>;
    fn delete_buffer(&mut self, buffer: BufferId);

    fn create_vertex_array(&mut self, label: &str) -> VertexArrayId;
    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayId>);
    fn set_vertex_attribute(&mut self, vertex_array: VertexArrayId, attribute: VertexAttribute);
    fn set_index_buffer(&mut self, vertex_array: VertexArrayId, buffer: BufferId);
    fn delete_vertex_array(&mut self, vertex_array: VertexArrayId);

    /// Draws `index_count` `u32` indices as a triangle list, starting at offset
    /// zero, with the currently bound vertex array.
    fn draw_indexed(&mut self, index_count: u32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_allocates_once() {
        let mut handle = GpuHandle::default();
        let mut calls = 0;
        let first = handle.get_or_allocate(|| {
            calls += 1;
            TextureId(7)
        });
        let second = handle.get_or_allocate(|| {
            calls += 1;
            TextureId(8)
        });

        assert_eq!(first, TextureId(7));
        assert_eq!(second, TextureId(7));
        assert_eq!(calls, 1);
        assert!(handle.is_allocated());
    }

    #[test]
    fn test_handle_take_resets_slot() {
        let mut handle = GpuHandle::Allocated(BufferId(3));
        assert_eq!(handle.take(), Some(BufferId(3)));
        assert_eq!(handle, GpuHandle::Unallocated);
        assert_eq!(handle.take(), None);
    }

    #[test]
    fn test_sampler_presets() {
        assert!(!SamplerConfig::linear_clamped().is_mipmapped());
        let trilinear = SamplerConfig::trilinear_clamped();
        assert!(trilinear.is_mipmapped());
        assert_eq!(trilinear.address_mode, wgpu::AddressMode::ClampToEdge);
        assert_eq!(trilinear.min_filter, wgpu::FilterMode::Linear);
    }

    #[test]
    fn test_limits_reject_oversized_resources() {
        let limits = GpuLimits {
            max_buffer_size: 16,
            max_texture_dimension_2d: 8,
        };
        assert_eq!(limits.check_buffer(16), Ok(()));
        assert_eq!(
            limits.check_buffer(17),
            Err(GpuError::BufferTooLarge { size: 17, max: 16 })
        );
        assert_eq!(limits.check_texture(8, 8), Ok(()));
        assert_eq!(
            limits.check_texture(9, 1),
            Err(GpuError::TextureTooLarge {
                width: 9,
                height: 1,
                max: 8
            })
        );
        assert!(limits.check_texture(1, 9).is_err());
    }
}
