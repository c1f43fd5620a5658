//! A [`GpuContext`] that keeps everything on the CPU.
//!
//! Every call is appended to a command log and applied to an in-memory
//! model of the resources, so callers can inspect exactly what a draw would
//! have consumed without a device.

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use crate::assets::texture::TextureImage;
use crate::rendering::gpu::{
    BufferId, BufferTarget, GpuContext, GpuError, GpuLimits, SamplerConfig, TextureId,
    VertexArrayId, VertexAttribute,
};

#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    CreateTexture(TextureId),
    UploadTexture { texture: TextureId, width: u32, height: u32 },
    GenerateMipmaps(TextureId),
    DeleteTexture(TextureId),
    CreateBuffer(BufferId),
    UploadBuffer { buffer: BufferId, target: BufferTarget, len: usize },
    DeleteBuffer(BufferId),
    CreateVertexArray(VertexArrayId),
    BindVertexArray(Option<VertexArrayId>),
    SetVertexAttribute { vertex_array: VertexArrayId, attribute: VertexAttribute },
    SetIndexBuffer { vertex_array: VertexArrayId, buffer: BufferId },
    DeleteVertexArray(VertexArrayId),
    DrawIndexed { vertex_array: VertexArrayId, index_count: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedTexture {
    pub label: String,
    pub image: Option<TextureImage>,
    pub sampler: Option<SamplerConfig>,
    pub mipmaps_generated: bool,
    pub uploads: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedBuffer {
    pub label: String,
    pub target: Option<BufferTarget>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordedVertexArray {
    pub attributes: BTreeMap<u32, VertexAttribute>,
    pub index_buffer: Option<BufferId>,
}

/// What a draw call would have read, resolved at the moment it was issued.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDraw {
    pub vertex_array: VertexArrayId,
    pub index_count: u32,
    pub indices: Vec<u32>,
    /// Attribute data keyed by location, as `f32`.
    pub attributes: BTreeMap<u32, Vec<f32>>,
}

#[derive(Debug, Default)]
pub struct RecordingContext {
    next_id: u32,
    /// Limits uploads are checked against, `wgpu`'s defaults unless replaced.
    pub limits: GpuLimits,
    /// Number of uploads still allowed to succeed; once it reaches zero every
    /// upload fails with [`GpuError::OutOfMemory`]. `None` never fails.
    pub uploads_before_failure: Option<usize>,
    pub commands: Vec<GpuCommand>,
    pub textures: HashMap<TextureId, RecordedTexture>,
    pub buffers: HashMap<BufferId, RecordedBuffer>,
    pub vertex_arrays: HashMap<VertexArrayId, RecordedVertexArray>,
    pub bound_vertex_array: Option<VertexArrayId>,
    pub draws: Vec<RecordedDraw>,
}

impl RecordingContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    pub fn texture(&self, id: TextureId) -> Option<&RecordedTexture> {
        self.textures.get(&id)
    }

    pub fn buffer(&self, id: BufferId) -> Option<&RecordedBuffer> {
        self.buffers.get(&id)
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
        self.draws.clear();
    }

    /// Makes every upload after the next `successes` ones fail.
    pub fn fail_uploads_after(&mut self, successes: usize) {
        self.uploads_before_failure = Some(successes);
    }

    fn injected_failure(&mut self, size: usize) -> Result<(), GpuError> {
        match &mut self.uploads_before_failure {
            Some(0) => {
                warn!("Injected failure of a {} byte upload", size);
                Err(GpuError::OutOfMemory { size: size as u64 })
            }
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn resolve_draw(&self, vertex_array: VertexArrayId, index_count: u32) -> Option<RecordedDraw> {
        let state = self.vertex_arrays.get(&vertex_array)?;
        let index_data = &self.buffers.get(&state.index_buffer?)?.data;
        let indices: Vec<u32> = bytemuck::pod_collect_to_vec(index_data);
        let indices = indices.get(..index_count as usize)?.to_vec();

        let mut attributes = BTreeMap::new();
        for (location, attribute) in &state.attributes {
            let data = &self.buffers.get(&attribute.buffer)?.data;
            attributes.insert(*location, bytemuck::pod_collect_to_vec(data));
        }

        Some(RecordedDraw {
            vertex_array,
            index_count,
            indices,
            attributes,
        })
    }
}

impl GpuContext for RecordingContext {
    fn limits(&self) -> GpuLimits {
        self.limits
    }

    fn create_texture(&mut self, label: &str) -> TextureId {
        let id = TextureId(self.allocate());
        self.textures.insert(
            id,
            RecordedTexture {
                label: label.to_string(),
                image: None,
                sampler: None,
                mipmaps_generated: false,
                uploads: 0,
            },
        );
        self.commands.push(GpuCommand::CreateTexture(id));
        id
    }

    fn upload_texture(
        &mut self,
        texture: TextureId,
        image: &TextureImage,
        sampler: &SamplerConfig,
    ) -> Result<(), GpuError> {
        if !self.textures.contains_key(&texture) {
            warn!("Upload to unknown texture {}", texture);
            return Err(GpuError::UnknownTexture(texture));
        }
        self.limits.check_texture(image.width, image.height)?;
        if !image.is_consistent() {
            return Err(GpuError::TexelMismatch {
                width: image.width,
                height: image.height,
            });
        }
        self.injected_failure(image.as_bytes().len())?;

        let Some(slot) = self.textures.get_mut(&texture) else {
            return Err(GpuError::UnknownTexture(texture));
        };
        slot.image = Some(image.clone());
        slot.sampler = Some(*sampler);
        slot.mipmaps_generated = false;
        slot.uploads += 1;
        self.commands.push(GpuCommand::UploadTexture {
            texture,
            width: image.width,
            height: image.height,
        });
        Ok(())
    }

    fn generate_mipmaps(&mut self, texture: TextureId) {
        let Some(slot) = self.textures.get_mut(&texture) else {
            warn!("Mipmap generation for unknown texture {}", texture);
            return;
        };
        slot.mipmaps_generated = true;
        self.commands.push(GpuCommand::GenerateMipmaps(texture));
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
        self.commands.push(GpuCommand::DeleteTexture(texture));
    }

    fn create_buffer(&mut self, label: &str) -> BufferId {
        let id = BufferId(self.allocate());
        self.buffers.insert(
            id,
            RecordedBuffer {
                label: label.to_string(),
                target: None,
                data: Vec::new(),
            },
        );
        self.commands.push(GpuCommand::CreateBuffer(id));
        id
    }

    fn upload_buffer(
        &mut self,
        buffer: BufferId,
        target: BufferTarget,
        data: &[u8],
    ) -> Result<(), GpuError> {
        if !self.buffers.contains_key(&buffer) {
            warn!("Upload to unknown buffer {}", buffer);
            return Err(GpuError::UnknownBuffer(buffer));
        }
        self.limits.check_buffer(data.len())?;
        self.injected_failure(data.len())?;

        let Some(slot) = self.buffers.get_mut(&buffer) else {
            return Err(GpuError::UnknownBuffer(buffer));
        };
        slot.target = Some(target);
        slot.data = data.to_vec();
        self.commands.push(GpuCommand::UploadBuffer {
            buffer,
            target,
            len: data.len(),
        });
        Ok(())
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer);
        self.commands.push(GpuCommand::DeleteBuffer(buffer));
    }

    fn create_vertex_array(&mut self, _label: &str) -> VertexArrayId {
        let id = VertexArrayId(self.allocate());
        self.vertex_arrays.insert(id, RecordedVertexArray::default());
        self.commands.push(GpuCommand::CreateVertexArray(id));
        id
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayId>) {
        self.bound_vertex_array = vertex_array;
        self.commands.push(GpuCommand::BindVertexArray(vertex_array));
    }

    fn set_vertex_attribute(&mut self, vertex_array: VertexArrayId, attribute: VertexAttribute) {
        let Some(state) = self.vertex_arrays.get_mut(&vertex_array) else {
            warn!("Attribute on unknown vertex array {}", vertex_array);
            return;
        };
        state.attributes.insert(attribute.location, attribute);
        self.commands.push(GpuCommand::SetVertexAttribute {
            vertex_array,
            attribute,
        });
    }

    fn set_index_buffer(&mut self, vertex_array: VertexArrayId, buffer: BufferId) {
        let Some(state) = self.vertex_arrays.get_mut(&vertex_array) else {
            warn!("Index buffer on unknown vertex array {}", vertex_array);
            return;
        };
        state.index_buffer = Some(buffer);
        self.commands.push(GpuCommand::SetIndexBuffer {
            vertex_array,
            buffer,
        });
    }

    fn delete_vertex_array(&mut self, vertex_array: VertexArrayId) {
        self.vertex_arrays.remove(&vertex_array);
        if self.bound_vertex_array == Some(vertex_array) {
            self.bound_vertex_array = None;
        }
        self.commands.push(GpuCommand::DeleteVertexArray(vertex_array));
    }

    fn draw_indexed(&mut self, index_count: u32) {
        let Some(vertex_array) = self.bound_vertex_array else {
            warn!("draw_indexed with no vertex array bound");
            return;
        };
        self.commands.push(GpuCommand::DrawIndexed {
            vertex_array,
            index_count,
        });
        match self.resolve_draw(vertex_array, index_count) {
            Some(draw) => self.draws.push(draw),
            None => warn!("draw_indexed on incomplete vertex array {}", vertex_array),
        }
    }
}
