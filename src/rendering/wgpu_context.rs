use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageBuffer, Luma, RgbImage, RgbaImage};
use tracing::{debug, error, info, warn};
use wgpu::util::DeviceExt;

use crate::assets::texture::{TexelData, TextureImage};
use crate::rendering::gpu::{
    BufferId, BufferTarget, GpuContext, GpuError, GpuLimits, SamplerConfig, TextureId,
    VertexArrayId, VertexAttribute,
};
use crate::utils::logging::{handle_wgpu_result, log_adapter_info};

/// A texture as the shading stage binds it.
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

/// Base level kept until the mip chain is built from it.
enum MipSource {
    Luma(ImageBuffer<Luma<f32>, Vec<f32>>),
    Rgba(RgbaImage),
}

impl MipSource {
    fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::Luma(img) => img.dimensions(),
            Self::Rgba(img) => img.dimensions(),
        }
    }

    fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Luma(img) => bytemuck::cast_slice(img.as_raw()),
            Self::Rgba(img) => img.as_raw(),
        }
    }

    fn downsample(&self, width: u32, height: u32) -> Self {
        match self {
            Self::Luma(img) => Self::Luma(imageops::resize(img, width, height, FilterType::Triangle)),
            Self::Rgba(img) => Self::Rgba(imageops::resize(img, width, height, FilterType::Triangle)),
        }
    }
}

struct TextureSlot {
    label: String,
    gpu: Option<GpuTexture>,
    mip_source: Option<MipSource>,
    /// Bumped every time the `wgpu` texture behind the id is recreated.
    generation: u32,
}

struct BufferSlot {
    label: String,
    buffer: Option<wgpu::Buffer>,
    generation: u32,
}

#[derive(Default)]
struct VertexArrayState {
    attributes: BTreeMap<u32, VertexAttribute>,
    index_buffer: Option<BufferId>,
}

struct DrawCommand {
    vertex_array: VertexArrayId,
    index_count: u32,
}

/// [`GpuContext`] over a `wgpu` device.
///
/// Ids stay stable while the `wgpu` objects behind them are recreated when
/// an upload changes their size or format. Draws are queued and replayed
/// into a render pass the caller owns via [`WgpuContext::encode_draws`].
pub struct WgpuContext {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    next_id: u32,
    textures: HashMap<TextureId, TextureSlot>,
    buffers: HashMap<BufferId, BufferSlot>,
    vertex_arrays: HashMap<VertexArrayId, VertexArrayState>,
    bound_vertex_array: Option<VertexArrayId>,
    pending_draws: Vec<DrawCommand>,
}

impl WgpuContext {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self {
            device,
            queue,
            next_id: 0,
            textures: HashMap::new(),
            buffers: HashMap::new(),
            vertex_arrays: HashMap::new(),
            bound_vertex_array: None,
            pending_draws: Vec::new(),
        }
    }

    /// Opens a device with no surface attached.
    pub async fn headless(power_preference: wgpu::PowerPreference) -> anyhow::Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| anyhow::anyhow!("Failed to find suitable GPU adapter"))?;
        log_adapter_info(&adapter);

        // Linear sampling of the R32Float elevation texture needs this where available.
        let required_features = adapter.features() & wgpu::Features::FLOAT32_FILTERABLE;
        let (device, queue) = handle_wgpu_result(
            adapter
                .request_device(
                    &wgpu::DeviceDescriptor {
                        label: Some("heightfield device"),
                        required_features,
                        required_limits: wgpu::Limits::default(),
                        memory_hints: wgpu::MemoryHints::default(),
                    },
                    None,
                )
                .await,
            "request_device",
        )?;
        info!("WGPU device and queue created successfully");

        Ok(Self::new(Arc::new(device), Arc::new(queue)))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn texture(&self, id: TextureId) -> Option<&GpuTexture> {
        self.textures.get(&id)?.gpu.as_ref()
    }

    pub fn buffer(&self, id: BufferId) -> Option<&wgpu::Buffer> {
        self.buffers.get(&id)?.buffer.as_ref()
    }

    /// How many `wgpu` textures have backed `id` so far, `None` for unknown ids.
    pub fn texture_generation(&self, id: TextureId) -> Option<u32> {
        self.textures.get(&id).map(|slot| slot.generation)
    }

    /// How many `wgpu` buffers have backed `id` so far, `None` for unknown ids.
    pub fn buffer_generation(&self, id: BufferId) -> Option<u32> {
        self.buffers.get(&id).map(|slot| slot.generation)
    }

    pub fn pending_draw_count(&self) -> usize {
        self.pending_draws.len()
    }

    pub fn discard_pending_draws(&mut self) {
        self.pending_draws.clear();
    }

    /// Replays queued draws into `pass`, which must already have a pipeline
    /// using [`crate::assets::mesh::vertex_buffer_layouts`] and its bind
    /// groups set. Returns how many draws were encoded.
    pub fn encode_draws(&mut self, pass: &mut wgpu::RenderPass<'_>) -> usize {
        let mut encoded = 0;
        for draw in std::mem::take(&mut self.pending_draws) {
            let Some(state) = self.vertex_arrays.get(&draw.vertex_array) else {
                warn!("Skipping draw of deleted vertex array {}", draw.vertex_array);
                continue;
            };
            let Some(index_buffer) = state.index_buffer.and_then(|id| self.buffer(id)) else {
                warn!("Skipping draw of {} with no index buffer", draw.vertex_array);
                continue;
            };

            let mut complete = true;
            for attribute in state.attributes.values() {
                match self.buffer(attribute.buffer) {
                    Some(buffer) => pass.set_vertex_buffer(attribute.location, buffer.slice(..)),
                    None => complete = false,
                }
            }
            if !complete {
                warn!("Skipping draw of {} with missing attribute data", draw.vertex_array);
                continue;
            }

            pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..draw.index_count, 0, 0..1);
            encoded += 1;
        }
        encoded
    }

    fn allocate(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn create_sampler(&self, label: &str, config: &SamplerConfig) -> wgpu::Sampler {
        self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(label),
            address_mode_u: config.address_mode,
            address_mode_v: config.address_mode,
            address_mode_w: config.address_mode,
            mag_filter: config.mag_filter,
            min_filter: config.min_filter,
            mipmap_filter: config.mipmap_filter.unwrap_or_default(),
            ..Default::default()
        })
    }
}

impl GpuContext for WgpuContext {
    fn limits(&self) -> GpuLimits {
        GpuLimits::from(&self.device.limits())
    }

    fn create_texture(&mut self, label: &str) -> TextureId {
        let id = TextureId(self.allocate());
        self.textures.insert(
            id,
            TextureSlot {
                label: label.to_string(),
                gpu: None,
                mip_source: None,
                generation: 0,
            },
        );
        id
    }

    fn upload_texture(
        &mut self,
        texture: TextureId,
        image: &TextureImage,
        sampler: &SamplerConfig,
    ) -> Result<(), GpuError> {
        let Some(label) = self.textures.get(&texture).map(|slot| slot.label.clone()) else {
            error!("Upload to unknown texture {}", texture);
            return Err(GpuError::UnknownTexture(texture));
        };
        // Everything is validated before the slot is touched.
        if let Err(e) = self.limits().check_texture(image.width, image.height) {
            error!("Cannot upload {}: {}", texture, e);
            return Err(e);
        }
        let Some((format, source)) = mip_source(image) else {
            error!(
                "Texel data for {} does not match {}x{}",
                texture, image.width, image.height
            );
            return Err(GpuError::TexelMismatch {
                width: image.width,
                height: image.height,
            });
        };

        let size = wgpu::Extent3d {
            width: image.width,
            height: image.height,
            depth_or_array_layers: 1,
        };
        let mip_level_count = if sampler.is_mipmapped() {
            mip_level_count(image.width, image.height)
        } else {
            1
        };

        let previous = self
            .textures
            .get_mut(&texture)
            .and_then(|slot| slot.gpu.take());
        let mut recreated = false;
        let wgpu_texture = match previous {
            Some(gpu)
                if gpu.texture.size() == size
                    && gpu.texture.format() == format
                    && gpu.texture.mip_level_count() == mip_level_count =>
            {
                gpu.texture
            }
            previous => {
                recreated = true;
                if let Some(gpu) = previous {
                    gpu.texture.destroy();
                }
                debug!(
                    "Creating {:?} texture {} ({}x{}, {} mips)",
                    format, texture, image.width, image.height, mip_level_count
                );
                self.device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(&label),
                    size,
                    mip_level_count,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format,
                    usage: wgpu::TextureUsages::TEXTURE_BINDING
                        | wgpu::TextureUsages::COPY_DST
                        | wgpu::TextureUsages::COPY_SRC,
                    view_formats: &[],
                })
            }
        };

        write_level(&self.queue, &wgpu_texture, 0, &source);

        let view = wgpu_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = self.create_sampler(&label, sampler);
        let mipmapped = mip_level_count > 1;
        if let Some(slot) = self.textures.get_mut(&texture) {
            slot.gpu = Some(GpuTexture {
                texture: wgpu_texture,
                view,
                sampler,
            });
            slot.mip_source = mipmapped.then_some(source);
            if recreated {
                slot.generation += 1;
            }
        }
        Ok(())
    }

    fn generate_mipmaps(&mut self, texture: TextureId) {
        let Some(slot) = self.textures.get_mut(&texture) else {
            error!("Mipmap generation for unknown texture {}", texture);
            return;
        };
        let Some(gpu) = slot.gpu.as_ref() else {
            warn!("Texture {} has no upload to build a mip chain from", texture);
            return;
        };
        let levels = gpu.texture.mip_level_count();
        let Some(base) = slot.mip_source.take() else {
            // A 1x1 texture has nothing below its base level.
            if levels > 1 {
                warn!("Texture {} has no mipmapped upload to build a chain from", texture);
            }
            return;
        };

        let (mut width, mut height) = base.dimensions();
        let mut previous = base;
        for level in 1..levels {
            width = (width / 2).max(1);
            height = (height / 2).max(1);
            let next = previous.downsample(width, height);
            write_level(&self.queue, &gpu.texture, level, &next);
            previous = next;
        }
        debug!("Generated {} mip levels for {}", levels, texture);
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if let Some(gpu) = self.textures.remove(&texture).and_then(|slot| slot.gpu) {
            gpu.texture.destroy();
        }
    }

    fn create_buffer(&mut self, label: &str) -> BufferId {
        let id = BufferId(self.allocate());
        self.buffers.insert(
            id,
            BufferSlot {
                label: label.to_string(),
                buffer: None,
                generation: 0,
            },
        );
        id
    }

    fn upload_buffer(
        &mut self,
        buffer: BufferId,
        target: BufferTarget,
        data: &[u8],
    ) -> Result<(), GpuError> {
        let limits = self.limits();
        let Some(slot) = self.buffers.get_mut(&buffer) else {
            error!("Upload to unknown buffer {}", buffer);
            return Err(GpuError::UnknownBuffer(buffer));
        };
        if let Err(e) = limits.check_buffer(data.len()) {
            error!("Cannot upload {}: {}", buffer, e);
            return Err(e);
        }
        let usage = match target {
            BufferTarget::Vertex => wgpu::BufferUsages::VERTEX,
            BufferTarget::Index => wgpu::BufferUsages::INDEX,
        } | wgpu::BufferUsages::COPY_DST
            | wgpu::BufferUsages::COPY_SRC;

        let reusable = slot
            .buffer
            .as_ref()
            .is_some_and(|existing| existing.size() == data.len() as u64 && existing.usage() == usage);
        if reusable {
            if let Some(existing) = &slot.buffer {
                self.queue.write_buffer(existing, 0, data);
            }
            return Ok(());
        }

        if let Some(old) = slot.buffer.take() {
            old.destroy();
        }
        slot.buffer = Some(self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&slot.label),
            contents: data,
            usage,
        }));
        slot.generation += 1;
        Ok(())
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        if let Some(gpu) = self.buffers.remove(&buffer).and_then(|slot| slot.buffer) {
            gpu.destroy();
        }
    }

    fn create_vertex_array(&mut self, _label: &str) -> VertexArrayId {
        let id = VertexArrayId(self.allocate());
        self.vertex_arrays.insert(id, VertexArrayState::default());
        id
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayId>) {
        self.bound_vertex_array = vertex_array;
    }

    fn set_vertex_attribute(&mut self, vertex_array: VertexArrayId, attribute: VertexAttribute) {
        match self.vertex_arrays.get_mut(&vertex_array) {
            Some(state) => {
                state.attributes.insert(attribute.location, attribute);
            }
            None => error!("Attribute on unknown vertex array {}", vertex_array),
        }
    }

    fn set_index_buffer(&mut self, vertex_array: VertexArrayId, buffer: BufferId) {
        match self.vertex_arrays.get_mut(&vertex_array) {
            Some(state) => state.index_buffer = Some(buffer),
            None => error!("Index buffer on unknown vertex array {}", vertex_array),
        }
    }

    fn delete_vertex_array(&mut self, vertex_array: VertexArrayId) {
        self.vertex_arrays.remove(&vertex_array);
        if self.bound_vertex_array == Some(vertex_array) {
            self.bound_vertex_array = None;
        }
    }

    fn draw_indexed(&mut self, index_count: u32) {
        match self.bound_vertex_array {
            Some(vertex_array) => self.pending_draws.push(DrawCommand {
                vertex_array,
                index_count,
            }),
            None => error!("draw_indexed with no vertex array bound"),
        }
    }
}

/// `wgpu` has no three-channel 8-bit format, so RGB is widened to opaque RGBA.
fn mip_source(image: &TextureImage) -> Option<(wgpu::TextureFormat, MipSource)> {
    match &image.texels {
        TexelData::R32Float(values) => {
            ImageBuffer::from_raw(image.width, image.height, values.clone())
                .map(|img| (wgpu::TextureFormat::R32Float, MipSource::Luma(img)))
        }
        TexelData::Rgb8(bytes) => RgbImage::from_raw(image.width, image.height, bytes.clone())
            .map(|img| {
                (
                    wgpu::TextureFormat::Rgba8Unorm,
                    MipSource::Rgba(DynamicImage::ImageRgb8(img).to_rgba8()),
                )
            }),
    }
}

fn write_level(queue: &wgpu::Queue, texture: &wgpu::Texture, mip_level: u32, source: &MipSource) {
    let (width, height) = source.dimensions();
    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture,
            mip_level,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        source.as_bytes(),
        wgpu::ImageDataLayout {
            offset: 0,
            // Both formats are four bytes per texel.
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
}

/// Number of levels in a full chain down to 1x1.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    let mut levels = 1u32;
    let mut w = width.max(1);
    let mut h = height.max(1);

    while w > 1 || h > 1 {
        w = (w / 2).max(1);
        h = (h / 2).max(1);
        levels += 1;
    }

    levels
}
