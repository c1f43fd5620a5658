use std::path::{Path, PathBuf};

use tracing::{debug, error, info, trace, warn};

use crate::assets::mesh::{GridMesh, MeshError, POSITION_LOCATION, UV_LOCATION};
use crate::assets::texture::{self, TextureError, TextureKind};
use crate::rendering::gpu::{
    BufferId, BufferTarget, GpuContext, GpuError, GpuHandle, TextureId, VertexArrayId,
    VertexAttribute,
};

#[derive(Debug, thiserror::Error)]
pub enum TerrainError {
    #[error(transparent)]
    Texture(#[from] TextureError),
    #[error(transparent)]
    Mesh(#[from] MeshError),
    #[error(transparent)]
    Gpu(#[from] GpuError),
    #[error("No vertex array is generated, cannot draw anything")]
    MeshNotGenerated,
}

/// A height-field terrain: a flat grid plus the elevation and diffuse
/// textures the shading stage displaces and colours it with.
///
/// Owns every GPU resource it allocates. Handles survive across frames and
/// are reused by later loads and regenerations.
#[derive(Debug, Default)]
pub struct TerrainMesh {
    resolution: u32,
    vertex_array: GpuHandle<VertexArrayId>,
    position_buffer: GpuHandle<BufferId>,
    uv_buffer: GpuHandle<BufferId>,
    index_buffer: GpuHandle<BufferId>,
    index_count: u32,
    elevation_texture: GpuHandle<TextureId>,
    diffuse_texture: GpuHandle<TextureId>,
    elevation_texture_path: Option<PathBuf>,
    diffuse_texture_path: Option<PathBuf>,
}

impl TerrainMesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn vertex_count(&self) -> u32 {
        if self.has_mesh() {
            (self.resolution + 1) * (self.resolution + 1)
        } else {
            0
        }
    }

    pub fn has_mesh(&self) -> bool {
        self.vertex_array.is_allocated()
    }

    pub fn vertex_array(&self) -> Option<VertexArrayId> {
        self.vertex_array.get()
    }

    pub fn elevation_texture(&self) -> Option<TextureId> {
        self.elevation_texture.get()
    }

    pub fn diffuse_texture(&self) -> Option<TextureId> {
        self.diffuse_texture.get()
    }

    pub fn elevation_texture_path(&self) -> Option<&Path> {
        self.elevation_texture_path.as_deref()
    }

    pub fn diffuse_texture_path(&self) -> Option<&Path> {
        self.diffuse_texture_path.as_deref()
    }

    pub fn load_elevation_texture(
        &mut self,
        ctx: &mut impl GpuContext,
        path: impl AsRef<Path>,
    ) -> Result<(), TerrainError> {
        self.load_texture(ctx, TextureKind::Elevation, path.as_ref())
    }

    pub fn load_diffuse_texture(
        &mut self,
        ctx: &mut impl GpuContext,
        path: impl AsRef<Path>,
    ) -> Result<(), TerrainError> {
        self.load_texture(ctx, TextureKind::Diffuse, path.as_ref())
    }

    /// Reloads both textures from the paths they were last loaded from.
    /// Slots that never loaded are skipped; a failing slot keeps its old
    /// contents and the first failure is returned.
    pub fn reload_textures(&mut self, ctx: &mut impl GpuContext) -> Result<(), TerrainError> {
        let mut first_error = None;
        for kind in [TextureKind::Elevation, TextureKind::Diffuse] {
            let Some(path) = self.texture_path(kind).map(Path::to_path_buf) else {
                continue;
            };
            if let Err(e) = self.load_texture(ctx, kind, &path) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn texture_path(&self, kind: TextureKind) -> Option<&Path> {
        match kind {
            TextureKind::Elevation => self.elevation_texture_path(),
            TextureKind::Diffuse => self.diffuse_texture_path(),
        }
    }

    fn load_texture(
        &mut self,
        ctx: &mut impl GpuContext,
        kind: TextureKind,
        path: &Path,
    ) -> Result<(), TerrainError> {
        // Decoding happens before any slot is touched so a failure leaves it as it was.
        let image = texture::decode(path, kind.layout())?;

        let (slot, stored_path) = match kind {
            TextureKind::Elevation => (&mut self.elevation_texture, &mut self.elevation_texture_path),
            TextureKind::Diffuse => (&mut self.diffuse_texture, &mut self.diffuse_texture_path),
        };
        let existing = slot.get();
        let id = existing.unwrap_or_else(|| ctx.create_texture(kind.label()));

        let sampler = kind.sampler();
        if let Err(source) = ctx.upload_texture(id, &image, &sampler) {
            error!("Failed to upload {} from {:?}: {}", kind.label(), path, source);
            if existing.is_none() {
                ctx.delete_texture(id);
            }
            return Err(TextureError::UploadFailed {
                path: path.to_path_buf(),
                source,
            }
            .into());
        }
        *slot = GpuHandle::Allocated(id);
        if sampler.is_mipmapped() {
            ctx.generate_mipmaps(id);
        }
        *stored_path = Some(path.to_path_buf());

        info!(
            "Successfully loaded {}: {:?} ({}x{}) into {}",
            kind.label(),
            path,
            image.width,
            image.height,
            id
        );
        Ok(())
    }

    /// Rebuilds the grid at `tessellation` subdivisions per axis and uploads it,
    /// replacing whatever mesh was there.
    ///
    /// Out-of-range tessellations and buffers larger than the device allows
    /// are rejected before any GPU call, leaving the previous mesh drawable.
    /// If an upload fails after another one already overwrote part of the
    /// previous mesh, the terrain is left with no drawable mesh.
    pub fn generate_mesh(
        &mut self,
        ctx: &mut impl GpuContext,
        tessellation: u32,
    ) -> Result<(), TerrainError> {
        let mesh = GridMesh::generate(tessellation).map_err(|e| {
            error!("Cannot generate terrain mesh: {}", e);
            e
        })?;

        let limits = ctx.limits();
        for bytes in [mesh.position_bytes(), mesh.uv_bytes(), mesh.index_bytes()] {
            if let Err(e) = limits.check_buffer(bytes.len()) {
                error!("Cannot upload a {}x{} terrain mesh: {}", tessellation, tessellation, e);
                return Err(e.into());
            }
        }

        let position_buffer = self
            .position_buffer
            .get_or_allocate(|| ctx.create_buffer("terrain positions"));
        let uv_buffer = self.uv_buffer.get_or_allocate(|| ctx.create_buffer("terrain uvs"));
        let index_buffer = self
            .index_buffer
            .get_or_allocate(|| ctx.create_buffer("terrain indices"));

        let uploads = [
            (position_buffer, BufferTarget::Vertex, mesh.position_bytes()),
            (uv_buffer, BufferTarget::Vertex, mesh.uv_bytes()),
            (index_buffer, BufferTarget::Index, mesh.index_bytes()),
        ];
        for (written, (buffer, target, bytes)) in uploads.into_iter().enumerate() {
            if let Err(e) = ctx.upload_buffer(buffer, target, bytes) {
                error!("Failed to upload terrain buffer {}: {}", buffer, e);
                if written > 0 {
                    self.discard_mesh(ctx);
                }
                return Err(e.into());
            }
        }

        let vertex_array = match self.vertex_array.get() {
            Some(id) => id,
            None => ctx.create_vertex_array("terrain vertex array"),
        };
        ctx.bind_vertex_array(Some(vertex_array));
        ctx.set_vertex_attribute(
            vertex_array,
            VertexAttribute {
                location: POSITION_LOCATION,
                buffer: position_buffer,
                components: 3,
            },
        );
        ctx.set_vertex_attribute(
            vertex_array,
            VertexAttribute {
                location: UV_LOCATION,
                buffer: uv_buffer,
                components: 2,
            },
        );
        ctx.set_index_buffer(vertex_array, index_buffer);
        ctx.bind_vertex_array(None);

        // Only now, with every buffer populated, does the terrain become drawable.
        self.vertex_array = GpuHandle::Allocated(vertex_array);
        self.index_count = mesh.index_count();
        self.resolution = tessellation;

        debug!(
            "Generated heightfield mesh with {}x{} quads ({} vertices, {} indices)",
            tessellation,
            tessellation,
            mesh.vertex_count(),
            self.index_count
        );
        trace_mesh(&mesh);
        Ok(())
    }

    /// Drops the vertex array so nothing draws from partially rewritten buffers.
    fn discard_mesh(&mut self, ctx: &mut impl GpuContext) {
        if let Some(id) = self.vertex_array.take() {
            warn!("Discarding terrain mesh {} after a partial upload", id);
            ctx.delete_vertex_array(id);
        }
        self.index_count = 0;
        self.resolution = 0;
    }

    /// Draws the whole grid with the vertex array, leaving no array bound.
    ///
    /// The caller must have bound the shading program, its transforms and
    /// the two textures.
    pub fn submit_triangles(&self, ctx: &mut impl GpuContext) -> Result<(), TerrainError> {
        let Some(vertex_array) = self.vertex_array.get() else {
            warn!("No vertex array is generated, cannot draw anything");
            return Err(TerrainError::MeshNotGenerated);
        };
        trace!(
            "submit_triangles: drawing {} with {} indices",
            vertex_array,
            self.index_count
        );

        ctx.bind_vertex_array(Some(vertex_array));
        ctx.draw_indexed(self.index_count);
        ctx.bind_vertex_array(None);
        Ok(())
    }

    /// Deletes every GPU resource this terrain allocated and returns it to
    /// its freshly constructed state.
    pub fn release(&mut self, ctx: &mut impl GpuContext) {
        if let Some(id) = self.vertex_array.take() {
            ctx.delete_vertex_array(id);
        }
        for buffer in [&mut self.position_buffer, &mut self.uv_buffer, &mut self.index_buffer] {
            if let Some(id) = buffer.take() {
                ctx.delete_buffer(id);
            }
        }
        for texture in [&mut self.elevation_texture, &mut self.diffuse_texture] {
            if let Some(id) = texture.take() {
                ctx.delete_texture(id);
            }
        }
        *self = Self::default();
        debug!("Released terrain GPU resources");
    }
}

fn trace_mesh(mesh: &GridMesh) {
    if !tracing::enabled!(tracing::Level::TRACE) {
        return;
    }
    for (i, (position, uv)) in mesh.positions.iter().zip(&mesh.uvs).take(3).enumerate() {
        trace!("Vertex {}: pos{:?}, uv{:?}", i, position.to_array(), uv.to_array());
    }
    for (i, index) in mesh.indices.iter().take(6).enumerate() {
        trace!("Index {}: {}", i, index);
    }
}
