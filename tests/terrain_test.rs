use std::path::PathBuf;

use heightfield::assets::texture::{TexelData, TextureError};
use heightfield::rendering::gpu::{BufferTarget, GpuError};
use heightfield::rendering::recording::{GpuCommand, RecordingContext};
use heightfield::{TerrainError, TerrainMesh};
use image::{ImageBuffer, Luma, Rgb, RgbImage};

fn fixture(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("heightfield-terrain-{}-{}", std::process::id(), name))
}

fn write_rgb(name: &str, color: [u8; 3]) -> PathBuf {
    let path = fixture(name);
    RgbImage::from_pixel(4, 4, Rgb(color)).save(&path).unwrap();
    path
}

fn write_elevation(name: &str, value: u16) -> PathBuf {
    let path = fixture(name);
    let img: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_pixel(2, 2, Luma([value]));
    img.save(&path).unwrap();
    path
}

#[test]
fn test_two_by_two_scenario() {
    let mut ctx = RecordingContext::new();
    let mut terrain = TerrainMesh::new();
    terrain.generate_mesh(&mut ctx, 2).unwrap();
    terrain.submit_triangles(&mut ctx).unwrap();

    assert_eq!(terrain.vertex_count(), 9);
    assert_eq!(terrain.index_count(), 24);

    let draw = &ctx.draws[0];
    let positions = &draw.attributes[&0];
    let uvs = &draw.attributes[&1];
    assert_eq!(positions.len(), 9 * 3);
    assert_eq!(uvs.len(), 9 * 2);
    // Vertex (x = 1, z = 1) sits at index 1 * 3 + 1.
    assert_eq!(&positions[4 * 3..4 * 3 + 3], &[0.0, 0.0, 0.0]);
    assert_eq!(&uvs[4 * 2..4 * 2 + 2], &[0.5, 0.5]);
    assert!(draw.indices.iter().all(|&i| i < 9));
}

#[test]
fn test_attribute_layout() {
    let mut ctx = RecordingContext::new();
    let mut terrain = TerrainMesh::new();
    terrain.generate_mesh(&mut ctx, 3).unwrap();

    let vertex_array = terrain.vertex_array().unwrap();
    let state = &ctx.vertex_arrays[&vertex_array];
    assert_eq!(state.attributes[&0].components, 3);
    assert_eq!(state.attributes[&1].components, 2);

    let index_buffer = state.index_buffer.unwrap();
    assert_eq!(ctx.buffer(index_buffer).unwrap().target, Some(BufferTarget::Index));
    assert_eq!(
        ctx.buffer(state.attributes[&0].buffer).unwrap().target,
        Some(BufferTarget::Vertex)
    );
}

#[test]
fn test_regeneration_replaces_everything_and_reuses_handles() {
    let mut ctx = RecordingContext::new();
    let mut terrain = TerrainMesh::new();
    terrain.generate_mesh(&mut ctx, 8).unwrap();
    let vertex_array = terrain.vertex_array();
    let created = ctx
        .commands
        .iter()
        .filter(|c| matches!(c, GpuCommand::CreateBuffer(_) | GpuCommand::CreateVertexArray(_)))
        .count();
    assert_eq!(created, 4);

    ctx.clear_commands();
    terrain.generate_mesh(&mut ctx, 2).unwrap();
    assert_eq!(terrain.vertex_array(), vertex_array);
    assert!(!ctx
        .commands
        .iter()
        .any(|c| matches!(c, GpuCommand::CreateBuffer(_) | GpuCommand::CreateVertexArray(_))));

    terrain.submit_triangles(&mut ctx).unwrap();
    let draw = &ctx.draws[0];
    assert_eq!(terrain.resolution(), 2);
    assert_eq!(draw.index_count, 24);
    assert_eq!(draw.indices.len(), 24);
    assert_eq!(draw.attributes[&0].len(), 9 * 3);
    assert_eq!(draw.attributes[&1].len(), 9 * 2);
    assert!(draw.indices.iter().all(|&i| i < 9));
}

#[test]
fn test_submit_before_generate_issues_no_draw() {
    let mut ctx = RecordingContext::new();
    let terrain = TerrainMesh::new();
    let result = terrain.submit_triangles(&mut ctx);

    assert!(matches!(result, Err(TerrainError::MeshNotGenerated)));
    assert!(!ctx
        .commands
        .iter()
        .any(|c| matches!(c, GpuCommand::DrawIndexed { .. })));
}

#[test]
fn test_missing_diffuse_on_fresh_terrain() {
    let mut ctx = RecordingContext::new();
    let mut terrain = TerrainMesh::new();
    let result = terrain.load_diffuse_texture(&mut ctx, fixture("missing.png"));

    assert!(matches!(result, Err(TerrainError::Texture(_))));
    assert_eq!(terrain.diffuse_texture(), None);
    assert_eq!(terrain.diffuse_texture_path(), None);
    assert!(ctx.commands.is_empty());
}

#[test]
fn test_failed_reload_keeps_previous_texture() {
    let mut ctx = RecordingContext::new();
    let mut terrain = TerrainMesh::new();
    let good = write_rgb("keep.png", [10, 20, 30]);
    terrain.load_diffuse_texture(&mut ctx, &good).unwrap();
    let handle = terrain.diffuse_texture();

    assert!(terrain
        .load_diffuse_texture(&mut ctx, fixture("gone.png"))
        .is_err());
    assert_eq!(terrain.diffuse_texture(), handle);
    assert_eq!(terrain.diffuse_texture_path(), Some(good.as_path()));
    let texture = ctx.texture(handle.unwrap()).unwrap();
    assert_eq!(texture.uploads, 1);
    assert_eq!(texture.image.as_ref().unwrap().rgb(0, 0), Some([10, 20, 30]));

    std::fs::remove_file(good).ok();
}

#[test]
fn test_oversized_texture_on_fresh_terrain() {
    let mut ctx = RecordingContext::new();
    ctx.limits.max_texture_dimension_2d = 8;
    let mut terrain = TerrainMesh::new();
    let wide = fixture("wide.png");
    RgbImage::from_pixel(9, 1, Rgb([1, 2, 3])).save(&wide).unwrap();

    let err = terrain.load_diffuse_texture(&mut ctx, &wide).unwrap_err();
    assert!(matches!(
        err,
        TerrainError::Texture(TextureError::UploadFailed {
            source: GpuError::TextureTooLarge { width: 9, height: 1, max: 8 },
            ..
        })
    ));
    assert_eq!(terrain.diffuse_texture(), None);
    assert_eq!(terrain.diffuse_texture_path(), None);
    // The texture allocated for the attempt is freed again.
    assert!(ctx.textures.is_empty());

    std::fs::remove_file(wide).ok();
}

#[test]
fn test_failed_upload_keeps_previous_texture() {
    let mut ctx = RecordingContext::new();
    let mut terrain = TerrainMesh::new();
    let good = write_elevation("upload-good.png", 0);
    let next = write_elevation("upload-next.png", u16::MAX);
    terrain.load_elevation_texture(&mut ctx, &good).unwrap();
    let handle = terrain.elevation_texture();
    ctx.clear_commands();
    ctx.fail_uploads_after(0);

    let err = terrain.load_elevation_texture(&mut ctx, &next).unwrap_err();
    assert!(matches!(
        err,
        TerrainError::Texture(TextureError::UploadFailed {
            source: GpuError::OutOfMemory { .. },
            ..
        })
    ));
    assert_eq!(terrain.elevation_texture(), handle);
    assert_eq!(terrain.elevation_texture_path(), Some(good.as_path()));
    assert!(ctx.commands.is_empty());
    let texture = ctx.texture(handle.unwrap()).unwrap();
    assert_eq!(texture.uploads, 1);
    assert_eq!(texture.image.as_ref().unwrap().luma(0, 0), Some(0.0));

    std::fs::remove_file(good).ok();
    std::fs::remove_file(next).ok();
}

#[test]
fn test_reloading_diffuse_reuses_handle() {
    let mut ctx = RecordingContext::new();
    let mut terrain = TerrainMesh::new();
    let first = write_rgb("first.png", [255, 0, 0]);
    let second = write_rgb("second.png", [0, 255, 0]);

    terrain.load_diffuse_texture(&mut ctx, &first).unwrap();
    let handle = terrain.diffuse_texture().unwrap();
    terrain.load_diffuse_texture(&mut ctx, &second).unwrap();

    assert_eq!(terrain.diffuse_texture(), Some(handle));
    assert_eq!(terrain.diffuse_texture_path(), Some(second.as_path()));
    let creates = ctx
        .commands
        .iter()
        .filter(|c| matches!(c, GpuCommand::CreateTexture(_)))
        .count();
    assert_eq!(creates, 1);

    let texture = ctx.texture(handle).unwrap();
    assert_eq!(texture.uploads, 2);
    assert_eq!(texture.image.as_ref().unwrap().rgb(3, 3), Some([0, 255, 0]));

    std::fs::remove_file(first).ok();
    std::fs::remove_file(second).ok();
}

#[test]
fn test_texture_sampling_configuration() {
    let mut ctx = RecordingContext::new();
    let mut terrain = TerrainMesh::new();
    let diffuse = write_rgb("sampling-diffuse.png", [1, 2, 3]);
    let elevation = write_elevation("sampling-elevation.png", 1000);

    terrain.load_diffuse_texture(&mut ctx, &diffuse).unwrap();
    terrain.load_elevation_texture(&mut ctx, &elevation).unwrap();
    assert_ne!(terrain.diffuse_texture(), terrain.elevation_texture());

    let diffuse_tex = ctx.texture(terrain.diffuse_texture().unwrap()).unwrap();
    let sampler = diffuse_tex.sampler.unwrap();
    assert_eq!(sampler.address_mode, wgpu::AddressMode::ClampToEdge);
    assert_eq!(sampler.mag_filter, wgpu::FilterMode::Linear);
    assert_eq!(sampler.min_filter, wgpu::FilterMode::Linear);
    assert_eq!(sampler.mipmap_filter, Some(wgpu::FilterMode::Linear));
    assert!(diffuse_tex.mipmaps_generated);

    let elevation_tex = ctx.texture(terrain.elevation_texture().unwrap()).unwrap();
    let sampler = elevation_tex.sampler.unwrap();
    assert_eq!(sampler.address_mode, wgpu::AddressMode::ClampToEdge);
    assert_eq!(sampler.min_filter, wgpu::FilterMode::Linear);
    assert_eq!(sampler.mipmap_filter, None);
    assert!(!elevation_tex.mipmaps_generated);
    assert!(matches!(
        elevation_tex.image.as_ref().unwrap().texels,
        TexelData::R32Float(_)
    ));
    assert!(!ctx
        .commands
        .iter()
        .any(|c| *c == GpuCommand::GenerateMipmaps(terrain.elevation_texture().unwrap())));

    std::fs::remove_file(diffuse).ok();
    std::fs::remove_file(elevation).ok();
}

#[test]
fn test_textures_independent_of_mesh() {
    let mut ctx = RecordingContext::new();
    let mut terrain = TerrainMesh::new();
    let elevation = write_elevation("independent.png", u16::MAX);

    terrain.load_elevation_texture(&mut ctx, &elevation).unwrap();
    assert!(!terrain.has_mesh());
    assert_eq!(terrain.index_count(), 0);
    assert!(terrain.submit_triangles(&mut ctx).is_err());

    terrain.generate_mesh(&mut ctx, 1).unwrap();
    assert_eq!(terrain.index_count(), 6);
    assert!(terrain.elevation_texture().is_some());

    std::fs::remove_file(elevation).ok();
}

#[test]
fn test_reload_textures_from_stored_paths() {
    let mut ctx = RecordingContext::new();
    let mut terrain = TerrainMesh::new();
    let elevation = write_elevation("reload.png", 0);
    terrain.load_elevation_texture(&mut ctx, &elevation).unwrap();
    let handle = terrain.elevation_texture().unwrap();

    write_elevation("reload.png", u16::MAX);
    terrain.reload_textures(&mut ctx).unwrap();

    assert_eq!(terrain.elevation_texture(), Some(handle));
    assert_eq!(terrain.diffuse_texture(), None);
    let texture = ctx.texture(handle).unwrap();
    assert_eq!(texture.uploads, 2);
    assert_eq!(texture.image.as_ref().unwrap().luma(1, 1), Some(1.0));

    std::fs::remove_file(&elevation).ok();
    assert!(terrain.reload_textures(&mut ctx).is_err());
    assert_eq!(terrain.elevation_texture_path(), Some(elevation.as_path()));
}

#[test]
fn test_release_frees_textures_and_mesh() {
    let mut ctx = RecordingContext::new();
    let mut terrain = TerrainMesh::new();
    let diffuse = write_rgb("release.png", [9, 9, 9]);
    terrain.load_diffuse_texture(&mut ctx, &diffuse).unwrap();
    terrain.generate_mesh(&mut ctx, 2).unwrap();

    terrain.release(&mut ctx);
    assert!(ctx.textures.is_empty());
    assert!(ctx.buffers.is_empty());
    assert!(ctx.vertex_arrays.is_empty());
    assert_eq!(terrain.diffuse_texture(), None);
    assert_eq!(terrain.diffuse_texture_path(), None);

    std::fs::remove_file(diffuse).ok();
}
