use heightfield::config::{config_path, load_settings, save_settings, HeightfieldSettings};
use heightfield::utils::logging::init_logging;
use heightfield::{TerrainMesh, WgpuContext, APP_NAME, VERSION};
use tracing::{info, warn};

fn main() -> anyhow::Result<()> {
    let stored = load_settings();
    let first_run = stored.is_none() && config_path().is_some_and(|path| !path.exists());
    let settings = stored.unwrap_or_default();
    init_logging(&settings.logging)?;
    info!("{} {}", APP_NAME, VERSION);

    if first_run {
        match save_settings(&settings) {
            Ok(()) => info!("Wrote default settings to {:?}", config_path()),
            Err(e) => warn!("Could not write default settings: {}", e),
        }
    }

    pollster::block_on(run(&settings))
}

async fn run(settings: &HeightfieldSettings) -> anyhow::Result<()> {
    let terrain_settings = &settings.terrain;
    let mut ctx = WgpuContext::headless(terrain_settings.power_preference.into()).await?;
    let mut terrain = TerrainMesh::new();

    // Texture failures are logged by the loader; the terrain still builds without them.
    if let Some(path) = &terrain_settings.elevation_texture {
        if let Err(e) = terrain.load_elevation_texture(&mut ctx, path) {
            warn!("Continuing without elevation texture: {}", e);
        }
    }
    if let Some(path) = &terrain_settings.diffuse_texture {
        if let Err(e) = terrain.load_diffuse_texture(&mut ctx, path) {
            warn!("Continuing without diffuse texture: {}", e);
        }
    }

    terrain.generate_mesh(&mut ctx, terrain_settings.tessellation)?;
    terrain.submit_triangles(&mut ctx)?;

    info!(
        "Terrain ready: {}x{} grid, {} vertices, {} indices, {} draw(s) queued",
        terrain.resolution(),
        terrain.resolution(),
        terrain.vertex_count(),
        terrain.index_count(),
        ctx.pending_draw_count()
    );
    info!(
        "Elevation texture: {:?}, diffuse texture: {:?}",
        terrain.elevation_texture_path(),
        terrain.diffuse_texture_path()
    );

    // Nothing owns a render pass here, so the queued draw is dropped.
    ctx.discard_pending_draws();
    terrain.release(&mut ctx);
    ctx.queue().submit(std::iter::empty());
    Ok(())
}
