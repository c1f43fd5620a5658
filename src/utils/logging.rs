use std::env;
use std::fs;
use std::sync::Mutex;

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LoggingSettings;

/// Initialize logging from `settings`, with `RUST_LOG` taking precedence.
pub fn init_logging(settings: &LoggingSettings) -> anyhow::Result<()> {
    let enable_backtrace = env::var("RUST_BACKTRACE").map(|v| v == "1").unwrap_or(false);

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let mut filter = EnvFilter::try_new(&settings.level)?;
            filter = filter.add_directive("wgpu_core=warn".parse()?);
            filter = filter.add_directive("wgpu_hal=warn".parse()?);
            filter = filter.add_directive("naga=warn".parse()?);
            if settings.mesh_trace {
                filter = filter.add_directive("heightfield::world=trace".parse()?);
            }
            filter
        }
    };

    let file_layer = match &settings.log_file {
        Some(path) => {
            // Each session starts with a fresh file.
            let log_file = fs::File::create(path)?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(log_file))
                    .with_span_events(FmtSpan::CLOSE)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_ansi(false), // No ANSI codes in file
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_span_events(FmtSpan::CLOSE)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(true),
        )
        .with(file_layer)
        .try_init()?;

    std::panic::set_hook(Box::new(move |panic_info| {
        tracing::error!("Panic occurred: {}", panic_info);

        if let Some(location) = panic_info.location() {
            tracing::error!(
                "Panic location: {}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            );
        }

        if enable_backtrace {
            tracing::error!("Backtrace:\n{:?}", std::backtrace::Backtrace::capture());
        }
    }));

    tracing::info!("Logging initialized with level: {}", settings.level);
    if let Some(path) = &settings.log_file {
        tracing::info!("File logging enabled: {:?}", path);
    }
    tracing::info!("Mesh tracing enabled: {}", settings.mesh_trace);
    Ok(())
}

/// Logs the outcome of a wgpu operation and passes the result through.
pub fn handle_wgpu_result<T, E: std::fmt::Display>(result: Result<T, E>, operation: &str) -> Result<T, E> {
    match &result {
        Ok(_) => {
            tracing::debug!("WGPU operation '{}' completed successfully", operation);
        }
        Err(e) => {
            tracing::error!("WGPU operation '{}' failed: {}", operation, e);
        }
    }
    result
}

/// Log wgpu adapter information
pub fn log_adapter_info(adapter: &wgpu::Adapter) {
    let info = adapter.get_info();
    tracing::info!("=== WGPU Adapter Information ===");
    tracing::info!("Name: {}", info.name);
    tracing::info!("Backend: {:?}", info.backend);
    tracing::info!("Device Type: {:?}", info.device_type);
    tracing::info!("Driver: {} ({})", info.driver, info.driver_info);
    tracing::info!(
        "Float32 filterable: {}",
        adapter.features().contains(wgpu::Features::FLOAT32_FILTERABLE)
    );
    tracing::info!("=================================");
}
