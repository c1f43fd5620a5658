use std::path::{Path, PathBuf};

use image::DynamicImage;
use tracing::{debug, error};

use crate::rendering::gpu::{GpuError, SamplerConfig};

#[derive(Debug, thiserror::Error)]
pub enum TextureError {
    #[error("Failed to load image {}: {source}", path.display())]
    LoadFailed {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("Image {} has no pixels", path.display())]
    Empty { path: PathBuf },
    #[error("Failed to upload image {}: {source}", path.display())]
    UploadFailed {
        path: PathBuf,
        #[source]
        source: GpuError,
    },
}

/// How decoded pixels are laid out per texel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    /// One `f32` channel, no 8-bit quantisation.
    Luma32F,
    /// Three `u8` channels, alpha dropped.
    Rgb8,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TexelData {
    R32Float(Vec<f32>),
    Rgb8(Vec<u8>),
}

/// Decoded pixels, bottom row first.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureImage {
    pub width: u32,
    pub height: u32,
    pub texels: TexelData,
}

impl TextureImage {
    pub fn layout(&self) -> ChannelLayout {
        match self.texels {
            TexelData::R32Float(_) => ChannelLayout::Luma32F,
            TexelData::Rgb8(_) => ChannelLayout::Rgb8,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match &self.texels {
            TexelData::R32Float(values) => bytemuck::cast_slice(values),
            TexelData::Rgb8(bytes) => bytes,
        }
    }

    /// Whether the texel buffer holds exactly `width * height` texels.
    pub fn is_consistent(&self) -> bool {
        let texels = self.width as usize * self.height as usize;
        match &self.texels {
            TexelData::R32Float(values) => values.len() == texels,
            TexelData::Rgb8(bytes) => bytes.len() == texels * 3,
        }
    }

    /// Row-major texel at `(x, y)` where `y = 0` is the bottom row.
    pub fn luma(&self, x: u32, y: u32) -> Option<f32> {
        match &self.texels {
            TexelData::R32Float(values) => values.get(self.index(x, y)?).copied(),
            TexelData::Rgb8(_) => None,
        }
    }

    pub fn rgb(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        match &self.texels {
            TexelData::Rgb8(bytes) => {
                let start = self.index(x, y)? * 3;
                let px = bytes.get(start..start + 3)?;
                Some([px[0], px[1], px[2]])
            }
            TexelData::R32Float(_) => None,
        }
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height).then(|| (y * self.width + x) as usize)
    }
}

/// The two texture slots a terrain owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    Elevation,
    Diffuse,
}

impl TextureKind {
    pub fn layout(self) -> ChannelLayout {
        match self {
            Self::Elevation => ChannelLayout::Luma32F,
            Self::Diffuse => ChannelLayout::Rgb8,
        }
    }

    /// Elevation is sampled for displacement and never minified for detail,
    /// so only the diffuse texture carries a mip chain.
    pub fn sampler(self) -> SamplerConfig {
        match self {
            Self::Elevation => SamplerConfig::linear_clamped(),
            Self::Diffuse => SamplerConfig::trilinear_clamped(),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Elevation => "terrain elevation texture",
            Self::Diffuse => "terrain diffuse texture",
        }
    }
}

/// Decodes `path` into `layout`, flipped so the first row is the image bottom.
pub fn decode(path: &Path, layout: ChannelLayout) -> Result<TextureImage, TextureError> {
    let img = image::open(path).map_err(|source| {
        error!("Failed to load image: {:?}, error: {}", path, source);
        TextureError::LoadFailed {
            path: path.to_path_buf(),
            source,
        }
    })?;
    let image = from_dynamic(img.flipv(), layout);
    if image.width == 0 || image.height == 0 {
        error!("Image {:?} has no pixels", path);
        return Err(TextureError::Empty {
            path: path.to_path_buf(),
        });
    }
    debug!(
        "Decoded {:?} as {:?} ({}x{})",
        path, layout, image.width, image.height
    );
    Ok(image)
}

fn from_dynamic(img: DynamicImage, layout: ChannelLayout) -> TextureImage {
    let (width, height) = (img.width(), img.height());
    let texels = match layout {
        ChannelLayout::Luma32F => TexelData::R32Float(img.to_luma32f().into_raw()),
        ChannelLayout::Rgb8 => TexelData::Rgb8(img.to_rgb8().into_raw()),
    };
    TextureImage {
        width,
        height,
        texels,
    }
}
