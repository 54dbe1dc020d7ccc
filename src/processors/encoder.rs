// pixelhorizon/src/processors/encoder.rs
use super::converter::flatten_onto_white;
use super::resizer::fit_within;
use crate::core::{ImageToolError, ResizeAlgorithm, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use oxipng::{optimize_from_memory, Options};
use std::io::Cursor;

/// ICO frames cannot exceed this edge length.
const ICO_MAX_EDGE: u32 = 256;

#[derive(Debug, Clone)]
pub struct Encoder {
    quality: u8,
    optimize_png: bool,
    algorithm: ResizeAlgorithm,
}

impl Encoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            optimize_png: false,
            algorithm: ResizeAlgorithm::Lanczos3,
        }
    }

    pub fn with_png_optimization(mut self, optimize: bool) -> Self {
        self.optimize_png = optimize;
        self
    }

    pub fn with_algorithm(mut self, algorithm: ResizeAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn encode(&self, image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
        log::debug!(
            "Encoding {}x{} image as {:?}, quality: {}",
            image.width(),
            image.height(),
            format,
            self.quality
        );

        match format {
            ImageFormat::Jpeg => self.encode_jpeg(image),
            ImageFormat::Png => self.encode_png(image),
            ImageFormat::Ico => self.encode_ico(image),
            _ => self.encode_generic(image, format),
        }
    }

    fn encode_jpeg(&self, image: &DynamicImage) -> Result<Vec<u8>> {
        let opaque = flatten_onto_white(image);
        let mut buffer = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut buffer, self.quality);
        opaque.write_with_encoder(encoder)?;
        Ok(buffer)
    }

    fn encode_png(&self, image: &DynamicImage) -> Result<Vec<u8>> {
        let data = self.encode_generic(image, ImageFormat::Png)?;
        if self.optimize_png {
            return self.optimize_png_bytes(&data);
        }
        Ok(data)
    }

    fn encode_ico(&self, image: &DynamicImage) -> Result<Vec<u8>> {
        // The ICO decoder only reads RGBA entries.
        let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
        if rgba.width() > ICO_MAX_EDGE || rgba.height() > ICO_MAX_EDGE {
            log::debug!(
                "Scaling {}x{} image to fit {}x{} ICO frame",
                rgba.width(),
                rgba.height(),
                ICO_MAX_EDGE,
                ICO_MAX_EDGE
            );
            let fitted = fit_within(&rgba, ICO_MAX_EDGE, ICO_MAX_EDGE, self.algorithm);
            let fitted = DynamicImage::ImageRgba8(fitted.to_rgba8());
            return self.encode_generic(&fitted, ImageFormat::Ico);
        }
        self.encode_generic(&rgba, ImageFormat::Ico)
    }

    fn encode_generic(&self, image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, format)?;
        Ok(buffer.into_inner())
    }

    pub fn optimize_png_bytes(&self, data: &[u8]) -> Result<Vec<u8>> {
        let optimized = optimize_from_memory(data, &Options::default()).map_err(|e| {
            ImageToolError::InvalidParameter(format!("PNG optimization failed: {}", e))
        })?;
        log::debug!("PNG optimized: {} -> {} bytes", data.len(), optimized.len());
        Ok(optimized)
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new(90)
    }
}
