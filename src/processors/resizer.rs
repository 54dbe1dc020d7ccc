// pixelhorizon/src/processors/resizer.rs
use super::{write_output, Encoder, Loader, Operation};
use crate::core::{OperationKind, ResizeAlgorithm, Result};
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use std::path::{Path, PathBuf};

/// Resamples to an exact width and height. Aspect ratio is not preserved.
pub struct Resizer {
    width: u32,
    height: u32,
    algorithm: ResizeAlgorithm,
    loader: Loader,
    encoder: Encoder,
}

impl Resizer {
    pub fn new(width: u32, height: u32, algorithm: ResizeAlgorithm, encoder: Encoder) -> Self {
        Self {
            width,
            height,
            algorithm,
            loader: Loader::new(),
            encoder,
        }
    }

    pub fn resize(&self, image: &DynamicImage) -> DynamicImage {
        if self.width == image.width() && self.height == image.height() {
            log::debug!("Image dimensions unchanged, skipping resize");
            return image.clone();
        }

        log::debug!(
            "Resizing image from {}x{} to {}x{}",
            image.width(),
            image.height(),
            self.width,
            self.height
        );

        image.resize_exact(self.width, self.height, filter_type(self.algorithm))
    }
}

impl Operation for Resizer {
    fn kind(&self) -> OperationKind {
        OperationKind::Resize
    }

    fn output_extension(&self, input_ext: &str) -> String {
        input_ext.to_string()
    }

    fn apply(&self, input: &Path, output: &Path) -> Result<PathBuf> {
        let (image, format) = self.loader.load_with_format(input)?;
        let resized = self.resize(&image);
        let bytes = self.encoder.encode(&resized, format)?;
        write_output(output, &bytes)
    }
}

/// Scales `image` down so it fits inside `max_w` x `max_h`, keeping its aspect ratio.
pub fn fit_within(
    image: &DynamicImage,
    max_w: u32,
    max_h: u32,
    algorithm: ResizeAlgorithm,
) -> DynamicImage {
    let (orig_w, orig_h) = image.dimensions();
    if orig_w <= max_w && orig_h <= max_h {
        return image.clone();
    }

    let (width, height) = preserve_aspect(orig_w, orig_h, max_w, max_h);
    image.resize_exact(width, height, filter_type(algorithm))
}

fn preserve_aspect(orig_w: u32, orig_h: u32, target_w: u32, target_h: u32) -> (u32, u32) {
    let ratio_w = target_w as f32 / orig_w as f32;
    let ratio_h = target_h as f32 / orig_h as f32;
    let ratio = ratio_w.min(ratio_h);

    let new_w = (orig_w as f32 * ratio).round() as u32;
    let new_h = (orig_h as f32 * ratio).round() as u32;

    (new_w.clamp(1, target_w), new_h.clamp(1, target_h))
}

fn filter_type(algorithm: ResizeAlgorithm) -> FilterType {
    match algorithm {
        ResizeAlgorithm::Nearest => FilterType::Nearest,
        ResizeAlgorithm::Bilinear => FilterType::Triangle,
        ResizeAlgorithm::Bicubic => FilterType::CatmullRom,
        ResizeAlgorithm::Lanczos3 => FilterType::Lanczos3,
    }
}
