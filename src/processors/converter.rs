// pixelhorizon/src/processors/converter.rs
use super::{write_output, Encoder, Loader, Operation};
use crate::core::{ImageToolError, OperationKind, Result, TargetFormat};
use crate::utils::DEFAULT_EXTENSIONS;
use image::{DynamicImage, Rgb, RgbImage};
use std::path::{Path, PathBuf};

/// Pixel transform applied before encoding into a target format.
pub type Transform = fn(DynamicImage) -> DynamicImage;

/// Pixel transform for each target format. PNG and ICO carry the pixels
/// through unchanged; JPEG needs an opaque buffer.
pub fn transform_for(target: TargetFormat) -> Transform {
    match target {
        TargetFormat::Jpg | TargetFormat::Jpeg => to_jpeg,
        TargetFormat::Png | TargetFormat::Ico => identity,
    }
}

fn to_jpeg(image: DynamicImage) -> DynamicImage {
    flatten_onto_white(&image)
}

fn identity(image: DynamicImage) -> DynamicImage {
    image
}

/// Whether `source_ext` can be converted to `target_ext`.
pub fn supports(source_ext: &str, target_ext: &str) -> bool {
    DEFAULT_EXTENSIONS.contains(&source_ext.to_ascii_lowercase().as_str())
        && TargetFormat::from_extension(target_ext).is_some()
}

/// Composites an image with alpha onto opaque white, weighting by alpha.
/// Images without alpha are only narrowed to 8-bit gray or RGB.
pub fn flatten_onto_white(image: &DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => image.clone(),
        other if !other.color().has_alpha() => DynamicImage::ImageRgb8(other.to_rgb8()),
        other => {
            let rgba = other.to_rgba8();
            let mut rgb = RgbImage::new(rgba.width(), rgba.height());
            for (x, y, pixel) in rgba.enumerate_pixels() {
                let alpha = pixel[3] as u32;
                let blend = |channel: u8| -> u8 {
                    ((channel as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8
                };
                rgb.put_pixel(x, y, Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
            }
            DynamicImage::ImageRgb8(rgb)
        }
    }
}

pub struct Converter {
    target: TargetFormat,
    loader: Loader,
    encoder: Encoder,
}

impl Converter {
    pub fn new(target: TargetFormat, encoder: Encoder) -> Self {
        Self {
            target,
            loader: Loader::new(),
            encoder,
        }
    }

    pub fn convert(&self, image: DynamicImage) -> Result<Vec<u8>> {
        let transformed = transform_for(self.target)(image);
        self.encoder.encode(&transformed, self.target.image_format())
    }
}

impl Operation for Converter {
    fn kind(&self) -> OperationKind {
        OperationKind::Convert
    }

    fn output_extension(&self, _input_ext: &str) -> String {
        self.target.extension().to_string()
    }

    fn apply(&self, input: &Path, output: &Path) -> Result<PathBuf> {
        let source_ext = self.loader.source_extension(input)?;
        if !supports(&source_ext, self.target.extension()) {
            return Err(ImageToolError::UnsupportedConversion {
                from: source_ext,
                to: self.target.extension().to_string(),
            });
        }

        log::debug!("Converting {} -> {}", source_ext, self.target.extension());

        let image = self.loader.load(input)?;
        let bytes = self.convert(image)?;
        write_output(output, &bytes)
    }
}
