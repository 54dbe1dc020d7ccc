// pixelhorizon/src/processors/grayscale.rs
use super::{write_output, Encoder, Loader, Operation};
use crate::core::{OperationKind, Result};
use image::DynamicImage;
use std::path::{Path, PathBuf};

/// Reduces pixels to single-channel luminance, keeping the input's container format.
pub struct Grayscale {
    loader: Loader,
    encoder: Encoder,
}

impl Grayscale {
    pub fn new(encoder: Encoder) -> Self {
        Self {
            loader: Loader::new(),
            encoder,
        }
    }
}

impl Operation for Grayscale {
    fn kind(&self) -> OperationKind {
        OperationKind::Grayscale
    }

    fn output_extension(&self, input_ext: &str) -> String {
        input_ext.to_string()
    }

    fn apply(&self, input: &Path, output: &Path) -> Result<PathBuf> {
        let (image, format) = self.loader.load_with_format(input)?;
        let gray = DynamicImage::ImageLuma8(image.to_luma8());
        let bytes = self.encoder.encode(&gray, format)?;
        write_output(output, &bytes)
    }
}
