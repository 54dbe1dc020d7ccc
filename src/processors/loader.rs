// pixelhorizon/src/processors/loader.rs
use crate::core::{ImageToolError, Result};
use crate::utils::get_file_extension;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};
use std::path::Path;

#[derive(Clone)]
pub struct Loader {
    max_dimensions: Option<(u32, u32)>,
}

impl Loader {
    pub fn new() -> Self {
        Self {
            max_dimensions: Some((100_000, 100_000)),
        }
    }

    pub fn with_max_dimensions(mut self, width: u32, height: u32) -> Self {
        self.max_dimensions = Some((width, height));
        self
    }

    pub fn load(&self, path: &Path) -> Result<DynamicImage> {
        self.load_with_format(path).map(|(image, _)| image)
    }

    /// Decodes `path`, also returning the container format it was stored in.
    pub fn load_with_format(&self, path: &Path) -> Result<(DynamicImage, ImageFormat)> {
        log::debug!("Loading image from: {}", path.display());

        self.validate_path(path)?;

        let reader = ImageReader::open(path)?.with_guessed_format()?;
        let format = reader.format().ok_or_else(|| {
            ImageToolError::InvalidParameter(format!(
                "Cannot determine the format of {}",
                path.display()
            ))
        })?;
        let image = reader.decode()?;

        if let Some((max_w, max_h)) = self.max_dimensions {
            let (width, height) = image.dimensions();
            if width > max_w || height > max_h {
                return Err(ImageToolError::InvalidParameter(format!(
                    "Image dimensions {}x{} exceed maximum {}x{}",
                    width, height, max_w, max_h
                )));
            }
        }

        log::debug!(
            "Loaded image: {}x{} pixels, color: {:?}",
            image.width(),
            image.height(),
            image.color()
        );

        Ok((image, format))
    }

    pub fn read_bytes(&self, path: &Path) -> Result<Vec<u8>> {
        self.validate_path(path)?;
        Ok(std::fs::read(path)?)
    }

    /// Lower-cased extension of `path`, falling back to the sniffed format for
    /// extensionless files.
    pub fn source_extension(&self, path: &Path) -> Result<String> {
        if let Some(ext) = get_file_extension(path) {
            return Ok(ext);
        }

        self.validate_path(path)?;
        let reader = ImageReader::open(path)?.with_guessed_format()?;
        reader
            .format()
            .and_then(|format| format.extensions_str().first().copied())
            .map(str::to_string)
            .ok_or_else(|| {
                ImageToolError::InvalidParameter(format!(
                    "Cannot determine the format of {}",
                    path.display()
                ))
            })
    }

    fn validate_path(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(ImageToolError::InputNotFound(path.to_path_buf()));
        }

        let metadata = path.metadata()?;
        if metadata.len() == 0 {
            return Err(ImageToolError::InvalidParameter(format!(
                "File is empty: {}",
                path.display()
            )));
        }

        Ok(())
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}
