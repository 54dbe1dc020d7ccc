// pixelhorizon/src/core/mod.rs
pub mod pipeline;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub use pipeline::{Pipeline, Services};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResizeAlgorithm {
    Nearest,
    Bilinear,
    Bicubic,
    Lanczos3,
}

/// Operation kinds, declared in the order the pipeline executes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperationKind {
    Resize,
    Grayscale,
    RemoveBackground,
    Convert,
    Vectorize,
}

impl OperationKind {
    pub fn name(self) -> &'static str {
        match self {
            OperationKind::Resize => "resize",
            OperationKind::Grayscale => "grayscale",
            OperationKind::RemoveBackground => "remove-background",
            OperationKind::Convert => "convert",
            OperationKind::Vectorize => "vectorize",
        }
    }

    /// Suffix appended to derived file names when this is the only operation.
    pub fn naming_suffix(self) -> &'static str {
        match self {
            OperationKind::Resize => "resized",
            OperationKind::Grayscale => "grayscale",
            OperationKind::RemoveBackground => "no-bg",
            OperationKind::Convert | OperationKind::Vectorize => "",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Encodings a `Convert` stage can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    Jpg,
    Jpeg,
    Png,
    Ico,
}

impl TargetFormat {
    pub const ALL: [TargetFormat; 4] = [
        TargetFormat::Jpg,
        TargetFormat::Jpeg,
        TargetFormat::Png,
        TargetFormat::Ico,
    ];

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" => Some(TargetFormat::Jpg),
            "jpeg" => Some(TargetFormat::Jpeg),
            "png" => Some(TargetFormat::Png),
            "ico" => Some(TargetFormat::Ico),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            TargetFormat::Jpg => "jpg",
            TargetFormat::Jpeg => "jpeg",
            TargetFormat::Png => "png",
            TargetFormat::Ico => "ico",
        }
    }

    pub fn image_format(self) -> image::ImageFormat {
        match self {
            TargetFormat::Jpg | TargetFormat::Jpeg => image::ImageFormat::Jpeg,
            TargetFormat::Png => image::ImageFormat::Png,
            TargetFormat::Ico => image::ImageFormat::Ico,
        }
    }
}

/// Parameters handed to the vectorization tool.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceParams {
    /// Speckles smaller than this many pixels are suppressed.
    pub turdsize: u32,
    /// Fill colour, `#rrggbb`.
    pub color: String,
    /// Luma at or above which a pixel becomes background in the 1-bit raster.
    pub threshold: u8,
}

impl Default for TraceParams {
    fn default() -> Self {
        Self {
            turdsize: 2,
            color: "#000000".to_string(),
            threshold: 128,
        }
    }
}

/// The terminal encoding step. Convert and Vectorize are mutually exclusive.
#[derive(Debug, Clone, PartialEq)]
pub enum FinalStep {
    Convert(TargetFormat),
    Vectorize(TraceParams),
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub resize: Option<(u32, u32)>,
    pub grayscale: bool,
    pub remove_background: bool,
    pub final_step: Option<FinalStep>,
    pub quality: u8,
    pub algorithm: ResizeAlgorithm,
    pub optimize_png: bool,
    pub network_timeout: Duration,
    pub tool_timeout: Duration,
    /// Parent directory for per-task scratch directories; the system temp dir when unset.
    pub scratch_root: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            resize: None,
            grayscale: false,
            remove_background: false,
            final_step: None,
            quality: 90,
            algorithm: ResizeAlgorithm::Lanczos3,
            optimize_png: false,
            network_timeout: Duration::from_secs(30),
            tool_timeout: Duration::from_secs(60),
            scratch_root: None,
        }
    }
}

impl PipelineConfig {
    /// Requested operations in execution order.
    pub fn operations(&self) -> Vec<OperationKind> {
        let mut kinds = Vec::new();
        if self.resize.is_some() {
            kinds.push(OperationKind::Resize);
        }
        if self.grayscale {
            kinds.push(OperationKind::Grayscale);
        }
        if self.remove_background {
            kinds.push(OperationKind::RemoveBackground);
        }
        match self.final_step {
            Some(FinalStep::Convert(_)) => kinds.push(OperationKind::Convert),
            Some(FinalStep::Vectorize(_)) => kinds.push(OperationKind::Vectorize),
            None => {}
        }
        kinds
    }

    pub fn validate(&self) -> Result<()> {
        if let Some((width, height)) = self.resize {
            if width == 0 || height == 0 {
                return Err(ImageToolError::InvalidParameter(
                    "Resize dimensions must be greater than zero".to_string(),
                ));
            }
            if width > 100_000 || height > 100_000 {
                return Err(ImageToolError::InvalidParameter(
                    "Dimensions too large (max 100,000 pixels)".to_string(),
                ));
            }
        }

        if self.quality == 0 || self.quality > 100 {
            return Err(ImageToolError::InvalidParameter(
                "Quality must be between 1 and 100".to_string(),
            ));
        }

        if let Some(FinalStep::Vectorize(params)) = &self.final_step {
            if !is_hex_color(&params.color) {
                return Err(ImageToolError::InvalidParameter(format!(
                    "Invalid color '{}', expected #rrggbb",
                    params.color
                )));
            }
        }

        if self.network_timeout.is_zero() || self.tool_timeout.is_zero() {
            return Err(ImageToolError::InvalidParameter(
                "Timeouts must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

fn is_hex_color(value: &str) -> bool {
    value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Where a task's final artifact goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// Beside the source, with a derived name.
    BesideSource,
    /// Exactly this file. Only valid for a single-file batch.
    File(PathBuf),
    /// Into this directory, keeping the source's base name.
    Directory(PathBuf),
}

impl OutputTarget {
    /// Classifies a caller-supplied `--output` for a batch of `batch_len` files.
    ///
    /// An existing directory, or an extensionless path in a multi-file batch,
    /// is a directory target. Anything else is a file target, which conflicts
    /// with a batch of more than one file.
    pub fn classify(output: Option<&Path>, batch_len: usize) -> Result<Self> {
        let Some(path) = output else {
            return Ok(OutputTarget::BesideSource);
        };

        if path.is_dir() || (path.extension().is_none() && batch_len > 1) {
            return Ok(OutputTarget::Directory(path.to_path_buf()));
        }

        if batch_len > 1 {
            return Err(ImageToolError::ConfigConflict(format!(
                "Output '{}' names a single file but {} input files were found",
                path.display(),
                batch_len
            )));
        }

        Ok(OutputTarget::File(path.to_path_buf()))
    }
}

/// One input file's request. The operations themselves live on the [`Pipeline`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTask {
    pub source: PathBuf,
    pub target: OutputTarget,
}

impl ImageTask {
    pub fn new(source: impl Into<PathBuf>, target: OutputTarget) -> Self {
        Self {
            source: source.into(),
            target,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running(usize),
    Done,
    Failed,
}

#[derive(Error, Debug)]
pub enum ImageToolError {
    #[error("Input not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Conversion from '{from}' to '{to}' is not supported")]
    UnsupportedConversion { from: String, to: String },

    #[error("Background removal requires an API key (set REMOVE_BG_API_KEY)")]
    MissingCredential,

    #[error("Authentication rejected: {0}")]
    Auth(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Service error (HTTP {status}): {message}")]
    Service { status: u16, message: String },

    #[error("Tool '{0}' not found in the local tool directory or on PATH")]
    ToolMissing(String),

    #[error("Tool failed: {0}")]
    ToolError(String),

    #[error("Configuration conflict: {0}")]
    ConfigConflict(String),

    #[error("No input files found{}", missing_list(.missing))]
    NoInputs { missing: Vec<PathBuf> },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("{stage}: {source}")]
    Stage {
        stage: OperationKind,
        #[source]
        source: Box<ImageToolError>,
    },
}

impl ImageToolError {
    pub fn in_stage(self, stage: OperationKind) -> Self {
        ImageToolError::Stage {
            stage,
            source: Box::new(self),
        }
    }

    /// The operation that was running when this error occurred, if any.
    pub fn stage(&self) -> Option<OperationKind> {
        match self {
            ImageToolError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The underlying cause with any stage wrapping removed.
    pub fn root(&self) -> &ImageToolError {
        match self {
            ImageToolError::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}

fn missing_list(missing: &[PathBuf]) -> String {
    if missing.is_empty() {
        return String::new();
    }
    let names: Vec<String> = missing.iter().map(|path| path.display().to_string()).collect();
    format!(" (does not exist: {})", names.join(", "))
}

pub type Result<T> = std::result::Result<T, ImageToolError>;
