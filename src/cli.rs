// pixelhorizon/src/cli.rs
use crate::core::{FinalStep, PipelineConfig, ResizeAlgorithm, TargetFormat, TraceParams};
use crate::processors::BatchRequest;
use clap::{Parser, ValueEnum};
use log::LevelFilter;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "pixelhorizon",
    version,
    about = "Batch image pipeline: resize, grayscale, background removal, conversion and vectorization",
    after_help = "Example: pixelhorizon logo.png --format jpg --resize 100 100"
)]
pub struct Cli {
    /// Image files or directories to process
    pub inputs: Vec<PathBuf>,

    /// Directory to scan for images
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// File-name glob for directory scans [default: *.png, *.jpg, *.jpeg, *.ico]
    #[arg(short, long)]
    pub pattern: Option<String>,

    /// Scan directories recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// Convert to this format
    #[arg(short, long, value_enum, conflicts_with = "vectorize")]
    pub format: Option<Format>,

    /// Resize to exactly WIDTH x HEIGHT
    #[arg(long, num_args = 2, value_names = ["WIDTH", "HEIGHT"])]
    pub resize: Option<Vec<u32>>,

    /// Convert to grayscale
    #[arg(short, long)]
    pub grayscale: bool,

    /// Remove the background (requires REMOVE_BG_API_KEY)
    #[arg(short = 'b', long = "remove-bg")]
    pub remove_bg: bool,

    /// Trace into an SVG with potrace
    #[arg(long)]
    pub vectorize: bool,

    /// SVG fill color for --vectorize
    #[arg(long, default_value = "#000000")]
    pub color: String,

    /// Suppress speckles up to this many pixels when vectorizing
    #[arg(long, default_value_t = 2)]
    pub turdsize: u32,

    /// Luma threshold (0-255) for the black/white raster traced by --vectorize
    #[arg(long, default_value_t = 128)]
    pub threshold: u8,

    /// Output file (single input only) or directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// JPEG quality (1-100)
    #[arg(long, default_value_t = 90, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub quality: u8,

    /// Resampling algorithm
    #[arg(short, long, value_enum, default_value_t = Algorithm::Lanczos3)]
    pub algorithm: Algorithm,

    /// Losslessly optimize every PNG written
    #[arg(long)]
    pub optimize_png: bool,

    /// Worker threads (0 = one per core)
    #[arg(short = 'j', long, default_value_t = 0)]
    pub threads: usize,

    /// remove.bg API key
    #[arg(long, env = "REMOVE_BG_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Directory searched for potrace before PATH
    #[arg(long, env = "PIXELHORIZON_TOOLS_DIR", default_value = "bin")]
    pub tools_dir: PathBuf,

    /// Background-removal request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Vectorization tool timeout in seconds
    #[arg(long, default_value_t = 60)]
    pub tool_timeout: u64,

    /// Exit with status 2 if any file failed
    #[arg(long)]
    pub fail_on_error: bool,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Only print warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum Format {
    Jpg,
    Jpeg,
    Png,
    Ico,
}

impl From<Format> for TargetFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Jpg => TargetFormat::Jpg,
            Format::Jpeg => TargetFormat::Jpeg,
            Format::Png => TargetFormat::Png,
            Format::Ico => TargetFormat::Ico,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum Algorithm {
    Nearest,
    Bilinear,
    Bicubic,
    Lanczos3,
}

impl From<Algorithm> for ResizeAlgorithm {
    fn from(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Nearest => ResizeAlgorithm::Nearest,
            Algorithm::Bilinear => ResizeAlgorithm::Bilinear,
            Algorithm::Bicubic => ResizeAlgorithm::Bicubic,
            Algorithm::Lanczos3 => ResizeAlgorithm::Lanczos3,
        }
    }
}

impl Cli {
    pub fn log_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Debug
        } else if self.quiet {
            LevelFilter::Warn
        } else {
            LevelFilter::Info
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        let final_step = if self.vectorize {
            Some(FinalStep::Vectorize(TraceParams {
                turdsize: self.turdsize,
                color: self.color.clone(),
                threshold: self.threshold,
            }))
        } else {
            self.format.map(|format| FinalStep::Convert(format.into()))
        };

        PipelineConfig {
            resize: self.resize.as_deref().and_then(|dims| match dims {
                [width, height] => Some((*width, *height)),
                _ => None,
            }),
            grayscale: self.grayscale,
            remove_background: self.remove_bg,
            final_step,
            quality: self.quality,
            algorithm: self.algorithm.into(),
            optimize_png: self.optimize_png,
            network_timeout: Duration::from_secs(self.timeout),
            tool_timeout: Duration::from_secs(self.tool_timeout),
            scratch_root: None,
        }
    }

    pub fn batch_request(&self) -> BatchRequest {
        BatchRequest {
            inputs: self.inputs.clone(),
            input_dir: self.dir.clone(),
            pattern: self.pattern.clone(),
            recursive: self.recursive,
            output: self.output.clone(),
        }
    }
}
