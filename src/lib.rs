mod cli;
mod core;
mod processors;
mod utils;

pub use cli::{Algorithm, Cli, Format};
pub use crate::core::{
    FinalStep, ImageTask, ImageToolError, OperationKind, OutputTarget, Pipeline,
    PipelineConfig, ResizeAlgorithm, Result, Services, TargetFormat, TaskState, TraceParams,
};
pub use processors::{
    fit_within, flatten_onto_white, supports_conversion, threshold_bitmap, transform_for,
    BackgroundRemover, BackgroundService, BatchProcessor, BatchRequest, BatchResult, Converter,
    Encoder, Grayscale, Loader, Operation, PotraceTracer, ProcessedFile, RemoveBgClient, Resizer,
    TaskFailure, TraceTool, Vectorizer, POTRACE, REMOVE_BG_ENDPOINT,
};
pub use utils::{
    file_stem, format_file_size, get_file_extension, is_supported_format, resolve_output_path,
    DEFAULT_EXTENSIONS,
};

pub mod prelude {
    pub use crate::{
        BatchProcessor, BatchRequest, ImageTask, OutputTarget, Pipeline, PipelineConfig, Services,
    };
}

// Re-export commonly used types
pub use image::DynamicImage;
