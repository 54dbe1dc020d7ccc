// pixelhorizon/src/processors/mod.rs
mod background;
mod batch;
mod converter;
mod encoder;
mod grayscale;
mod loader;
mod resizer;
mod vectorizer;

pub use background::{BackgroundRemover, BackgroundService, RemoveBgClient, REMOVE_BG_ENDPOINT};
pub use batch::{BatchProcessor, BatchRequest, BatchResult, ProcessedFile, TaskFailure};
pub use converter::{flatten_onto_white, supports as supports_conversion, transform_for, Converter};
pub use encoder::Encoder;
pub use grayscale::Grayscale;
pub use loader::Loader;
pub use resizer::{fit_within, Resizer};
pub use vectorizer::{threshold_bitmap, PotraceTracer, TraceTool, Vectorizer, POTRACE};

use crate::core::{OperationKind, Result};
use std::path::{Path, PathBuf};

/// A single pipeline stage: reads one file, writes one file.
///
/// Implementations hold no mutable state and may run concurrently on
/// different tasks.
pub trait Operation: Send + Sync {
    fn kind(&self) -> OperationKind;

    /// Extension of the file this stage writes, given the one it reads.
    fn output_extension(&self, input_ext: &str) -> String;

    /// Checks prerequisites that do not depend on the input file.
    fn preflight(&self) -> Result<()> {
        Ok(())
    }

    fn apply(&self, input: &Path, output: &Path) -> Result<PathBuf>;
}

pub(crate) fn write_output(path: &Path, bytes: &[u8]) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, bytes)?;
    log::debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(path.to_path_buf())
}
