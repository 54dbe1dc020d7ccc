// pixelhorizon/src/processors/batch.rs
use crate::core::{ImageTask, ImageToolError, OperationKind, OutputTarget, Pipeline, Result};
use crate::utils::is_supported_format;
use glob::{MatchOptions, Pattern};
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// What to process and where to put it.
#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    /// Files (or directories, which are scanned) named explicitly.
    pub inputs: Vec<PathBuf>,
    /// Directory to scan in addition to `inputs`.
    pub input_dir: Option<PathBuf>,
    /// File-name glob for directory scans; the default extension set when unset.
    pub pattern: Option<String>,
    pub recursive: bool,
    pub output: Option<PathBuf>,
}

#[derive(Debug)]
pub struct ProcessedFile {
    pub source: PathBuf,
    pub output: PathBuf,
}

#[derive(Debug)]
pub struct TaskFailure {
    pub source: PathBuf,
    pub error: ImageToolError,
}

impl TaskFailure {
    pub fn stage(&self) -> Option<OperationKind> {
        self.error.stage()
    }
}

/// Per-file outcomes of one batch, each list sorted by source path.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub succeeded: Vec<ProcessedFile>,
    pub failed: Vec<TaskFailure>,
}

impl BatchResult {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

struct Discovery {
    files: Vec<PathBuf>,
    missing: Vec<PathBuf>,
}

pub struct BatchProcessor {
    pipeline: Pipeline,
    thread_pool: Option<rayon::ThreadPool>,
    show_progress: bool,
}

impl BatchProcessor {
    pub fn new(pipeline: Pipeline, max_threads: usize) -> Result<Self> {
        let thread_pool = if max_threads > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(max_threads)
                .build()
                .map_err(|e| {
                    ImageToolError::InvalidParameter(format!("Failed to create thread pool: {}", e))
                })?;
            Some(pool)
        } else {
            None
        };

        Ok(Self {
            pipeline,
            thread_pool,
            show_progress: false,
        })
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Discovers inputs, validates the output target, then runs every file.
    ///
    /// Returns `Err` only for batch-level problems (no inputs, a single-file
    /// output with several inputs, a bad pattern). Per-file errors end up in
    /// [`BatchResult::failed`].
    pub fn run(&self, request: &BatchRequest) -> Result<BatchResult> {
        let discovery = self.discover(request)?;

        if discovery.files.is_empty() {
            for path in &discovery.missing {
                log::warn!("{}: does not exist", path.display());
            }
            return Err(ImageToolError::NoInputs {
                missing: discovery.missing,
            });
        }

        let target = OutputTarget::classify(request.output.as_deref(), discovery.files.len())?;
        if let OutputTarget::Directory(dir) = &target {
            std::fs::create_dir_all(dir)?;
        }

        log::info!("Processing {} image(s)", discovery.files.len());

        let tasks: Vec<ImageTask> = discovery
            .files
            .iter()
            .map(|source| ImageTask::new(source, target.clone()))
            .collect();

        let outcomes = match &self.thread_pool {
            Some(pool) => pool.install(|| self.execute(&tasks)),
            None => self.execute(&tasks),
        };

        let mut result = BatchResult::default();
        for path in discovery.missing {
            log::warn!("{}: does not exist, skipping", path.display());
            result.failed.push(TaskFailure {
                error: ImageToolError::InputNotFound(path.clone()),
                source: path,
            });
        }

        for (task, outcome) in tasks.into_iter().zip(outcomes) {
            match outcome {
                Ok(output) => result.succeeded.push(ProcessedFile {
                    source: task.source,
                    output,
                }),
                Err(error) => {
                    log::warn!("{}: {}", task.source.display(), error);
                    result.failed.push(TaskFailure {
                        source: task.source,
                        error,
                    });
                }
            }
        }

        result.succeeded.sort_by(|a, b| a.source.cmp(&b.source));
        result.failed.sort_by(|a, b| a.source.cmp(&b.source));

        Ok(result)
    }

    fn execute(&self, tasks: &[ImageTask]) -> Vec<Result<PathBuf>> {
        let pb = self.create_progress_bar(tasks.len());

        let outcomes: Vec<Result<PathBuf>> = tasks
            .par_iter()
            .progress_with(pb.clone())
            .map(|task| self.pipeline.run(task))
            .collect();

        pb.finish_and_clear();
        outcomes
    }

    fn discover(&self, request: &BatchRequest) -> Result<Discovery> {
        let pattern = request
            .pattern
            .as_deref()
            .map(|p| {
                Pattern::new(p).map_err(|e| {
                    ImageToolError::InvalidParameter(format!("Invalid pattern '{}': {}", p, e))
                })
            })
            .transpose()?;

        let mut files = Vec::new();
        let mut missing = Vec::new();

        for input in &request.inputs {
            if input.is_dir() {
                files.extend(collect_image_paths(input, pattern.as_ref(), request.recursive));
            } else if input.is_file() {
                files.push(input.clone());
            } else {
                missing.push(input.clone());
            }
        }

        if let Some(dir) = &request.input_dir {
            if dir.is_dir() {
                files.extend(collect_image_paths(dir, pattern.as_ref(), request.recursive));
            } else {
                missing.push(dir.clone());
            }
        }

        files.sort();
        files.dedup();

        log::debug!("Discovered {} file(s), {} missing", files.len(), missing.len());

        Ok(Discovery { files, missing })
    }

    fn create_progress_bar(&self, total: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}

fn collect_image_paths(dir: &Path, pattern: Option<&Pattern>, recursive: bool) -> Vec<PathBuf> {
    let walker = if recursive {
        WalkDir::new(dir)
    } else {
        WalkDir::new(dir).max_depth(1)
    };

    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::new()
    };

    walker
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| match pattern {
            Some(pattern) => entry
                .file_name()
                .to_str()
                .map(|name| pattern.matches_with(name, options))
                .unwrap_or(false),
            None => is_supported_format(entry.path()),
        })
        .map(|entry| entry.into_path())
        .collect()
}
