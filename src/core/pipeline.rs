// pixelhorizon/src/core/pipeline.rs
use super::{FinalStep, ImageTask, ImageToolError, OperationKind, PipelineConfig, Result, TaskState};
use crate::processors::{
    BackgroundRemover, BackgroundService, Converter, Encoder, Grayscale, Loader, Operation,
    PotraceTracer, RemoveBgClient, Resizer, TraceTool, Vectorizer,
};
use crate::utils::{format_file_size, resolve_output_path};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// External capabilities the pipeline delegates to.
#[derive(Clone)]
pub struct Services {
    pub background: Arc<dyn BackgroundService>,
    pub api_key: Option<String>,
    pub tracer: Arc<dyn TraceTool>,
}

impl Services {
    /// The remove.bg client and the `potrace` executable.
    pub fn production(config: &PipelineConfig, api_key: Option<String>, tools_dir: &Path) -> Self {
        Self {
            background: Arc::new(RemoveBgClient::new(config.network_timeout)),
            api_key,
            tracer: Arc::new(
                PotraceTracer::new(tools_dir, config.tool_timeout)
                    .with_scratch_root(config.scratch_root.clone()),
            ),
        }
    }
}

/// Runs one task's stages in their fixed order, passing intermediates
/// through a private scratch directory.
pub struct Pipeline {
    config: PipelineConfig,
    stages: Vec<Box<dyn Operation>>,
    loader: Loader,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, services: Services) -> Result<Self> {
        config.validate()?;

        let encoder = Encoder::new(config.quality)
            .with_png_optimization(config.optimize_png)
            .with_algorithm(config.algorithm);

        let mut stages: Vec<Box<dyn Operation>> = Vec::new();
        if let Some((width, height)) = config.resize {
            stages.push(Box::new(Resizer::new(width, height, config.algorithm, encoder.clone())));
        }
        if config.grayscale {
            stages.push(Box::new(Grayscale::new(encoder.clone())));
        }
        if config.remove_background {
            stages.push(Box::new(BackgroundRemover::new(
                services.background.clone(),
                services.api_key.clone(),
            )));
        }
        match &config.final_step {
            Some(FinalStep::Convert(target)) => {
                stages.push(Box::new(Converter::new(*target, encoder.clone())));
            }
            Some(FinalStep::Vectorize(params)) => {
                stages.push(Box::new(Vectorizer::new(services.tracer.clone(), params.clone())));
            }
            None => {}
        }

        log::debug!(
            "Pipeline stages: [{}]",
            stages
                .iter()
                .map(|stage| stage.kind().name())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(Self {
            config,
            stages,
            loader: Loader::new(),
        })
    }

    pub fn operations(&self) -> Vec<OperationKind> {
        self.stages.iter().map(|stage| stage.kind()).collect()
    }

    /// Where `task`'s final artifact will be written.
    pub fn output_path(&self, task: &ImageTask) -> Result<PathBuf> {
        let source_ext = self.loader.source_extension(&task.source)?;
        Ok(self.plan(&task.source, &source_ext, task))
    }

    fn plan(&self, source: &Path, source_ext: &str, task: &ImageTask) -> PathBuf {
        let final_ext = self
            .stages
            .iter()
            .fold(source_ext.to_string(), |ext, stage| stage.output_extension(&ext));

        let suffix = match self.stages.as_slice() {
            [only] => only.kind().naming_suffix(),
            _ => "processed",
        };

        resolve_output_path(source, &final_ext, suffix, &task.target)
    }

    pub fn run(&self, task: &ImageTask) -> Result<PathBuf> {
        let mut state = TaskState::Pending;
        let source = task.source.as_path();

        if !source.is_file() {
            return Err(ImageToolError::InputNotFound(source.to_path_buf()));
        }

        let source_ext = self.loader.source_extension(source)?;
        let output = self.plan(source, &source_ext, task);

        if self.stages.is_empty() {
            copy_verbatim(source, &output)?;
            log::info!("{} -> {} (unchanged)", source.display(), output.display());
            return Ok(output);
        }

        for stage in &self.stages {
            stage.preflight().map_err(|e| e.in_stage(stage.kind()))?;
        }

        // Intermediates live here until the task returns.
        let scratch = if self.stages.len() > 1 {
            Some(self.scratch_dir()?)
        } else {
            None
        };

        let mut current = source.to_path_buf();
        let mut ext = source_ext;
        let last = self.stages.len() - 1;

        for (index, stage) in self.stages.iter().enumerate() {
            transition(source, &mut state, TaskState::Running(index));
            ext = stage.output_extension(&ext);

            let destination = match (&scratch, index == last) {
                (Some(dir), false) => dir.path().join(format!("{}-{}.{}", index, stage.kind(), ext)),
                _ => output.clone(),
            };

            match stage.apply(&current, &destination) {
                Ok(written) => current = written,
                Err(e) => {
                    transition(source, &mut state, TaskState::Failed);
                    return Err(e.in_stage(stage.kind()));
                }
            }
        }

        transition(source, &mut state, TaskState::Done);

        let size = std::fs::metadata(&current).map(|m| m.len()).unwrap_or(0);
        log::info!(
            "{} -> {} ({})",
            source.display(),
            current.display(),
            format_file_size(size)
        );

        Ok(current)
    }

    fn scratch_dir(&self) -> Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("pixelhorizon-task-");
        let dir = match &self.config.scratch_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        Ok(dir)
    }
}

fn transition(source: &Path, state: &mut TaskState, next: TaskState) {
    log::debug!("{}: {:?} -> {:?}", source.display(), state, next);
    *state = next;
}

fn copy_verbatim(source: &Path, output: &Path) -> Result<()> {
    if let (Ok(a), Ok(b)) = (source.canonicalize(), output.canonicalize()) {
        if a == b {
            return Ok(());
        }
    }
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::copy(source, output)?;
    Ok(())
}
