// pixelhorizon/src/processors/vectorizer.rs
use super::converter::flatten_onto_white;
use super::{write_output, Loader, Operation};
use crate::core::{ImageToolError, OperationKind, Result, TraceParams};
use image::DynamicImage;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const POTRACE: &str = "potrace";

const DIAGNOSTIC_LIMIT: usize = 4096;

/// Turns a 1-bit BMP raster into SVG document bytes.
pub trait TraceTool: Send + Sync {
    /// Fails with `ToolMissing` when the tool cannot be run at all.
    fn ensure_available(&self) -> Result<()>;

    fn trace(&self, bitmap: &[u8], params: &TraceParams) -> Result<Vec<u8>>;
}

/// Runs the `potrace` executable, looking in a local tool directory before `PATH`.
pub struct PotraceTracer {
    executable: String,
    tools_dir: PathBuf,
    timeout: Duration,
    scratch_root: Option<PathBuf>,
}

impl PotraceTracer {
    pub fn new(tools_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            executable: POTRACE.to_string(),
            tools_dir: tools_dir.into(),
            timeout,
            scratch_root: None,
        }
    }

    pub fn with_executable(mut self, name: impl Into<String>) -> Self {
        self.executable = name.into();
        self
    }

    pub fn with_scratch_root(mut self, root: Option<PathBuf>) -> Self {
        self.scratch_root = root;
        self
    }

    pub fn locate(&self) -> Result<PathBuf> {
        let local = self
            .tools_dir
            .join(format!("{}{}", self.executable, std::env::consts::EXE_SUFFIX));
        if local.is_file() {
            log::debug!("Using local {}", local.display());
            return Ok(local);
        }

        which::which(&self.executable).map_err(|_| ImageToolError::ToolMissing(self.executable.clone()))
    }

    fn workdir(&self) -> Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("pixelhorizon-trace-");
        let dir = match &self.scratch_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        Ok(dir)
    }
}

impl TraceTool for PotraceTracer {
    fn ensure_available(&self) -> Result<()> {
        self.locate().map(|_| ())
    }

    fn trace(&self, bitmap: &[u8], params: &TraceParams) -> Result<Vec<u8>> {
        let tool = self.locate()?;

        // Removed on drop, whichever way this function returns.
        let workdir = self.workdir()?;
        let raster = workdir.path().join("input.bmp");
        let svg = workdir.path().join("output.svg");
        std::fs::write(&raster, bitmap)?;

        log::debug!(
            "Running {} (turdsize {}, color {})",
            tool.display(),
            params.turdsize,
            params.color
        );

        let mut child = Command::new(&tool)
            .arg(&raster)
            .arg("--svg")
            .arg("-o")
            .arg(&svg)
            .arg("--turdsize")
            .arg(params.turdsize.to_string())
            .arg("--color")
            .arg(&params.color)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ImageToolError::ToolError(format!("failed to start {}: {}", tool.display(), e)))?;

        // Drained concurrently so a chatty tool never blocks on a full pipe.
        let stderr = child.stderr.take();
        let diagnostics = std::thread::spawn(move || {
            let mut captured = Vec::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_end(&mut captured);
            }
            captured
        });

        let status = wait_with_timeout(&mut child, self.timeout)?;

        if !status.success() {
            let captured = diagnostics.join().unwrap_or_default();
            return Err(ImageToolError::ToolError(format!(
                "{} exited with {}: {}",
                self.executable,
                status,
                diagnostic_tail(&captured)
            )));
        }

        std::fs::read(&svg).map_err(|e| {
            ImageToolError::ToolError(format!("{} produced no SVG output: {}", self.executable, e))
        })
    }
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<ExitStatus> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ImageToolError::ToolError(format!(
                "timed out after {:.1}s",
                timeout.as_secs_f64()
            )));
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

/// Last lines of a tool's stderr, bounded to `DIAGNOSTIC_LIMIT` bytes.
fn diagnostic_tail(captured: &[u8]) -> String {
    let text = String::from_utf8_lossy(captured);
    let text = text.trim();
    if text.len() <= DIAGNOSTIC_LIMIT {
        return text.to_string();
    }
    let mut start = text.len() - DIAGNOSTIC_LIMIT;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}

/// Encodes `image` as a 1-bit BMP: luma below `threshold` is ink (palette
/// index 0, black). Transparent areas count as white.
pub fn threshold_bitmap(image: &DynamicImage, threshold: u8) -> Result<Vec<u8>> {
    const HEADER_LEN: usize = 14 + 40 + 8;

    let luma = flatten_onto_white(image).to_luma8();
    let (width, height) = luma.dimensions();
    let row_len = (width as usize).div_ceil(32) * 4;
    let pixel_len = row_len * height as usize;
    let file_len = u32::try_from(HEADER_LEN + pixel_len).map_err(|_| {
        ImageToolError::InvalidParameter(format!("{}x{} is too large to trace", width, height))
    })?;

    let mut bmp = Vec::with_capacity(HEADER_LEN + pixel_len);
    bmp.extend_from_slice(b"BM");
    bmp.extend_from_slice(&file_len.to_le_bytes());
    bmp.extend_from_slice(&0u32.to_le_bytes());
    bmp.extend_from_slice(&(HEADER_LEN as u32).to_le_bytes());

    bmp.extend_from_slice(&40u32.to_le_bytes());
    bmp.extend_from_slice(&width.to_le_bytes());
    bmp.extend_from_slice(&height.to_le_bytes());
    bmp.extend_from_slice(&1u16.to_le_bytes()); // planes
    bmp.extend_from_slice(&1u16.to_le_bytes()); // bits per pixel
    bmp.extend_from_slice(&0u32.to_le_bytes()); // BI_RGB
    bmp.extend_from_slice(&(file_len - HEADER_LEN as u32).to_le_bytes());
    bmp.extend_from_slice(&2835u32.to_le_bytes());
    bmp.extend_from_slice(&2835u32.to_le_bytes());
    bmp.extend_from_slice(&2u32.to_le_bytes());
    bmp.extend_from_slice(&0u32.to_le_bytes());

    bmp.extend_from_slice(&[0, 0, 0, 0]);
    bmp.extend_from_slice(&[255, 255, 255, 0]);

    // Rows are stored bottom-up, most significant bit first.
    for y in (0..height).rev() {
        let mut row = vec![0u8; row_len];
        for x in 0..width {
            if luma.get_pixel(x, y)[0] >= threshold {
                row[(x / 8) as usize] |= 0x80 >> (x % 8);
            }
        }
        bmp.extend_from_slice(&row);
    }

    Ok(bmp)
}

pub struct Vectorizer {
    tool: Arc<dyn TraceTool>,
    params: TraceParams,
    loader: Loader,
}

impl Vectorizer {
    pub fn new(tool: Arc<dyn TraceTool>, params: TraceParams) -> Self {
        Self {
            tool,
            params,
            loader: Loader::new(),
        }
    }
}

impl Operation for Vectorizer {
    fn kind(&self) -> OperationKind {
        OperationKind::Vectorize
    }

    fn output_extension(&self, _input_ext: &str) -> String {
        "svg".to_string()
    }

    fn preflight(&self) -> Result<()> {
        self.tool.ensure_available()
    }

    fn apply(&self, input: &Path, output: &Path) -> Result<PathBuf> {
        self.tool.ensure_available()?;
        let image = self.loader.load(input)?;
        let bitmap = threshold_bitmap(&image, self.params.threshold)?;
        let svg = self.tool.trace(&bitmap, &self.params)?;
        write_output(output, &svg)
    }
}
