// pixelhorizon/src/utils/mod.rs
use crate::core::OutputTarget;
use std::path::{Path, PathBuf};

/// Extensions picked up by a directory scan when no pattern is given.
pub const DEFAULT_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "ico"];

/// Resolves where a task's final artifact is written.
///
/// - `Directory(dir)`: `dir/<stem>.<ext>`.
/// - `File(path)`: `path` verbatim, even if its extension differs from `ext`.
///   An extensionless path gets `.<ext>` appended.
/// - `BesideSource`: `<source dir>/<stem>_<suffix>.<ext>`, or `<stem>.<ext>`
///   when `suffix` is empty. If that lands on the source itself, `_converted`
///   is used as the suffix instead.
///
/// Only the last dotted extension is stripped from the source name. Nothing
/// here checks for existing files; colliding outputs overwrite each other.
pub fn resolve_output_path(
    source: &Path,
    ext: &str,
    suffix: &str,
    target: &OutputTarget,
) -> PathBuf {
    let stem = file_stem(source);

    match target {
        OutputTarget::Directory(dir) => dir.join(format!("{}.{}", stem, ext)),
        OutputTarget::File(path) => {
            if path.extension().is_none() {
                path.with_extension(ext)
            } else {
                path.clone()
            }
        }
        OutputTarget::BesideSource => {
            let derived = source.with_file_name(suffixed_name(&stem, suffix, ext));
            if derived == source {
                source.with_file_name(suffixed_name(&stem, "converted", ext))
            } else {
                derived
            }
        }
    }
}

fn suffixed_name(stem: &str, suffix: &str, ext: &str) -> String {
    if suffix.is_empty() {
        format!("{}.{}", stem, ext)
    } else {
        format!("{}_{}.{}", stem, suffix, ext)
    }
}

pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string())
}

pub fn get_file_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|s| s.to_lowercase())
}

pub fn is_supported_format(path: &Path) -> bool {
    get_file_extension(path)
        .map(|ext| DEFAULT_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let base = 1024_f64;
    let bytes_f64 = bytes as f64;
    let exponent = ((bytes_f64.log10() / base.log10()).floor() as usize).min(UNITS.len() - 1);
    let size = bytes_f64 / base.powi(exponent as i32);

    format!("{:.2} {}", size, UNITS[exponent])
}
