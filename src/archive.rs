//! Zip packaging of workspaces and app bundles, and app type detection.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::{DirEntry, WalkDir};
use zip::CompressionMethod;
use zip::write::FileOptions;

use crate::params::ValidationError;

/// Entries skipped when packaging a directory.
pub const DEFAULT_EXCLUDES: &[&str] = &[".git", "node_modules"];

/// Errors raised while building an archive.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Kind of app binary accepted by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppFileType {
    AndroidApk,
    IosBundle,
}

impl AppFileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppFileType::AndroidApk => "ANDROID_APK",
            AppFileType::IosBundle => "IOS_BUNDLE",
        }
    }
}

/// A validated app binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppFile {
    pub file_type: AppFileType,
    pub path: PathBuf,
}

/// Writes the contents of `input` into a zip at `output`.
///
/// Entry names are relative to `input`, placed under `prefix` when given.
/// An entry is skipped, together with everything below it, when its file
/// name equals one of `excludes`; a pattern of the form `*.ext` skips files
/// with that extension.
pub fn zip_folder(
    input: &Path,
    output: &Path,
    prefix: Option<&str>,
    excludes: &[&str],
) -> Result<(), ArchiveError> {
    let mut writer = zip::ZipWriter::new(File::create(output)?);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let walker = WalkDir::new(input)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_excluded(entry, excludes));

    let mut files = 0usize;
    for entry in walker {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(input)
            .map_err(|e| io::Error::other(e.to_string()))?;
        let name = entry_name(prefix, relative);

        if entry.file_type().is_dir() {
            writer.add_directory(name, options)?;
        } else {
            writer.start_file(name, options)?;
            io::copy(&mut File::open(entry.path())?, &mut writer)?;
            files += 1;
        }
    }

    writer.finish()?;
    debug!("Packaged {} files from {} into {}", files, input.display(), output.display());
    Ok(())
}

/// Zips `path` into `out_dir` if it is a directory, otherwise returns it as is.
///
/// The archive is named after the directory and its entries are placed
/// under the directory name, which keeps `.app` bundles intact.
pub fn zip_if_folder(path: &Path, out_dir: &Path) -> Result<PathBuf, ArchiveError> {
    if !path.is_dir() {
        return Ok(path.to_path_buf());
    }

    let base = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_string());
    let archive = out_dir.join(format!("{}.zip", base));

    zip_folder(path, &archive, Some(&base), DEFAULT_EXCLUDES)?;
    Ok(archive)
}

/// Detects the app type from the archive contents.
///
/// Returns `None` when the file is not a zip or contains neither an
/// `AndroidManifest.xml` nor an `Info.plist`.
pub fn detect_app_type(path: &Path) -> Option<AppFileType> {
    let file = File::open(path).ok()?;
    let archive = zip::ZipArchive::new(file).ok()?;
    let names: Vec<&str> = archive.file_names().collect();

    if names.iter().any(|n| *n == "AndroidManifest.xml") {
        Some(AppFileType::AndroidApk)
    } else if names.iter().any(|n| n.contains("Info.plist")) {
        Some(AppFileType::IosBundle)
    } else {
        None
    }
}

/// Checks that `path` exists and is an app binary the service accepts.
pub fn validate_app_file(path: &Path) -> Result<AppFile, ValidationError> {
    if !path.exists() {
        return Err(ValidationError::MissingFile(path.to_path_buf()));
    }

    let file_type = detect_app_type(path)
        .ok_or_else(|| ValidationError::UnsupportedAppFile(path.to_path_buf()))?;

    Ok(AppFile {
        file_type,
        path: path.to_path_buf(),
    })
}

fn is_excluded(entry: &DirEntry, excludes: &[&str]) -> bool {
    let name = entry.file_name().to_string_lossy();
    excludes.iter().any(|pattern| match pattern.strip_prefix("*.") {
        Some(ext) => entry.file_type().is_file() && name.ends_with(&format!(".{}", ext)),
        None => name == *pattern,
    })
}

fn entry_name(prefix: Option<&str>, relative: &Path) -> String {
    let relative = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    match prefix {
        Some(prefix) => format!("{}/{}", prefix, relative),
        None => relative,
    }
}
