//! Unpacks a source distribution, rewrites its `setup.py` and packs it up again

use crate::{PostprocessError, PostprocessOptions, set_optional_true};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use fs_err as fs;
use fs_err::File;
use std::io::{self, BufReader, Write as _};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// The build script, relative to the single top-level directory of the sdist
const SETUP_PY: &str = "setup.py";
/// Name of the output directory created next to the input archive by default
pub const DEFAULT_OUTPUT_DIR: &str = "postprocessed";

/// The outcome of [postprocess_sdists]
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Input archive and the post-processed archive written for it
    pub written: Vec<(PathBuf, PathBuf)>,
    /// Input archive and why it couldn't be post-processed
    pub failed: Vec<(PathBuf, PostprocessError)>,
}

impl BatchReport {
    /// Returns `true` if every archive was post-processed
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Post-processes each of `sdist_paths` in turn.
///
/// A failing archive doesn't stop the others, every failure ends up in the report.
pub fn postprocess_sdists(sdist_paths: &[PathBuf], options: &PostprocessOptions) -> BatchReport {
    let mut report = BatchReport::default();
    for sdist_path in sdist_paths {
        match postprocess_sdist(sdist_path, options) {
            Ok(output) => report.written.push((sdist_path.clone(), output)),
            Err(err) => {
                debug!("Post-processing {} failed: {err}", sdist_path.display());
                report.failed.push((sdist_path.clone(), err));
            }
        }
    }
    report
}

/// Writes a copy of the `.tar.gz` source distribution at `sdist_path` in which every Rust
/// extension in `setup.py` is marked as optional, returning the path of the copy.
///
/// The archive is unpacked into a temporary directory that is removed again on return,
/// whether post-processing succeeded or not.
pub fn postprocess_sdist(
    sdist_path: &Path,
    options: &PostprocessOptions,
) -> Result<PathBuf, PostprocessError> {
    if !sdist_path.is_file() {
        return Err(PostprocessError::NotFound(format!(
            "The source distribution {} does not exist or is not a file",
            sdist_path.display()
        )));
    }
    let output_path = output_path(sdist_path, options.output_dir.as_deref())?;

    let scratch = tempfile::Builder::new()
        .prefix("postprocess-sdist-")
        .tempdir()?;
    debug!(
        "Extracting {} to {}",
        sdist_path.display(),
        scratch.path().display()
    );
    unpack(sdist_path, scratch.path())?;

    let package_dir = single_top_level_dir(scratch.path())?;
    let setup_py = package_dir.join(SETUP_PY);
    if !setup_py.is_file() {
        return Err(PostprocessError::NotFound(format!(
            "The source distribution {} has no {SETUP_PY} in {}",
            sdist_path.display(),
            package_dir
                .file_name()
                .unwrap_or(package_dir.as_os_str())
                .to_string_lossy()
        )));
    }
    let source = fs::read_to_string(&setup_py)?;
    let patched = set_optional_true(&source).map_err(|source| PostprocessError::Patch {
        path: setup_py.clone(),
        source,
    })?;
    fs::write(&setup_py, patched)?;

    if let Some(output_dir) = output_path.parent() {
        prepare_output_dir(output_dir, options.create_output_dir)?;
    }
    let archive = pack(scratch.path())?;
    write_archive(&output_path, &archive, options.overwrite)?;
    info!(
        "Wrote {} ({} bytes)",
        output_path.display(),
        archive.len()
    );
    Ok(output_path)
}

/// `<output_dir>/<file name>`, where the output dir defaults to `postprocessed` next to
/// the input archive
fn output_path(sdist_path: &Path, output_dir: Option<&Path>) -> Result<PathBuf, PostprocessError> {
    let file_name = sdist_path.file_name().ok_or_else(|| {
        PostprocessError::NotFound(format!(
            "The source distribution path {} has no file name",
            sdist_path.display()
        ))
    })?;
    let output_dir = match output_dir {
        Some(output_dir) => output_dir.to_path_buf(),
        None => sdist_path
            .parent()
            .unwrap_or(Path::new(""))
            .join(DEFAULT_OUTPUT_DIR),
    };
    Ok(output_dir.join(file_name))
}

fn unpack(sdist_path: &Path, target: &Path) -> Result<(), PostprocessError> {
    let extract_error = |source: io::Error| PostprocessError::Extract {
        path: sdist_path.to_path_buf(),
        source,
    };
    let file = File::open(sdist_path)?;
    let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);
    archive.unpack(target).map_err(extract_error)
}

/// Source distributions contain exactly one directory, `<name>-<version>`
fn single_top_level_dir(root: &Path) -> Result<PathBuf, PostprocessError> {
    let entries = fs::read_dir(root)?.collect::<Result<Vec<_>, _>>()?;
    match entries.as_slice() {
        [entry] => {
            if entry.file_type()?.is_dir() {
                Ok(entry.path())
            } else {
                Err(PostprocessError::Structure(format!(
                    "Expected the top-level entry {} of the source distribution to be a directory",
                    entry.file_name().to_string_lossy()
                )))
            }
        }
        entries => Err(PostprocessError::Structure(format!(
            "Expected exactly one top-level entry in the source distribution, found {}",
            entries.len()
        ))),
    }
}

fn prepare_output_dir(output_dir: &Path, create: bool) -> Result<(), PostprocessError> {
    // `Path::new("")` is the current directory
    if output_dir.as_os_str().is_empty() || output_dir.is_dir() {
        return Ok(());
    }
    if output_dir.exists() {
        return Err(PostprocessError::Structure(format!(
            "The output directory {} is not a directory",
            output_dir.display()
        )));
    }
    if !create {
        return Err(PostprocessError::NotFound(format!(
            "The output directory {} does not exist, use --create-output-dir to create it",
            output_dir.display()
        )));
    }
    debug!("Creating output directory {}", output_dir.display());
    fs::create_dir_all(output_dir)?;
    Ok(())
}

/// Packs everything below `root` into an in-memory `.tar.gz`, with paths relative to `root`.
///
/// Entries are added in sorted order with their metadata, symlinks are kept as symlinks.
fn pack(root: &Path) -> Result<Vec<u8>, PostprocessError> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut tar = tar::Builder::new(encoder);
    tar.follow_symlinks(false);
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        let name = entry
            .path()
            .strip_prefix(root)
            .map_err(io::Error::other)?;
        debug!("Adding {}", name.display());
        tar.append_path_with_name(entry.path(), name)?;
    }
    let encoder = tar.into_inner()?;
    Ok(encoder.finish()?)
}

fn write_archive(path: &Path, archive: &[u8], overwrite: bool) -> Result<(), PostprocessError> {
    let file = if overwrite {
        File::create(path)
    } else {
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
    };
    let mut file = file.map_err(|err| match err.kind() {
        io::ErrorKind::AlreadyExists => PostprocessError::AlreadyExists(path.to_path_buf()),
        _ => PostprocessError::Io(err),
    })?;
    file.write_all(archive)?;
    Ok(())
}
