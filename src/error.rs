use rustpython_parser::text_size::TextSize;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The source is not valid python
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (line {line}, column {column})")]
pub struct ParseError {
    /// What is wrong, as reported by the python parser
    pub message: String,
    /// 1-based line of the error
    pub line: usize,
    /// 1-based column of the error, in characters
    pub column: usize,
}

impl ParseError {
    /// Locates the byte `offset` reported by the parser in `source`
    pub(crate) fn at(source: &str, message: String, offset: TextSize) -> Self {
        let offset = usize::from(offset).min(source.len());
        let before = source.get(..offset).unwrap_or(source);
        let line_start = before.rfind('\n').map_or(0, |index| index + 1);
        Self {
            message,
            line: before.matches('\n').count() + 1,
            column: before[line_start..].chars().count() + 1,
        }
    }
}

/// Error type for rewriting the `setup.py` of a source distribution
#[derive(Debug, Error)]
pub enum PatchError {
    /// The script is not valid python
    #[error("setup.py is not valid python")]
    Parse(#[from] ParseError),
    /// A call or argument the rewrite needs is missing
    #[error("{0}")]
    NotFound(String),
    /// The call or argument exists, but has an unexpected shape
    #[error("{0}")]
    Structure(String),
}

/// Error type for post-processing a source distribution
///
/// [PostprocessError::AlreadyExists] is kept apart from the other variants so callers can
/// retry with `overwrite` or a different output directory.
#[derive(Debug, Error)]
pub enum PostprocessError {
    /// Rewriting `setup.py` failed
    #[error("Failed to make the Rust extensions in {} optional", path.display())]
    Patch {
        /// The extracted `setup.py`
        path: PathBuf,
        /// Why the rewrite failed
        #[source]
        source: PatchError,
    },
    /// A file or directory is missing
    #[error("{0}")]
    NotFound(String),
    /// The archive or output location is laid out differently than expected
    #[error("{0}")]
    Structure(String),
    /// The output archive exists and overwriting wasn't requested
    #[error("{} already exists, use --force to overwrite it", .0.display())]
    AlreadyExists(PathBuf),
    /// Reading or unpacking the input archive failed
    #[error("Failed to extract the source distribution {}", path.display())]
    Extract {
        /// The input archive
        path: PathBuf,
        /// The underlying error from the tar or gzip reader
        #[source]
        source: io::Error,
    },
    /// Any other IO error
    #[error(transparent)]
    Io(#[from] io::Error),
}
