//! Post-processes python source distributions built with setuptools-rust so that their Rust
//! extensions are optional.
//!
//! An extension declared with `optional=True` no longer aborts `pip install` when it fails to
//! compile, the package then installs without it. [postprocess_sdist] unpacks a `.tar.gz`
//! sdist, rewrites the `rust_extensions` of the `setup()` call in its `setup.py` with
//! [set_optional_true] and packs the result into a new archive. The script is parsed with
//! the RustPython parser and only the byte ranges of the `optional` values (or the insertion
//! points of the new arguments) are rewritten, so formatting and comments survive unchanged.

#![deny(missing_docs)]

pub use crate::error::{ParseError, PatchError, PostprocessError};
pub use crate::options::PostprocessOptions;
pub use crate::patch::set_optional_true;
pub use crate::sdist::{BatchReport, DEFAULT_OUTPUT_DIR, postprocess_sdist, postprocess_sdists};

mod error;
mod options;
mod patch;
mod sdist;
