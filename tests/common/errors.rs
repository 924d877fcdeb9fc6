use super::{SETUP_PY_WITHOUT_OPTIONAL, mypkg_members, write_sdist};
use anyhow::{Result, bail};
use indoc::indoc;
use postprocess_sdist::{PatchError, PostprocessError, PostprocessOptions, postprocess_sdist};
use std::error::Error as _;
use tempfile::TempDir;

/// A `setup.py` with two `setup()` calls is rejected and nothing is written
pub fn two_setup_calls() -> Result<()> {
    let tmp_dir = TempDir::new()?;
    let sdist_path = tmp_dir.path().join("mypkg-0.1.0.tar.gz");
    let setup_py = indoc! {r#"
        from setuptools import setup
        from setuptools_rust import RustExtension

        setup(name="mypkg", rust_extensions=[RustExtension("mypkg.a")])
        setup(name="mypkg", rust_extensions=[RustExtension("mypkg.b")])
    "#};
    write_sdist(&sdist_path, &mypkg_members(setup_py))?;
    let output_dir = tmp_dir.path().join("out");

    let options = PostprocessOptions {
        output_dir: Some(output_dir.clone()),
        create_output_dir: true,
        overwrite: true,
    };
    match postprocess_sdist(&sdist_path, &options) {
        Err(err @ PostprocessError::Patch { .. }) => {
            assert!(err.to_string().starts_with("Failed to make the Rust extensions in "));
            let source = err.source().map(ToString::to_string);
            assert_eq!(
                source.as_deref(),
                Some("Expected exactly one top-level `setup(...)` call, found 2")
            );
            if let PostprocessError::Patch { source, .. } = err {
                assert!(matches!(source, PatchError::Structure(_)));
            }
        }
        other => bail!("Should have errored, got {other:?}"),
    }
    assert!(!output_dir.exists());
    Ok(())
}

/// A `setup.py` that isn't python is a parse error
pub fn invalid_python() -> Result<()> {
    let tmp_dir = TempDir::new()?;
    let sdist_path = tmp_dir.path().join("mypkg-0.1.0.tar.gz");
    write_sdist(&sdist_path, &mypkg_members("setup(\n    name='mypkg',\n"))?;

    let options = PostprocessOptions {
        create_output_dir: true,
        ..Default::default()
    };
    match postprocess_sdist(&sdist_path, &options) {
        Err(PostprocessError::Patch {
            source: PatchError::Parse(err),
            path,
        }) => {
            assert!(path.ends_with("mypkg-0.1.0/setup.py"), "{}", path.display());
            assert!(!err.message.is_empty());
        }
        other => bail!("Should have errored, got {other:?}"),
    }
    Ok(())
}

/// Without `create_output_dir`, a missing output directory is an error
pub fn missing_output_dir() -> Result<()> {
    let tmp_dir = TempDir::new()?;
    let sdist_path = tmp_dir.path().join("mypkg-0.1.0.tar.gz");
    write_sdist(&sdist_path, &mypkg_members(SETUP_PY_WITHOUT_OPTIONAL))?;

    match postprocess_sdist(&sdist_path, &PostprocessOptions::default()) {
        Err(PostprocessError::NotFound(message)) => assert!(
            message.ends_with("does not exist, use --create-output-dir to create it"),
            "{message}"
        ),
        other => bail!("Should have errored, got {other:?}"),
    }
    Ok(())
}

/// The input must be an existing file
pub fn missing_sdist() -> Result<()> {
    let tmp_dir = TempDir::new()?;
    for sdist_path in [tmp_dir.path().join("missing.tar.gz"), tmp_dir.path().to_path_buf()] {
        match postprocess_sdist(&sdist_path, &PostprocessOptions::default()) {
            Err(PostprocessError::NotFound(_)) => {}
            other => bail!("Should have errored, got {other:?}"),
        }
    }
    Ok(())
}

/// Something that isn't a gzipped tarball can't be extracted
pub fn not_a_tarball() -> Result<()> {
    let tmp_dir = TempDir::new()?;
    let sdist_path = tmp_dir.path().join("mypkg-0.1.0.tar.gz");
    fs_err::write(&sdist_path, "not a tarball")?;

    match postprocess_sdist(&sdist_path, &PostprocessOptions::default()) {
        Err(PostprocessError::Extract { path, .. }) => assert_eq!(path, sdist_path),
        other => bail!("Should have errored, got {other:?}"),
    }
    Ok(())
}
