use std::path::PathBuf;

/// Where and how the post-processed source distributions are written
#[derive(Debug, Default, Clone, PartialEq, Eq, clap::Parser)]
pub struct PostprocessOptions {
    /// Directory in which to place the post-processed archives
    /// (default: directory named `postprocessed` next to each input sdist)
    #[arg(short = 'O', long, env = "POSTPROCESS_SDIST_OUTPUT_DIR", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,
    /// Create the output directory (and its parents) if it does not exist
    #[arg(short = 'C', long)]
    pub create_output_dir: bool,
    /// Overwrite existing files in the output directory
    #[arg(short = 'f', long = "force")]
    pub overwrite: bool,
}
