use std::path::PathBuf;

use anyhow::{Context, Result};
use burn_hierarchy::convert::transform_file;
use clap::Args;

#[derive(Args)]
pub struct TransformDataArgs {
    /// JSON file holding a nested array
    pub input: PathBuf,

    /// Destination of the .npy dump
    pub output: PathBuf,
}

pub fn run(args: &TransformDataArgs) -> Result<()> {
    let array = transform_file(&args.input, &args.output).with_context(|| {
        format!(
            "Failed to convert {} into {}",
            args.input.display(),
            args.output.display()
        )
    })?;

    tracing::info!(
        "Saved {} array with shape {:?} to {}",
        array.dtype(),
        array.shape(),
        args.output.display()
    );

    Ok(())
}
