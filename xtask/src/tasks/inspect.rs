use std::path::PathBuf;

use anyhow::Result;
use burn::config::Config;
use burn_hierarchy::LabelMapConfig;
use clap::Args;

#[derive(Args)]
pub struct InspectArgs {
    /// Label map configuration (JSON)
    pub labelmap: PathBuf,
}

pub fn run(args: &InspectArgs) -> Result<()> {
    let config = LabelMapConfig::load(&args.labelmap).map_err(|e| {
        anyhow::anyhow!(
            "Failed to read label map {}: {:?}",
            args.labelmap.display(),
            e
        )
    })?;
    let labelmap = config.init()?;

    tracing::info!(
        "{} levels, {} classes in total",
        labelmap.num_levels(),
        labelmap.n_classes()
    );

    for (level, (name, range)) in labelmap
        .level_names()
        .iter()
        .zip(labelmap.level_ranges())
        .enumerate()
    {
        tracing::info!(
            "Level {} ({}): {} classes, flat range {:?}",
            level,
            name,
            labelmap.levels()[level],
            range
        );
    }

    Ok(())
}
