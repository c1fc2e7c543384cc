use anyhow::{Context, Result};
use log::info;
use moltok::prelude::*;

use super::TokenizeArgs;

pub(super) fn command_tokenize(args: TokenizeArgs) -> Result<()> {
    let mut cfg = match &args.config {
        Some(file) => {
            info!("Reading config from '{}'", file.display());
            PipelineConfig::from_file(file)
                .with_context(|| format!("loading config '{}'", file.display()))?
        }
        None => PipelineConfig::default(),
    };

    // Command line takes precedence over the config file
    if let Some(p) = args.topology {
        cfg.topology = p;
    }
    if let Some(p) = args.trajectory {
        cfg.trajectory = p;
    }
    if let Some(p) = args.token_map {
        cfg.token_map = p;
    }
    if let Some(s) = args.stride {
        cfg.stride = s;
    }
    if let Some(w) = args.workers {
        cfg.workers = w;
    }
    if let Some(d) = args.pdb_output_dir {
        cfg.pdb_output_dir = Some(d);
    }
    cfg.validate_for_run()?;

    let client = ForgeClient::from_config(&cfg.encoder)
        .with_context(|| format!("creating client for {}", cfg.encoder.url))?;
    info!("Encoding service: {}", client.endpoint());

    let report = Pipeline::new(&cfg, &client)
        .run()
        .context("tokenization failed")?;

    println!("{}", report.to_table());
    info!(
        "Tokens of {} frames written to '{}'",
        report.encoded.len(),
        report.token_map.display()
    );
    Ok(())
}
