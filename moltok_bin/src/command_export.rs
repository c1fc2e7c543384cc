use anyhow::{Context, Result};
use moltok::prelude::*;

use super::ExportArgs;

pub(super) fn command_export(args: ExportArgs) -> Result<()> {
    let sampler = FrameSampler::new(args.stride)?;
    let bridge = BridgeConfig {
        program: args.cpptraj,
        ..Default::default()
    };

    // Holds the converted trajectory until export is finished
    let workdir = workdir()?;
    let traj = load_trajectory(&args.topology, &args.trajectory, &bridge, &workdir)
        .with_context(|| format!("loading trajectory '{}'", args.trajectory.display()))?;

    export_frames(&traj, &sampler, args.format, &args.out_dir, args.limit)
        .with_context(|| format!("exporting to '{}'", args.out_dir.display()))?;
    Ok(())
}
