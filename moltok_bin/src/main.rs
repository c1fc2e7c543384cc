use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod command_export;
mod command_query;
mod command_serve;
mod command_tokenize;

use command_export::command_export;
use command_query::command_query;
use command_serve::command_serve;
use command_tokenize::command_tokenize;

/// MolTok binary utility
#[derive(Parser)]
#[command(name = "moltok")]
#[command(version, about, long_about = None)]
struct Cmd {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Tokenize sampled frames of a trajectory
    Tokenize(TokenizeArgs),
    /// Write sampled frames as structure files for the viewer
    Export(ExportArgs),
    /// Print tokens of one frame with global token extrema
    Query {
        /// Token map file
        #[arg(short, long, default_value = "tokens.json")]
        token_map: PathBuf,
        /// Frame index
        frame: usize,
    },
    /// Serve structure files and tokens over HTTP
    Serve {
        /// Token map file
        #[arg(short, long, default_value = "tokens.json")]
        token_map: PathBuf,
        /// Directory with .xyz and .pdb files
        #[arg(short, long, default_value = "xyz")]
        structures: PathBuf,
        /// Directory with index.html and static/ of the web viewer
        #[arg(long)]
        web: Option<PathBuf>,
        /// Listen address
        #[arg(short, long, default_value = "127.0.0.1:5000")]
        addr: String,
    },
}

#[derive(Args)]
struct TokenizeArgs {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Topology file (parm7, prmtop or pdb)
    #[arg(short = 'p', long)]
    topology: Option<PathBuf>,
    /// Trajectory file
    #[arg(short = 'f', long)]
    trajectory: Option<PathBuf>,
    /// Output token map
    #[arg(short, long)]
    token_map: Option<PathBuf>,
    /// Take every n-th frame
    #[arg(short, long)]
    stride: Option<usize>,
    /// Number of frames processed in parallel
    #[arg(short, long)]
    workers: Option<usize>,
    /// Keep corrected structures of frames in this directory
    #[arg(long)]
    pdb_output_dir: Option<PathBuf>,
}

#[derive(Args)]
struct ExportArgs {
    /// Topology file (parm7, prmtop or pdb)
    #[arg(short = 'p', long)]
    topology: PathBuf,
    /// Trajectory file
    #[arg(short = 'f', long)]
    trajectory: PathBuf,
    /// Output directory
    #[arg(short, long, default_value = "xyz")]
    out_dir: PathBuf,
    /// Output format: xyz, pdb or dcd
    #[arg(long, default_value = "xyz")]
    format: moltok::export::ExportFormat,
    /// Take every n-th frame
    #[arg(short, long, default_value_t = moltok::config::DEFAULT_STRIDE)]
    stride: usize,
    /// Maximal number of exported frames
    #[arg(short = 'n', long)]
    limit: Option<usize>,
    /// Conversion program for trajectories which are not read directly
    #[arg(long, default_value = "cpptraj")]
    cpptraj: String,
}

fn main() -> Result<()> {
    env_logger::builder()
        .format_timestamp(None)
        .format_indent(Some(8))
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cmd = Cmd::parse();

    match cmd.command {
        Commands::Tokenize(args) => {
            moltok::greeting("tokenize");
            println!("▶ Action: tokenize");
            command_tokenize(args)?;
        }
        Commands::Export(args) => {
            moltok::greeting("export");
            println!("▶ Action: export");
            command_export(args)?;
        }
        Commands::Query { token_map, frame } => {
            command_query(&token_map, frame)?;
        }
        Commands::Serve {
            token_map,
            structures,
            web,
            addr,
        } => {
            moltok::greeting("serve");
            println!("▶ Action: serve");
            command_serve(&token_map, &structures, web.as_deref(), &addr)?;
        }
    }

    Ok(())
}
