#![doc = include_str!("../../README.md")]

pub mod bridge;
pub mod config;
pub mod core;
pub mod encoder;
pub mod export;
pub mod io;
pub mod normalize;
pub mod pipeline;
pub mod query;
pub mod sampler;

pub mod prelude {
    pub use crate::bridge::*;
    pub use crate::config::*;
    pub use crate::core::*;
    pub use crate::encoder::*;
    pub use crate::export::*;
    pub use crate::io::*;
    pub use crate::normalize::*;
    pub use crate::pipeline::*;
    pub use crate::query::*;
    pub use crate::sampler::*;
}

pub fn greeting(tool: &str) {
    use comfy_table::modifiers::UTF8_ROUND_CORNERS;
    use comfy_table::presets::UTF8_FULL;
    use comfy_table::{Attribute, Cell, Table};

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .add_row(vec![
            Cell::new("MolTok - structure tokens of MD trajectories").add_attributes(vec![Attribute::Bold])
        ])
        .add_row(vec![env!("CARGO_PKG_AUTHORS")])
        .add_row(vec![format!("MolTok version: {}", env!("CARGO_PKG_VERSION"))])
        .add_row(vec![format!("Tool: {tool}")]);
    println!("{table}");
}
