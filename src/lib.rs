#![doc = include_str!("../README.md")]

pub mod builder;
pub mod composition;
pub mod core;
pub mod io;
pub mod mesh;
pub mod placement;
pub mod protein;
pub mod topography;

pub mod prelude {
    pub use crate::builder::*;
    pub use crate::composition::*;
    pub use crate::core::*;
    pub use crate::io::*;
    pub use crate::mesh::*;
    pub use crate::placement::*;
    pub use crate::protein::*;
    pub use crate::topography::*;
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn greeting(tool: &str) {
    use comfy_table::modifiers::UTF8_ROUND_CORNERS;
    use comfy_table::presets::UTF8_FULL;
    use comfy_table::{Attribute, Cell, Table};

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .add_row(vec![
            Cell::new("AMX - membrane builder").add_attributes(vec![Attribute::Bold])
        ])
        .add_row(vec![env!("CARGO_PKG_AUTHORS")])
        .add_row(vec![format!("AMX version: {}", VERSION)])
        .add_row(vec![format!("Tool: {tool}")]);
    println!("{table}");
}
