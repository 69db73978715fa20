//! Everything that turns a resolved graph into text.

mod dot;     pub use dot::DotConf;
mod escaper; pub use escaper::*;
mod top;
pub mod tree; pub use tree::{tree, TreeConf, TreeLine, TreeLines};

#[derive( PartialEq, Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Indented call tree per root.
    Tree,
    /// Every function ranked by cumulative usage.
    Top,
    /// Graphviz.
    Dot,
}
