//! Indented call tree below one root.
//!
//! ```text
//!    cum  loc  function
//!     12    2  main
//!     10    4    foo
//!      6    6      bar
//! ```

use std::fmt;

use petgraph::graph::NodeIndex;

use crate::depth::{Depth, DepthTable};
use crate::state::State;
use crate::Max;


pub struct TreeConf
{
    /// Branches deeper than this end in a "nested too deeply" line.
    pub max_depth:       Option<usize>,
    /// Emit a line for each call the listing could not resolve.
    pub show_unresolved: bool,
}

impl TreeConf
{
    pub fn default() -> Self
    {
        TreeConf
        {
            max_depth:       None,
            show_unresolved: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreeLine
{
    Call
    {
        depth:      usize,
        name:       String,
        local:      u64,
        cumulative: Max,
        recursive:  bool,
    },
    /// The function is already one of its own ancestors here.
    Recursive { depth: usize, name: String },
    Unknown { depth: usize, callee: String },
    TooDeep { depth: usize, name: String },
}

impl TreeLine
{
    pub fn depth(&self) -> usize
    {
        match *self
        {
            TreeLine::Call { depth, .. }
            | TreeLine::Recursive { depth, .. }
            | TreeLine::Unknown { depth, .. }
            | TreeLine::TooDeep { depth, .. } => depth,
        }
    }
}

pub const HEADER: &str = "   cum  loc  function";

impl fmt::Display for TreeLine
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        let indent = "  ".repeat(self.depth());
        match self
        {
            TreeLine::Call { name, local, cumulative, recursive, .. } =>
            {
                write!(f, "{:>6} {:>4}  {}{}", cumulative, local, indent, name)?;
                if *recursive
                {
                    f.write_str(" (recursive)")?;
                }
                Ok(())
            },
            TreeLine::Recursive { name, .. } =>
                write!(f, "{:>6} {:>4}  {}{} !!! recursive call", "", "", indent, name),
            TreeLine::Unknown { callee, .. } =>
                write!(f, "{:>6} {:>4}  {}? {} !!! unknown callee", "", "", indent, callee),
            TreeLine::TooDeep { name, .. } =>
                write!(f, "{:>6} {:>4}  {}{} !!! nested too deeply", "", "", indent, name),
        }
    }
}


#[derive(Clone, Debug)]
enum Work
{
    Enter(NodeIndex, usize),
    Unknown(String, usize),
    Leave(NodeIndex),
}

/// Lazy depth-first walk. Cloning restarts from the clone's position, and
/// [`tree`] can be called again for a fresh walk.
#[derive(Clone)]
pub struct TreeLines<'a>
{
    state:   &'a State,
    depths:  &'a DepthTable,
    conf:    &'a TreeConf,
    work:    Vec<Work>,
    on_path: Vec<bool>,
}

/// Render the tree below `root`. Nodes missing from `depths` show their own
/// local cost as a lower bound; resolve `root` first to get real figures.
pub fn tree<'a>(
    state:  &'a State,
    depths: &'a DepthTable,
    root:   NodeIndex,
    conf:   &'a TreeConf,
) -> TreeLines<'a>
{
    TreeLines
    {
        state,
        depths,
        conf,
        work:    vec![Work::Enter(root, 0)],
        on_path: vec![false; state.g.node_count()],
    }
}

impl<'a> TreeLines<'a>
{
    fn enter(&mut self, node: NodeIndex, depth: usize) -> TreeLine
    {
        let state = self.state;
        let n = &state.g[node];

        if self.on_path[node.index()]
        {
            return TreeLine::Recursive { depth, name: n.name.clone() };
        }
        if self.conf.max_depth.map_or(false, |max| depth > max)
        {
            return TreeLine::TooDeep { depth, name: n.name.clone() };
        }

        // inside a cycle the figure depends on which members are above
        let Depth { max, recursive } = self.depths
            .along_path(state, node, &mut self.on_path)
            .unwrap_or(Depth { max: Max::LowerBound(n.local), recursive: false });

        self.on_path[node.index()] = true;
        self.work.push(Work::Leave(node));

        // pushed in reverse so they pop in call-site order
        if self.conf.show_unresolved
        {
            for callee in n.unresolved.iter().rev()
            {
                self.work.push(Work::Unknown(callee.to_string(), depth + 1));
            }
        }
        for callee in state.callees(node).into_iter().rev()
        {
            self.work.push(Work::Enter(callee, depth + 1));
        }

        TreeLine::Call
        {
            depth,
            name:       n.name.clone(),
            local:      n.local,
            cumulative: max,
            recursive,
        }
    }
}

impl<'a> Iterator for TreeLines<'a>
{
    type Item = TreeLine;

    fn next(&mut self) -> Option<TreeLine>
    {
        while let Some(work) = self.work.pop()
        {
            match work
            {
                Work::Enter(node, depth)    => return Some(self.enter(node, depth)),
                Work::Unknown(callee, depth) => return Some(TreeLine::Unknown { depth, callee }),
                Work::Leave(node)           => self.on_path[node.index()] = false,
            }
        }
        None
    }
}
