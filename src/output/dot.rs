use petgraph::{algo, graph::NodeIndex};
use std::{
    io,
    io::Write as _, // to get write_fmt, granting writeln!
};

use crate::depth::DepthTable;
use crate::state::State;
use crate::output::escaper::Escaper;





impl State
{
    /// Graphviz rendering of the whole graph. Unknown callees become dashed
    /// `?` nodes; every recursion is boxed in its own cluster.
    pub fn output_dot(&self, depths: &DepthTable, mut writer: impl io::Write, dc: DotConf) -> io::Result<()>
    {
        writeln!(writer, "digraph {{")?;
        writeln!(writer, "    node [fontname={} shape=box]", &dc.font)?;

        for idx in self.g.node_indices() {
            let node = &self.g[idx];

            write!(writer, "    {} [label=\"", idx.index())?;

            let mut esc = Escaper::new(&mut writer);
            write!(esc, "{}", node.name)?;

            if let Some(depth) = depths.get(idx) {
                write!(writer, "\\nmax = {}", depth.max)?;
            }

            write!(writer, "\\nlocal = {}\"", node.local)?;

            writeln!(writer, "]")?;
        }

        for edge in self.g.raw_edges() {
            writeln!(
                writer,
                "    {} -> {}",
                edge.source().index(),
                edge.target().index()
            )?;
        }

        for idx in self.g.node_indices() {
            for (i, callee) in self.g[idx].unresolved.iter().enumerate() {
                let id = format!("u{}_{}", idx.index(), i);
                write!(writer, "    {} [label=\"? ", id)?;
                write!(Escaper::new(&mut writer), "{}", callee)?;
                writeln!(writer, "\" style=dashed]")?;
                writeln!(writer, "    {} -> {} [style=dashed]", idx.index(), id)?;
            }
        }

        for (i, cycle) in self.cycles().iter().enumerate() {
            writeln!(writer, "\n    subgraph cluster_{} {{", i)?;
            writeln!(writer, "        style=dashed")?;
            writeln!(writer, "        fontname={}", &dc.font)?;
            writeln!(writer, "        label=\"SCC{}\"", i)?;

            for node in cycle {
                writeln!(writer, "        {}", node.index())?;
            }

            writeln!(writer, "    }}")?;
        }

        writeln!(writer, "}}")?;

        Ok(())
    }

    /// Strongly connected components that really recurse: more than one
    /// member, or a single function calling itself. Sorted for stable output.
    pub fn cycles(&self) -> Vec<Vec<NodeIndex>>
    {
        let mut cycles: Vec<Vec<NodeIndex>> = algo::kosaraju_scc(&self.g)
            .into_iter()
            .filter(|scc| scc.len() > 1 || self.g.contains_edge(scc[0], scc[0]))
            .map(|mut scc| { scc.sort(); scc })
            .collect();
        cycles.sort();
        cycles
    }
}



pub struct DotConf
{
    pub font: String,
}

impl DotConf
{
    pub fn default() -> Self
    {
        DotConf
        {
            font: "monospace".to_string(),
        }
    }
}
