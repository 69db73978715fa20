//! Worst-case cumulative stack depth.
//!
//! Functions are grouped into strongly connected components. Components are
//! resolved callees-first, so every call leaving a component already has its
//! final figure. Inside a component that recurses, the depth of a member is
//! the longest path that never returns to a function already on it: that
//! closing call contributes nothing, every member is flagged `recursive`, and
//! the figure becomes a lower bound. The result for a function does not
//! depend on where the walk came from, so it is memoized across roots.
//!
//! Both walks keep their own frame stack so a long call chain in the listing
//! cannot overflow ours.

use std::fmt;

use log::{debug, trace};
use petgraph::algo;
use petgraph::graph::NodeIndex;

use crate as c;
use crate::state::State;
use crate::Max;


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Depth
{
    pub max:       Max,
    /// Part of a call cycle; `max` is then at best a lower bound.
    pub recursive: bool,
}

impl Depth
{
    pub fn bytes(&self) -> u64
    {
        self.max.bytes()
    }
}

impl fmt::Display for Depth
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        write!(f, "{}", self.max)?;
        if self.recursive
        {
            f.write_str(" (recursive)")?;
        }
        Ok(())
    }
}

/// One component on the resolve stack.
struct Unit
{
    comp:  usize,
    /// Callees outside the component.
    exits: Vec<NodeIndex>,
    next:  usize,
}

/// One function on a path inside its component.
struct Step
{
    node:    NodeIndex,
    /// Callees inside the same component.
    inner:   Vec<NodeIndex>,
    next:    usize,
    deepest: Option<Max>,
}

impl Step
{
    fn absorb(&mut self, m: Max)
    {
        self.deepest = Some(match self.deepest
        {
            Some(d) => c::max(d, m),
            None    => m,
        });
    }
}

/// Memo table; one per [`State`].
#[derive(Clone, Debug)]
pub struct DepthTable
{
    comp_of: Vec<usize>,
    members: Vec<Vec<NodeIndex>>,
    cyclic:  Vec<bool>,
    depths:  Vec<Option<Depth>>,
}

impl DepthTable
{
    pub fn new(state: &State) -> Self
    {
        let n = state.g.node_count();
        let mut comp_of = vec![0; n];
        let mut members = vec![];
        let mut cyclic  = vec![];

        for mut scc in algo::kosaraju_scc(&state.g)
        {
            scc.sort();
            for node in &scc
            {
                comp_of[node.index()] = members.len();
            }
            cyclic.push(scc.len() > 1 || state.g.contains_edge(scc[0], scc[0]));
            members.push(scc);
        }

        DepthTable
        {
            comp_of,
            members,
            cyclic,
            depths: vec![None; n],
        }
    }

    pub fn get(&self, node: NodeIndex) -> Option<Depth>
    {
        self.depths.get(node.index()).copied().flatten()
    }

    /// Resolve every node in address order.
    pub fn resolve_all(&mut self, state: &State)
    {
        for node in state.nodes()
        {
            self.resolve(state, node);
        }
    }

    pub fn resolve(&mut self, state: &State, root: NodeIndex) -> Depth
    {
        if let Some(d) = self.get(root)
        {
            return d;
        }

        // Components form a DAG: an unresolved callee is never on the stack.
        let mut stack: Vec<Unit> = vec![self.unit(state, self.comp_of[root.index()])];

        while let Some(top) = stack.last_mut()
        {
            if let Some(&callee) = top.exits.get(top.next)
            {
                top.next += 1;
                if self.get(callee).is_none()
                {
                    let unit = self.unit(state, self.comp_of[callee.index()]);
                    stack.push(unit);
                }
                continue;
            }

            // all exits done
            let comp = top.comp;
            stack.pop();
            self.finish(state, comp);
        }

        match self.get(root)
        {
            Some(d) => d,
            None    => unreachable!("the root's component is resolved last"),
        }
    }

    /// Depth of `node` when the functions marked in `on_path` are already
    /// further up the call path. Calls back into those count as recursion.
    ///
    /// Equal to [`DepthTable::get`] unless the path runs through the same
    /// cycle as `node`. `on_path` is left as it was found.
    pub fn along_path(&self, state: &State, node: NodeIndex, on_path: &mut [bool]) -> Option<Depth>
    {
        let memo = self.get(node)?;
        let comp = self.comp_of[node.index()];
        if !self.cyclic[comp] || !self.members[comp].iter().any(|m| on_path[m.index()])
        {
            return Some(memo);
        }
        Some(Depth { max: self.longest(state, node, on_path), recursive: true })
    }

    fn unit(&self, state: &State, comp: usize) -> Unit
    {
        let exits = self.members[comp]
            .iter()
            .flat_map(|&m| state.callees(m))
            .filter(|callee| self.comp_of[callee.index()] != comp)
            .collect();
        Unit { comp, exits, next: 0 }
    }

    fn finish(&mut self, state: &State, comp: usize)
    {
        let recursive = self.cyclic[comp];
        if recursive
        {
            debug!(
                "cycle: {}",
                self.members[comp]
                    .iter()
                    .map(|&m| format!("`{}`", state.g[m].name))
                    .collect::<Vec<_>>()
                    .join(" ")
            );
        }

        let mut on_path = vec![false; state.g.node_count()];
        let found: Vec<(NodeIndex, Depth)> = self.members[comp]
            .iter()
            .map(|&node| (node, Depth { max: self.longest(state, node, &mut on_path), recursive }))
            .collect();

        for (node, depth) in found
        {
            trace!("`{}`: local {} cumulative {}", state.g[node].name, state.g[node].local, depth);
            self.depths[node.index()] = Some(depth);
        }
    }

    fn step(&self, state: &State, node: NodeIndex) -> Step
    {
        let comp = self.comp_of[node.index()];
        let mut step = Step { node, inner: vec![], next: 0, deepest: None };

        for callee in state.callees(node)
        {
            if self.comp_of[callee.index()] == comp
            {
                step.inner.push(callee);
            }
            else
            {
                // resolved before this component
                let max = self.get(callee).map_or(Max::LowerBound(0), |d| d.max);
                step.absorb(max);
            }
        }
        if !state.g[node].unresolved.is_empty()
        {
            // unknown callees add nothing we can measure
            step.absorb(Max::LowerBound(0));
        }
        step
    }

    /// Longest path from `start` inside its component that avoids `on_path`.
    fn longest(&self, state: &State, start: NodeIndex, on_path: &mut [bool]) -> Max
    {
        on_path[start.index()] = true;
        let mut stack: Vec<Step> = vec![self.step(state, start)];

        loop
        {
            let top = stack.len() - 1;

            if let Some(&callee) = stack[top].inner.get(stack[top].next)
            {
                stack[top].next += 1;
                if on_path[callee.index()]
                {
                    stack[top].absorb(Max::LowerBound(0));
                }
                else
                {
                    on_path[callee.index()] = true;
                    let step = self.step(state, callee);
                    stack.push(step);
                }
                continue;
            }

            let step = match stack.pop()
            {
                Some(step) => step,
                None       => unreachable!("the start step is popped last"),
            };
            on_path[step.node.index()] = false;

            let local = state.g[step.node].local;
            let max = match step.deepest
            {
                Some(deepest) => deepest + local,
                None          => Max::Exact(local),
            };

            match stack.last_mut()
            {
                Some(parent) => parent.absorb(max),
                None         => return max,
            }
        }
    }
}
