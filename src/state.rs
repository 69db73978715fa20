/*      ███████╗████████╗ █████╗ ████████╗███████╗       */
/*      ██╔════╝╚══██╔══╝██╔══██╗╚══██╔══╝██╔════╝       */
/*      ███████╗   ██║   ███████║   ██║   █████╗         */
/*      ╚════██║   ██║   ██╔══██║   ██║   ██╔══╝         */
/*      ███████║   ██║   ██║  ██║   ██║   ███████╗       */
/*      ╚══════╝   ╚═╝   ╚═╝  ╚═╝   ╚═╝   ╚══════╝       */
/*     ███████████████████████████████████████████╗      */
/*     ╚══════════════════════════════════════════╝      */

use crate as c; // lss-call-stack
use crate::calls::{self, Callee};
use crate::frame;
use crate::insn::Dest;
use crate::listing::{self, Function, ParseWarning};
use crate::Target;

use std::collections::{
    BTreeMap,
    HashSet,
};
use petgraph::{
    graph::{DiGraph, NodeIndex},
    Graph,
};
use thiserror::Error;

use log::{info, warn, trace};


/// Inconsistencies found while building the graph. Never fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic
{
    #[error("`{name}` claims address {addr:#06x} which already belongs to `{first}`; keeping `{first}`")]
    DuplicateAddress { addr: u64, name: String, first: String },

    #[error("`{name}` is defined at {first:#06x} and at {other:#06x}; lookups by name use {first:#06x}")]
    AmbiguousName { name: String, first: u64, other: u64 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError
{
    #[error("function `{0}` not found in the listing")]
    UnknownRoot(String),
}


#[derive(Clone, Debug)]
pub struct State
{
    pub target:         Target,

    pub g:              Graph<c::Node, ()>,

    pub by_addr:        BTreeMap<u64, NodeIndex>,
    pub by_name:        BTreeMap<String, NodeIndex>,

    pub warnings:       Vec<ParseWarning>,
    pub diagnostics:    Vec<Diagnostic>,
}


impl State
{

    /// All variables initialized to empty/zero values.
    pub fn empty(target: Target) -> Self
    {
        State
        {
            target,
            g:              DiGraph::new(),
            by_addr:        BTreeMap::new(),
            by_name:        BTreeMap::new(),
            warnings:       vec![],
            diagnostics:    vec![],
        }
    }

    /// Parse `text` and build the whole graph.
    pub fn from_listing(text: &str, target: Target) -> Self
    {
        let mut s = State::empty(target);
        s.load_listing(listing::parse(text));
        s
    }

    ///
    /// Modified fields:
    ///     - `warnings`
    ///     - everything `add_real_nodes` and `add_call_edges` touch
    ///
    pub fn load_listing(&mut self, parsed: listing::Listing)
    {
        self.warnings.extend(parsed.warnings);

        let pending = self.add_real_nodes(&parsed.functions);
        self.add_call_edges(pending);

        info!(
            "call graph: {} functions, {} edges, {} diagnostics",
            self.g.node_count(),
            self.g.edge_count(),
            self.diagnostics.len()
        );
    }

    /// One node per function, with its local stack cost. Returns the
    /// callees each new node still has to be wired to.
    ///
    /// Modified fields:
    /// - g
    /// - by_addr
    /// - by_name
    /// - diagnostics
    fn add_real_nodes(&mut self, functions: &[Function]) -> Vec<(NodeIndex, Vec<Callee>)>
    {
        let mut pending = vec![];

        for func in functions
        {
            if let Some(&first) = self.by_addr.get(&func.addr)
            {
                self.diagnose(Diagnostic::DuplicateAddress
                {
                    addr:  func.addr,
                    name:  func.name.clone(),
                    first: self.g[first].name.clone(),
                });
                continue;
            }

            let local = frame::local_cost(func.insns(), self.target);
            trace!("`{}` at {:#06x}: {} bytes local", func.name, func.addr, local);

            let idx = self.g.add_node(c::Node(func.name.clone(), func.addr, local));
            self.by_addr.insert(func.addr, idx);

            if let Some(&first) = self.by_name.get(&func.name)
            {
                self.diagnose(Diagnostic::AmbiguousName
                {
                    name:  func.name.clone(),
                    first: self.g[first].addr,
                    other: func.addr,
                });
            }
            else
            {
                self.by_name.insert(func.name.clone(), idx);
            }

            pending.push((idx, calls::extract(func)));
        }

        pending
    }

    /// Modified fields:
    /// - g (edges, `Node::unresolved`)
    fn add_call_edges(&mut self, pending: Vec<(NodeIndex, Vec<Callee>)>)
    {
        for (caller, callees) in pending
        {
            let mut callees_seen = HashSet::new();

            for callee in callees
            {
                let target = match &callee
                {
                    Callee::Known(dest)          => self.resolve(dest),
                    Callee::Unresolved { .. }    => None,
                };

                match target
                {
                    Some(idx) =>
                    {
                        if callees_seen.insert(idx)
                        {
                            self.g.add_edge(caller, idx, ());
                        }
                    },
                    None =>
                    {
                        trace!("`{}` calls unknown `{}`", self.g[caller].name, callee);
                        self.g[caller].unresolved.push(callee);
                    },
                }
            }
        }
    }

    /// Address first, name second.
    pub fn resolve(&self, dest: &Dest) -> Option<NodeIndex>
    {
        dest.addr
            .and_then(|a| self.by_addr.get(&a))
            .or_else(|| dest.symbol.as_ref().and_then(|s| self.by_name.get(s)))
            .copied()
    }

    /// Find a root by symbol name or by `0x`-prefixed address.
    pub fn lookup(&self, root: &str) -> Result<NodeIndex, AnalysisError>
    {
        let by_name = self.by_name.get(root).copied();
        let by_addr = || root
            .strip_prefix("0x")
            .and_then(|hex| u64::from_str_radix(hex, 16).ok())
            .and_then(|a| self.by_addr.get(&a).copied());

        by_name
            .or_else(by_addr)
            .ok_or_else(|| AnalysisError::UnknownRoot(root.to_string()))
    }

    /// Resolved callees in call-site order.
    pub fn callees(&self, node: NodeIndex) -> Vec<NodeIndex>
    {
        // petgraph lists the most recently added edge first
        let mut out: Vec<NodeIndex> = self.g.neighbors(node).collect();
        out.reverse();
        out
    }

    /// Every node, in address order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeIndex> + '_
    {
        self.by_addr.values().copied()
    }

    fn diagnose(&mut self, d: Diagnostic)
    {
        warn!("{}", d);
        self.diagnostics.push(d);
    }
}



#[cfg(test)]
mod tests
{
    use super::*;

    const LISTING: &str = "\
00000100 <main>:
     100:\tcf 93       \tpush\tr28
     102:\t0e 94 90 00 \tcall\t0x120\t; 0x120 <foo>
     106:\t09 95       \ticall
     108:\t0e 94 00 08 \tcall\t0x1000\t; 0x1000 <ext>
     10c:\t0e 94 90 00 \tcall\t0x120\t; 0x120 <foo>
     110:\tcf 91       \tpop\tr28
     112:\t08 95       \tret

00000120 <foo>:
     120:\t08 95       \tret

00000120 <foo_alias>:
     120:\t08 95       \tret

00000130 <foo>:
     130:\t08 95       \tret
";

    fn state() -> State
    {
        State::from_listing(LISTING, Target::Avr)
    }

    #[test]
    fn nodes_and_edges()
    {
        let s = state();
        let main = s.lookup("main").unwrap();
        let foo = s.lookup("foo").unwrap();

        assert_eq!(s.g[main].local, 1);
        assert_eq!(s.callees(main), [foo]);
        assert_eq!(
            s.g[main].unresolved.iter().map(|c| c.to_string()).collect::<Vec<_>>(),
            ["icall at 0x106", "ext"]
        );
    }

    #[test]
    fn duplicate_address_keeps_first_definition()
    {
        let s = state();
        assert_eq!(s.g.node_count(), 3);
        assert_eq!(s.g[s.by_addr[&0x120]].name, "foo");
        assert!(s.diagnostics.contains(&Diagnostic::DuplicateAddress
        {
            addr:  0x120,
            name:  "foo_alias".into(),
            first: "foo".into(),
        }));
    }

    #[test]
    fn duplicate_name_is_flagged()
    {
        let s = state();
        assert!(s.diagnostics.contains(&Diagnostic::AmbiguousName
        {
            name:  "foo".into(),
            first: 0x120,
            other: 0x130,
        }));
        assert_eq!(s.lookup("0x130").map(|i| s.g[i].addr), Ok(0x130));
    }

    #[test]
    fn unknown_root()
    {
        assert_eq!(state().lookup("nope"), Err(AnalysisError::UnknownRoot("nope".into())));
    }

    #[test]
    fn self_loop_is_representable()
    {
        let s = State::from_listing(
            "00000010 <f>:\n      10:\tff df \trcall\t.-2\t; 0x10 <f>\n",
            Target::Avr,
        );
        let f = s.lookup("f").unwrap();
        assert_eq!(s.callees(f), [f]);
    }
}
