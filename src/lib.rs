//! Worst-case call stack depth for AVR firmware, computed from the
//! disassembly listing (`avr-objdump -d` / `.lss`) of the final ELF.
//!
//! The pipeline runs strictly forward:
//!
//! ```text
//! text -> listing::parse -> State (graph) -> DepthTable -> output::*
//! ```

pub mod calls;
pub mod depth;
pub mod frame;
pub mod input;
pub mod insn;
pub mod listing;
pub mod output;
pub mod state;

pub use depth::{Depth, DepthTable};
pub use state::{AnalysisError, Diagnostic, State};



/*      ████████╗ █████╗ ██████╗  ██████╗ ███████╗████████╗       */
/*      ╚══██╔══╝██╔══██╗██╔══██╗██╔════╝ ██╔════╝╚══██╔══╝       */
/*         ██║   ███████║██████╔╝██║  ███╗█████╗     ██║          */
/*         ██║   ██╔══██║██╔══██╗██║   ██║██╔══╝     ██║          */
/*         ██║   ██║  ██║██║  ██║╚██████╔╝███████╗   ██║          */
/*         ╚═╝   ╚═╝  ╚═╝╚═╝  ╚═╝ ╚═════╝ ╚══════╝   ╚═╝          */
/*     ████████████████████████████████████████████████████╗      */
/*     ╚═══════════════════════════════════════════════════╝      */

/// AVR core family. Only the width of the program counter matters here: it
/// decides how many bytes a return address (and thus `rcall .+0`) occupies.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Target {
    /// Up to 128 KiB of flash, 16-bit PC.
    #[default]
    Avr,
    /// 22-bit PC (`avr6`, `avrxmega6`, `avrxmega7`).
    AvrLargePc,
}

impl Target
{
    pub fn pc_bytes(&self) -> u64
    {
        match *self
        {
            Target::Avr        => 2,
            Target::AvrLargePc => 3,
        }
    }
}

impl std::str::FromStr for Target
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s
        {
            "avr" | "avr1" | "avr2" | "avr25" | "avr3" | "avr31" | "avr35"
            | "avr4" | "avr5" | "avr51" | "avrtiny"
            | "avrxmega2" | "avrxmega3" | "avrxmega4" | "avrxmega5"
                                                    => Ok(Target::Avr),
            "avr6" | "avrxmega6" | "avrxmega7" | "avr-large-pc"
                                                    => Ok(Target::AvrLargePc),
            other => Err(format!("unknown AVR architecture `{}`", other)),
        }
    }
}



/*      ███╗   ██╗ ██████╗ ██████╗ ███████╗      */
/*      ████╗  ██║██╔═══██╗██╔══██╗██╔════╝      */
/*      ██╔██╗ ██║██║   ██║██║  ██║█████╗        */
/*      ██║╚██╗██║██║   ██║██║  ██║██╔══╝        */
/*      ██║ ╚████║╚██████╔╝██████╔╝███████╗      */
/*      ╚═╝  ╚═══╝ ╚═════╝ ╚═════╝ ╚══════╝      */
/*     ████████████████████████████████████╗     */
/*     ╚═══════════════════════════════════╝     */

/// Graph node; one per parsed function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node
{
    pub name: String,
    pub addr: u64,
    /// Bytes pushed or reserved by the prologue.
    pub local: u64,
    /// Call sites whose callee is not a function of the listing.
    pub unresolved: Vec<calls::Callee>,
}

#[allow(non_snake_case)]
pub fn Node(name: String, addr: u64, local: u64) -> Node
{
    Node
    {
        name,
        addr,
        local,
        unresolved: vec![],
    }
}



/*      ███╗   ███╗ █████╗ ██╗  ██╗      */
/*      ████╗ ████║██╔══██╗╚██╗██╔╝      */
/*      ██╔████╔██║███████║ ╚███╔╝       */
/*      ██║╚██╔╝██║██╔══██║ ██╔██╗       */
/*      ██║ ╚═╝ ██║██║  ██║██╔╝ ██╗      */
/*      ╚═╝     ╚═╝╚═╝  ╚═╝╚═╝  ╚═╝      */
/*     ████████████████████████████╗     */
/*     ╚═══════════════════════════╝     */
use core::{cmp, fmt, ops};

/// Cumulative stack usage. `LowerBound` whenever recursion or an unknown
/// callee sits somewhere below.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum Max
{
    Exact(u64),
    LowerBound(u64),
}

impl Max
{
    pub fn bytes(&self) -> u64
    {
        match *self
        {
            Max::Exact(n) | Max::LowerBound(n) => n,
        }
    }

    pub fn is_exact(&self) -> bool
    {
        matches!(self, Max::Exact(_))
    }
}

impl ops::Add<u64> for Max
{
    type Output = Max;

    fn add(self, rhs: u64) -> Max
    {
        match self
        {
            Max::Exact(lhs)      => Max::Exact(lhs.saturating_add(rhs)),
            Max::LowerBound(lhs) => Max::LowerBound(lhs.saturating_add(rhs)),
        }
    }
}

pub fn max_of(mut iter: impl Iterator<Item = Max>) -> Option<Max>
{
    iter.next().map(|first| iter.fold(first, max))
}

pub fn max(lhs: Max, rhs: Max) -> Max
{
    match (lhs, rhs)
    {
        (Max::Exact(lhs),      Max::Exact(rhs))      => Max::Exact(cmp::max(lhs, rhs)),
        (Max::Exact(lhs),      Max::LowerBound(rhs)) => Max::LowerBound(cmp::max(lhs, rhs)),
        (Max::LowerBound(lhs), Max::Exact(rhs))      => Max::LowerBound(cmp::max(lhs, rhs)),
        (Max::LowerBound(lhs), Max::LowerBound(rhs)) => Max::LowerBound(cmp::max(lhs, rhs)),
    }
}

impl fmt::Display for Max
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        // `pad` so callers can right-align with `{:>6}`
        match *self
        {
            Max::Exact(n)      => f.pad(&n.to_string()),
            Max::LowerBound(n) => f.pad(&format!(">={}", n)),
        }
    }
}
