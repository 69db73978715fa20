//! Call sites of one function.

use std::fmt;

use log::trace;

use crate::insn::{Dest, Kind};
use crate::listing::Function;


#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Callee
{
    /// Direct call, tail jump, or an indirect call with one annotated target.
    Known(Dest),
    /// Indirect call the listing says nothing about.
    Unresolved { site: u64, mnemonic: String },
}

impl fmt::Display for Callee
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        match self
        {
            Callee::Known(dest)                    => write!(f, "{}", dest),
            Callee::Unresolved { site, mnemonic }  => write!(f, "{} at {:#x}", mnemonic, site),
        }
    }
}

/// Callees of `func` in first-seen order, without duplicates.
///
/// `jmp`/`rjmp` count as tail calls when they leave the function's own
/// address range. `ijmp` without an annotation is assumed to be a local
/// jump table and is skipped.
pub fn extract(func: &Function) -> Vec<Callee>
{
    let mut out: Vec<Callee> = vec![];
    let mut push = |callee: Callee|
    {
        if !out.contains(&callee)
        {
            out.push(callee);
        }
    };

    for insn in func.insns()
    {
        match &insn.kind
        {
            Kind::Call(dest) =>
            {
                if dest.is_empty()
                {
                    push(Callee::Unresolved { site: insn.addr, mnemonic: insn.mnemonic.clone() });
                }
                else
                {
                    push(Callee::Known(dest.clone()));
                }
            },
            Kind::Jump(dest) =>
            {
                let leaves = match (dest.addr, &dest.symbol)
                {
                    (Some(addr), _)   => !func.contains(addr),
                    (None, Some(sym)) => *sym != func.name,
                    (None, None)      => false,
                };
                if leaves
                {
                    trace!("{:#06x}: tail call to {} from `{}`", insn.addr, dest, func.name);
                    push(Callee::Known(dest.clone()));
                }
            },
            Kind::CallIndirect(Some(sym)) =>
            {
                push(Callee::Known(Dest { addr: None, symbol: Some(sym.clone()) }));
            },
            Kind::JumpIndirect(Some(sym)) if *sym != func.name =>
            {
                push(Callee::Known(Dest { addr: None, symbol: Some(sym.clone()) }));
            },
            Kind::CallIndirect(None) =>
            {
                push(Callee::Unresolved { site: insn.addr, mnemonic: insn.mnemonic.clone() });
            },
            _ => (),
        }
    }

    out
}



#[cfg(test)]
mod tests
{
    use super::*;
    use crate::listing;

    fn func(body: &str) -> Function
    {
        let text = format!("00000100 <f>:\n{}", body);
        listing::parse(&text).functions.remove(0)
    }

    #[test]
    fn direct_calls_are_deduplicated_in_order()
    {
        let f = func(
"     100:\t0e 94 1d 04 \tcall\t0x83a\t; 0x83a <free>
     104:\t0e 94 00 02 \tcall\t0x400\t; 0x400 <malloc>
     108:\t0e 94 1d 04 \tcall\t0x83a\t; 0x83a <free>
     10c:\t08 95       \tret
");
        let callees = extract(&f);
        assert_eq!(
            callees,
            [
                Callee::Known(Dest { addr: Some(0x83a), symbol: Some("free".into()) }),
                Callee::Known(Dest { addr: Some(0x400), symbol: Some("malloc".into()) }),
            ]
        );
    }

    #[test]
    fn local_jumps_are_not_calls_but_tail_jumps_are()
    {
        let f = func(
"     100:\t01 c0       \trjmp\t.+2      \t; 0x104 <f+0x4>
     102:\t08 95       \tret
     104:\t0c 94 00 02 \tjmp\t0x400\t; 0x400 <malloc>
");
        assert_eq!(
            extract(&f),
            [Callee::Known(Dest { addr: Some(0x400), symbol: Some("malloc".into()) })]
        );
    }

    #[test]
    fn bare_icall_is_explicitly_unresolved()
    {
        let f = func(
"     100:\t09 95       \ticall
     102:\t09 95       \ticall
     104:\t08 95       \tret
");
        assert_eq!(
            extract(&f),
            [
                Callee::Unresolved { site: 0x100, mnemonic: "icall".into() },
                Callee::Unresolved { site: 0x102, mnemonic: "icall".into() },
            ]
        );
        assert_eq!(extract(&f)[0].to_string(), "icall at 0x100");
    }

    #[test]
    fn annotated_icall_is_resolved()
    {
        let f = func("     100:\t09 95       \ticall\t; 0x200 <handler>\n");
        assert_eq!(
            extract(&f),
            [Callee::Known(Dest { addr: None, symbol: Some("handler".into()) })]
        );
    }

    #[test]
    fn ijmp_without_annotation_is_a_jump_table()
    {
        let f = func("     100:\t09 94       \tijmp\n");
        assert!(extract(&f).is_empty());
    }

    #[test]
    fn annotated_ijmp_into_itself_is_not_a_call()
    {
        let f = func(
"     100:\t09 94       \tijmp\t; 0x100 <f>
     102:\t09 94       \tijmp\t; 0x200 <handler>
");
        assert_eq!(
            extract(&f),
            [Callee::Known(Dest { addr: None, symbol: Some("handler".into()) })]
        );
    }
}
