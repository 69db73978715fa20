//! Local stack cost: what a function's prologue pushes or reserves before
//! anything else happens.
//!
//! Typical GCC prologue reserving 14 bytes after two saved registers:
//!
//! ```text
//! push r28
//! push r29
//! in   r28, 0x3d
//! in   r29, 0x3e
//! sbiw r28, 0x0e
//! ```
//!
//! Frames above 63 bytes use `subi r28, lo` / `sbci r29, hi` (or `sbc r29, r1`
//! when `hi` is zero). `rcall .+0` reserves one return address worth of bytes.
//!
//! The prologue ends at the first call, jump, branch or return, or once a
//! frame-pointer reservation has been read. Anything after that is a
//! temporary adjustment and is not counted.

use log::trace;

use crate::insn::{FrameOp, Insn, Kind, SpHalf};
use crate::Target;


pub fn local_cost<'a>(insns: impl IntoIterator<Item = &'a Insn>, target: Target) -> u64
{
    let mut bytes: u64 = 0;
    let mut spl = false;
    let mut sph = false;
    // low byte of a `subi`/`sbci` pair, waiting for its high half
    let mut pending_low: Option<u64> = None;

    for insn in insns
    {
        if insn.kind.ends_prologue()
        {
            break;
        }

        match insn.kind
        {
            Kind::Push(_)     => bytes += 1,
            Kind::ReserveSlot => bytes += target.pc_bytes(),

            Kind::ReadSp(SpHalf::Low)  => spl = true,
            Kind::ReadSp(SpHalf::High) => sph = true,

            Kind::FrameSub { op: FrameOp::Sbiw, reg: 28, imm } if spl && sph =>
            {
                bytes += imm;
                trace!("{:#06x}: frame of {} bytes", insn.addr, imm);
                return bytes;
            },
            Kind::FrameSub { op: FrameOp::Subi, reg: 28, imm } if spl && sph =>
            {
                pending_low = Some(imm);
                continue;
            },
            Kind::FrameSub { op: FrameOp::Sbci, reg: 29, imm } if pending_low.is_some() =>
            {
                let frame = pending_low.unwrap_or(0) + (imm << 8);
                trace!("{:#06x}: frame of {} bytes", insn.addr, frame);
                return bytes + frame;
            },
            _ => (),
        }

        if let Some(low) = pending_low.take()
        {
            // `sbc r29, r1` or similar: high byte is zero
            return bytes + low;
        }
    }

    bytes + pending_low.unwrap_or(0)
}



#[cfg(test)]
mod tests
{
    use super::*;

    fn insns(lines: &[(&str, &str)]) -> Vec<Insn>
    {
        lines
            .iter()
            .enumerate()
            .map(|(i, (m, ops))| Insn::new(0x100 + 2 * i as u64, 2, m, ops, None))
            .collect()
    }

    fn cost(lines: &[(&str, &str)]) -> u64
    {
        local_cost(&insns(lines), Target::Avr)
    }

    #[test]
    fn nothing_recognisable_is_zero()
    {
        assert_eq!(cost(&[("ldi", "r24, 0x01"), ("ret", "")]), 0);
    }

    #[test]
    fn single_push_is_one_byte()
    {
        assert_eq!(cost(&[("push", "r16"), ("ldi", "r24, 0x01"), ("pop", "r16"), ("ret", "")]), 1);
    }

    #[test]
    fn sbiw_frame()
    {
        let c = cost(&[
            ("push", "r28"),
            ("push", "r29"),
            ("in", "r28, 0x3d"),
            ("in", "r29, 0x3e"),
            ("sbiw", "r28, 0x0e"),
            ("in", "r0, 0x3f"),
            ("cli", ""),
        ]);
        assert_eq!(c, 16);
    }

    #[test]
    fn subi_frame_with_sbc()
    {
        let c = cost(&[
            ("in", "r28, 0x3d"),
            ("in", "r29, 0x3e"),
            ("subi", "r28, 0x80"),
            ("sbc", "r29, r1"),
        ]);
        assert_eq!(c, 128);
    }

    #[test]
    fn subi_sbci_frame()
    {
        let c = cost(&[
            ("push", "r28"),
            ("in", "r28, 0x3d"),
            ("in", "r29, 0x3e"),
            ("subi", "r28, 0x10"),
            ("sbci", "r29, 0x01"),
        ]);
        assert_eq!(c, 1 + 0x110);
    }

    #[test]
    fn sbiw_without_sp_read_is_ignored()
    {
        assert_eq!(cost(&[("sbiw", "r28, 0x04"), ("push", "r2")]), 1);
    }

    #[test]
    fn rcall_zero_uses_pc_width()
    {
        let body = insns(&[("rcall", ".+0"), ("rcall", ".+0"), ("push", "r28")]);
        assert_eq!(local_cost(&body, Target::Avr), 5);
        assert_eq!(local_cost(&body, Target::AvrLargePc), 7);
    }

    #[test]
    fn stops_at_first_call()
    {
        assert_eq!(
            cost(&[("push", "r17"), ("rcall", ".+20"), ("push", "r16"), ("push", "r15")]),
            1
        );
    }

    #[test]
    fn later_adjustments_are_not_counted()
    {
        let c = cost(&[
            ("in", "r28, 0x3d"),
            ("in", "r29, 0x3e"),
            ("sbiw", "r28, 0x04"),
            ("push", "r1"),
            ("sbiw", "r28, 0x08"),
        ]);
        assert_eq!(c, 4);
    }
}
