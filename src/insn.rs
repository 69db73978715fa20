//! One AVR instruction line, classified once into a [`Kind`].

use std::fmt;

/// Where a call or jump goes, as far as the listing tells us.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Dest
{
    pub addr:   Option<u64>,
    /// Only set when the annotation names a function entry (`<free>`),
    /// never for `<free+0x12>`.
    pub symbol: Option<String>,
}

impl Dest
{
    pub fn is_empty(&self) -> bool
    {
        self.addr.is_none() && self.symbol.is_none()
    }
}

impl fmt::Display for Dest
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        match (&self.symbol, self.addr)
        {
            (Some(sym), _)        => f.write_str(sym),
            (None, Some(addr))    => write!(f, "{:#x}", addr),
            (None, None)          => f.write_str("?"),
        }
    }
}

/// Which half of the stack pointer an `in` reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpHalf
{
    Low,
    High,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOp
{
    Sbiw,
    Subi,
    Sbci,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Kind
{
    /// `push rN`
    Push(u8),
    /// `rcall .+0`, pushes a return address purely to reserve room
    ReserveSlot,
    /// `in r28, 0x3d` / `in r29, 0x3e`
    ReadSp(SpHalf),
    /// `sbiw r28, N`, `subi r28, N`, `sbci r29, N`
    FrameSub { op: FrameOp, reg: u8, imm: u64 },
    Call(Dest),
    /// `icall`/`eicall`; the symbol is set only for an unambiguous annotation
    CallIndirect(Option<String>),
    Jump(Dest),
    JumpIndirect(Option<String>),
    Branch,
    Return,
    Other,
}

impl Kind
{
    /// Anything that leaves the straight-line prologue.
    pub fn ends_prologue(&self) -> bool
    {
        matches!(
            self,
            Kind::Call(_)
                | Kind::CallIndirect(_)
                | Kind::Jump(_)
                | Kind::JumpIndirect(_)
                | Kind::Branch
                | Kind::Return
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Insn
{
    pub addr:     u64,
    /// Encoded length in bytes (2 or 4).
    pub size:     u64,
    pub mnemonic: String,
    pub operands: String,
    pub comment:  Option<String>,
    pub kind:     Kind,
}

impl Insn
{
    pub fn new(addr: u64, size: u64, mnemonic: &str, operands: &str, comment: Option<&str>) -> Self
    {
        let mnemonic = mnemonic.to_ascii_lowercase();
        let operands = operands.trim().to_string();
        let comment  = comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
        let kind     = classify(addr, &mnemonic, &operands, comment.as_deref());

        Insn { addr, size, mnemonic, operands, comment, kind }
    }
}



/// Decide the [`Kind`] of one instruction. Called once per line by the
/// listing parser.
pub fn classify(addr: u64, mnemonic: &str, operands: &str, comment: Option<&str>) -> Kind
{
    let ops: Vec<&str> = operands
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    match mnemonic
    {
        "push" => ops.first()
            .and_then(|r| register(r))
            .map(Kind::Push)
            .unwrap_or(Kind::Other),

        "in" => match (ops.first().and_then(|r| register(r)), ops.get(1).and_then(|p| number(p)))
        {
            (Some(28), Some(0x3d)) => Kind::ReadSp(SpHalf::Low),
            (Some(29), Some(0x3e)) => Kind::ReadSp(SpHalf::High),
            _                      => Kind::Other,
        },

        "sbiw" | "subi" | "sbci" =>
        {
            let op = match mnemonic
            {
                "sbiw" => FrameOp::Sbiw,
                "subi" => FrameOp::Subi,
                _      => FrameOp::Sbci,
            };
            match (ops.first().and_then(|r| register(r)), ops.get(1).and_then(|i| number(i)))
            {
                (Some(reg @ (28 | 29)), Some(imm)) => Kind::FrameSub { op, reg, imm },
                _                                  => Kind::Other,
            }
        },

        "rcall" if ops.first().and_then(|o| relative(o)) == Some(0) => Kind::ReserveSlot,

        "call" | "rcall" => Kind::Call(dest(addr, ops.first().copied(), comment)),
        "jmp" | "rjmp"   => Kind::Jump(dest(addr, ops.first().copied(), comment)),

        "icall" | "eicall" => Kind::CallIndirect(comment.and_then(sole_symbol)),
        "ijmp" | "eijmp"   => Kind::JumpIndirect(comment.and_then(sole_symbol)),

        "ret" | "reti" => Kind::Return,

        m if is_branch(m) => Kind::Branch,

        _ => Kind::Other,
    }
}

fn is_branch(m: &str) -> bool
{
    (m.starts_with("br") && m.len() == 4)
        || matches!(m, "sbrc" | "sbrs" | "sbic" | "sbis" | "cpse")
}

/// `r28` -> 28
fn register(s: &str) -> Option<u8>
{
    s.strip_prefix('r')
        .or_else(|| s.strip_prefix('R'))
        .and_then(|n| n.parse().ok())
}

/// `0x3d` or `61`
pub fn number(s: &str) -> Option<u64>
{
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None      => s.parse().ok(),
    }
}

/// `.+0`, `.-448`
fn relative(s: &str) -> Option<i64>
{
    let s = s.strip_prefix('.')?;
    let (sign, digits) = match s.as_bytes().first()?
    {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _    => return None,
    };
    digits.parse::<i64>().ok().map(|n| sign * n)
}

fn dest(addr: u64, operand: Option<&str>, comment: Option<&str>) -> Dest
{
    let annotated = comment.map(annotation).unwrap_or_default();

    // The operand is authoritative; the annotation only fills gaps.
    let from_operand = operand.and_then(|o|
    {
        match relative(o)
        {
            Some(off) => u64::try_from(addr as i64 + 2 + off).ok(),
            None      => number(o),
        }
    });

    Dest
    {
        addr:   from_operand.or(annotated.addr),
        symbol: annotated.symbol,
    }
}

/// Pulls `0x83a <free>` apart. A `<sym+0x4>` annotation keeps the address
/// but drops the symbol, and more than one `<..>` makes the whole thing
/// ambiguous.
pub fn annotation(comment: &str) -> Dest
{
    let comment = comment.trim();
    if comment.matches('<').count() != 1
    {
        return Dest::default();
    }

    let (head, tail) = match comment.split_once('<')
    {
        Some(parts) => parts,
        None        => return Dest::default(),
    };
    let inner = match tail.rsplit_once('>')
    {
        Some((inner, _)) => inner.trim(),
        None             => return Dest::default(),
    };

    let addr = head.split_whitespace().next().and_then(number);
    let symbol = if inner.is_empty() || inner.contains('+')
    {
        None
    }
    else
    {
        Some(inner.to_string())
    };

    Dest { addr, symbol }
}

fn sole_symbol(comment: &str) -> Option<String>
{
    annotation(comment).symbol
}



#[cfg(test)]
mod tests
{
    use super::*;

    fn kind(addr: u64, m: &str, ops: &str, comment: Option<&str>) -> Kind
    {
        Insn::new(addr, 2, m, ops, comment).kind
    }

    #[test]
    fn pushes_and_frame_setup()
    {
        assert_eq!(kind(0, "push", "r17", None), Kind::Push(17));
        assert_eq!(kind(0, "in", "r28, 0x3d", Some("61")), Kind::ReadSp(SpHalf::Low));
        assert_eq!(kind(0, "in", "r29, 0x3e", Some("62")), Kind::ReadSp(SpHalf::High));
        assert_eq!(kind(0, "in", "r0, 0x3f", Some("63")), Kind::Other);
        assert_eq!(
            kind(0, "sbiw", "r28, 0x0e", Some("14")),
            Kind::FrameSub { op: FrameOp::Sbiw, reg: 28, imm: 14 }
        );
        assert_eq!(kind(0, "sbiw", "r24, 0x01", None), Kind::Other);
    }

    #[test]
    fn rcall_zero_reserves_instead_of_calling()
    {
        assert_eq!(kind(0x100, "rcall", ".+0", Some("0x102 <main+0x2>")), Kind::ReserveSlot);
    }

    #[test]
    fn relative_call_without_annotation()
    {
        // 0x9f8 + 2 - 448 = 0x83a
        assert_eq!(
            kind(0x9f8, "rcall", ".-448", None),
            Kind::Call(Dest { addr: Some(0x83a), symbol: None })
        );
    }

    #[test]
    fn absolute_call_with_annotation()
    {
        assert_eq!(
            kind(0xa0e, "call", "0x83a", Some("0x83a <free>")),
            Kind::Call(Dest { addr: Some(0x83a), symbol: Some("free".into()) })
        );
    }

    #[test]
    fn offset_annotation_has_no_symbol()
    {
        assert_eq!(
            annotation("0x9f4 <realloc+0x7c>"),
            Dest { addr: Some(0x9f4), symbol: None }
        );
        assert_eq!(annotation("0x1 <a> 0x2 <b>"), Dest::default());
    }

    #[test]
    fn indirect_calls()
    {
        assert_eq!(kind(0, "icall", "", None), Kind::CallIndirect(None));
        assert_eq!(
            kind(0, "icall", "", Some("0x200 <handler>")),
            Kind::CallIndirect(Some("handler".into()))
        );
    }

    #[test]
    fn control_flow()
    {
        assert_eq!(kind(0, "ret", "", None), Kind::Return);
        assert_eq!(kind(0, "brne", ".-6", None), Kind::Branch);
        assert_eq!(kind(0, "sbrs", "r24, 0", None), Kind::Branch);
        assert!(Kind::Branch.ends_prologue());
        assert!(!Kind::Push(1).ends_prologue());
    }
}
