/*     ██████╗  █████╗ ██████╗ ███████╗███████╗     */
/*     ██╔══██╗██╔══██╗██╔══██╗██╔════╝██╔════╝     */
/*     ██████╔╝███████║██████╔╝███████╗█████╗       */
/*     ██╔═══╝ ██╔══██║██╔══██╗╚════██║██╔══╝       */
/*     ██║     ██║  ██║██║  ██║███████║███████╗     */
/*     ╚═╝     ╚═╝  ╚═╝╚═╝  ╚═╝╚══════╝╚══════╝     */

//! Splits an `avr-objdump` listing into functions.
//!
//! ```text
//! 00000978 <realloc>:
//!      978:	a0 e0       	ldi	r26, 0x00	; 0
//!      9f8:	20 df       	rcall	.-448    	; 0x83a <free>
//! ```

use log::{trace, warn};
use thiserror::Error;

use crate::insn::Insn;


/// Recovered problems; the offending line or block is dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseWarning
{
    #[error("line {line}: malformed function header `{text}`, skipping its block")]
    MalformedBoundary { line: usize, text: String },

    #[error("line {line}: unparsable instruction `{text}`")]
    UnparsableInstruction { line: usize, text: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Line
{
    Insn(Insn),
    /// Source annotations, blank lines, `...` fill markers.
    Context(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Function
{
    pub name:  String,
    pub addr:  u64,
    pub lines: Vec<Line>,
}

impl Function
{
    pub fn insns(&self) -> impl Iterator<Item = &Insn> + '_
    {
        self.lines.iter().filter_map(|l| match l
        {
            Line::Insn(i)    => Some(i),
            Line::Context(_) => None,
        })
    }

    /// One past the last instruction byte.
    pub fn end_addr(&self) -> u64
    {
        self.insns()
            .map(|i| i.addr + i.size)
            .max()
            .unwrap_or(self.addr)
            .max(self.addr)
    }

    pub fn contains(&self, addr: u64) -> bool
    {
        addr >= self.addr && addr < self.end_addr()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Listing
{
    pub functions: Vec<Function>,
    pub warnings:  Vec<ParseWarning>,
}



enum Classified<'a>
{
    Boundary { addr: u64, name: &'a str },
    BadBoundary,
    Section,
    Insn(Insn),
    BadInsn,
    Context,
}

fn classify_line(line: &str) -> Classified<'_>
{
    let starts_at_col0 = line.chars().next().map_or(false, |c| !c.is_whitespace());

    if starts_at_col0
    {
        if line.starts_with("Disassembly of section")
        {
            return Classified::Section;
        }
        if let Some(b) = boundary(line)
        {
            return b;
        }
    }

    instruction(line).unwrap_or(Classified::Context)
}

/// `00000978 <realloc>:`
fn boundary(line: &str) -> Option<Classified<'_>>
{
    let line = line.trim_end();
    let (addr, rest) = line.split_once(char::is_whitespace)?;
    let addr = u64::from_str_radix(addr, 16).ok()?;
    let rest = rest.trim();

    let label = match rest.strip_suffix(':')
    {
        Some(label)                   => label,
        None if rest.starts_with('<') => return Some(Classified::BadBoundary),
        // a hex word at column 0 that isn't a label at all
        None                          => return None,
    };

    let name = label
        .strip_prefix('<')
        .and_then(|l| l.strip_suffix('>'))
        .filter(|n| !n.trim().is_empty());

    Some(match name
    {
        Some(name) => Classified::Boundary { addr, name },
        None       => Classified::BadBoundary,
    })
}

/// `     978:	a0 e0       	ldi	r26, 0x00	; 0`
fn instruction(line: &str) -> Option<Classified<'static>>
{
    let (addr, rest) = line.trim_start().split_once(':')?;
    let addr = u64::from_str_radix(addr, 16).ok()?;

    let (code, comment) = match rest.split_once(';')
    {
        Some((code, comment)) => (code, Some(comment)),
        None                  => (rest, None),
    };

    let mut size = 0;
    let mut tail = code.trim_start();
    loop
    {
        let (tok, after) = tail.split_once(char::is_whitespace).unwrap_or((tail, ""));
        if tok.len() == 2 && tok.bytes().all(|b| b.is_ascii_hexdigit())
        {
            size += 1;
            tail = after.trim_start();
        }
        else
        {
            break;
        }
    }

    if size == 0
    {
        // `addr:` followed by nothing is a truncated line; anything else is
        // prose that happens to start with a hex word.
        return if code.trim().is_empty() && comment.is_none()
        {
            Some(Classified::BadInsn)
        }
        else
        {
            None
        };
    }

    let (mnemonic, operands) = tail.split_once(char::is_whitespace).unwrap_or((tail, ""));
    if mnemonic.is_empty()
    {
        return Some(Classified::BadInsn);
    }

    Some(Classified::Insn(Insn::new(addr, size, mnemonic, operands, comment)))
}



enum Cursor
{
    Preamble,
    Open(Function),
    /// Inside a block whose header was malformed.
    Skipping,
}

/// Fold state. Completed functions are never touched again.
struct Fold
{
    done:     Vec<Function>,
    warnings: Vec<ParseWarning>,
    cursor:   Cursor,
}

impl Fold
{
    fn new() -> Self
    {
        Fold { done: vec![], warnings: vec![], cursor: Cursor::Preamble }
    }

    fn close(&mut self)
    {
        if let Cursor::Open(f) = std::mem::replace(&mut self.cursor, Cursor::Preamble)
        {
            trace!("closed `{}` at {:#06x} ({} lines)", f.name, f.addr, f.lines.len());
            self.done.push(f);
        }
    }

    fn step(mut self, number: usize, line: &str) -> Self
    {
        match classify_line(line)
        {
            Classified::Boundary { addr, name } =>
            {
                self.close();
                self.cursor = Cursor::Open(Function
                {
                    name:  name.to_string(),
                    addr,
                    lines: vec![],
                });
            },
            Classified::BadBoundary =>
            {
                self.close();
                self.warn(ParseWarning::MalformedBoundary
                {
                    line: number,
                    text: line.trim().to_string(),
                });
                self.cursor = Cursor::Skipping;
            },
            Classified::Section => self.close(),
            Classified::Insn(insn) =>
            {
                if let Cursor::Open(f) = &mut self.cursor
                {
                    f.lines.push(Line::Insn(insn));
                }
            },
            Classified::BadInsn =>
            {
                if let Cursor::Open(_) = self.cursor
                {
                    self.warn(ParseWarning::UnparsableInstruction
                    {
                        line: number,
                        text: line.trim().to_string(),
                    });
                }
            },
            Classified::Context =>
            {
                if let Cursor::Open(f) = &mut self.cursor
                {
                    f.lines.push(Line::Context(line.to_string()));
                }
            },
        }
        self
    }

    fn warn(&mut self, w: ParseWarning)
    {
        warn!("{}", w);
        self.warnings.push(w);
    }

    fn finish(mut self) -> Listing
    {
        self.close();
        for f in &mut self.done
        {
            // objdump separates functions with a blank line
            while matches!(f.lines.last(), Some(Line::Context(c)) if c.trim().is_empty())
            {
                f.lines.pop();
            }
        }
        Listing { functions: self.done, warnings: self.warnings }
    }
}

/// Parse a whole listing. Never fails; see [`Listing::warnings`].
pub fn parse(text: &str) -> Listing
{
    text.lines()
        .enumerate()
        .fold(Fold::new(), |acc, (i, line)| acc.step(i + 1, line))
        .finish()
}



#[cfg(test)]
mod tests
{
    use super::*;

    const LISTING: &str = "\
blink.elf:     file format elf32-avr

Disassembly of section .text:

00000978 <realloc>:
     978:\tcf 93       \tpush\tr28
     97a:\t20 df       \trcall\t.-322    \t; 0x83a <free>
  x = 1;
     97c:\t08 95       \tret

0000097e <>:
     97e:\t08 95       \tret

00000980 <free2>:
     980:\t0e 94 1d 04 \tcall\t0x83a\t; 0x83a <free>
     984:\t08 95       \tret
";

    #[test]
    fn splits_functions_and_skips_bad_headers()
    {
        let listing = parse(LISTING);
        let names: Vec<_> = listing.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["realloc", "free2"]);
        assert_eq!(listing.functions[0].addr, 0x978);
        assert_eq!(
            listing.warnings,
            [ParseWarning::MalformedBoundary { line: 11, text: "0000097e <>:".into() }]
        );
    }

    #[test]
    fn keeps_source_lines_as_context()
    {
        let listing = parse(LISTING);
        let realloc = &listing.functions[0];
        assert_eq!(realloc.insns().count(), 3);
        assert!(realloc.lines.contains(&Line::Context("  x = 1;".into())));
        // trailing blank separator is trimmed
        assert!(matches!(realloc.lines.last(), Some(Line::Insn(_))));
    }

    #[test]
    fn instruction_sizes_give_the_range()
    {
        let listing = parse(LISTING);
        let free2 = &listing.functions[1];
        assert_eq!(free2.insns().next().map(|i| i.size), Some(4));
        assert_eq!(free2.end_addr(), 0x986);
        assert!(free2.contains(0x984));
        assert!(!free2.contains(0x986));
    }

    #[test]
    fn truncated_instruction_is_reported()
    {
        let listing = parse("00000010 <f>:\n      12:\n      14:\t08 95 \tret\n");
        assert_eq!(listing.functions[0].insns().count(), 1);
        assert_eq!(
            listing.warnings,
            [ParseWarning::UnparsableInstruction { line: 2, text: "12:".into() }]
        );
    }

    #[test]
    fn section_header_closes_function()
    {
        let text = "00000010 <f>:\n      10:\t08 95 \tret\nDisassembly of section .data:\n      20:\t08 95 \tret\n";
        let listing = parse(text);
        assert_eq!(listing.functions.len(), 1);
        assert_eq!(listing.functions[0].insns().count(), 1);
    }
}
