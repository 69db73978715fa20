use std::io;

use crate as c;
use crate::depth::{Depth, DepthTable};
use crate::state::State;


impl State
{
    /// Every function, deepest cumulative usage first.
    ///
    /// ```text
    /// 12 MAX
    ///  Usage  Local  Function
    ///     12      2  main
    /// ```
    pub fn output_top(&self, depths: &DepthTable, mut writer: impl io::Write) -> io::Result<()>
    {
        let mut rows: Vec<(&c::Node, Depth)> = self
            .nodes()
            .map(|idx|
            {
                let node = &self.g[idx];
                let depth = depths.get(idx).unwrap_or(Depth
                {
                    max:       c::Max::LowerBound(node.local),
                    recursive: false,
                });
                (node, depth)
            })
            .collect();

        // Locate max
        if let Some(max) = c::max_of(rows.iter().map(|(_, d)| d.max))
        {
            writeln!(writer, "{} MAX", max)?;
        }

        writeln!(writer, "{:>6} {:>6}  Function", "Usage", "Local")?;

        // stable: ties stay in address order
        rows.sort_by(|a, b| b.1.bytes().cmp(&a.1.bytes()));

        for (node, depth) in rows
        {
            write!(writer, "{:>6} {:>6}  {}", depth.max, node.local, node.name)?;
            if depth.recursive
            {
                write!(writer, " (recursive)")?;
            }
            if !node.unresolved.is_empty()
            {
                write!(writer, " [{} unknown callee(s)]", node.unresolved.len())?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }
}



#[cfg(test)]
mod tests
{
    use crate::{DepthTable, State, Target};

    #[test]
    fn ranks_by_cumulative_usage()
    {
        let s = State::from_listing(
"00000100 <main>:
     100:\tcf 93       \tpush\tr28
     102:\t0e 94 00 01 \tcall\t0x200\t; 0x200 <leaf>
     106:\t09 95       \ticall
     108:\t08 95       \tret

00000200 <leaf>:
     200:\tcf 93       \tpush\tr28
     202:\tdf 93       \tpush\tr29
     204:\t08 95       \tret
",
            Target::Avr,
        );
        let mut t = DepthTable::new(&s);
        t.resolve_all(&s);

        let mut out = vec![];
        s.output_top(&t, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "\
>=3 MAX
 Usage  Local  Function
   >=3      1  main [1 unknown callee(s)]
     2      2  leaf
"
        );
    }
}
