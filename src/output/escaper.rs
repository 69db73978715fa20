use std::io;

/// Backslash-escapes `"` and `\` for DOT string literals.
pub struct Escaper<W>
where
    W: io::Write,
{
    pub writer: W,
}


impl<W> Escaper<W>
where
    W: io::Write,
{
    pub fn new(writer: W) -> Self {
        Escaper { writer }
    }
}


impl<W> io::Write for Escaper<W>
where
    W: io::Write
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>
    {
        for &c in buf
        {
            if c == b'"' || c == b'\\'
            {
                self.writer.write_all(b"\\")?;
            }
            self.writer.write_all(&[c])?;
        }
        // report the caller's bytes, not the escaped ones
        Ok( buf.len() )
    }

    fn flush(&mut self) -> io::Result<()>
    {
        self.writer.flush()
    }
}
