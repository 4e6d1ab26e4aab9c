use crate::data::Cell;

/// Deterministic byte-string key derived from a bound-argument vector.
///
/// Each argument is rendered in a canonical textual form and followed by a
/// NUL terminator, so the key is order-sensitive and unambiguous across
/// argument boundaries. NULL is a single `0x01` marker byte, distinct from
/// the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(Vec<u8>);

const NULL_MARKER: u8 = 0x01;

impl Fingerprint {
    pub fn of(args: &[Cell]) -> Self {
        let mut buf = Vec::with_capacity(args.len() * 8);
        for arg in args {
            write_cell(&mut buf, arg);
            buf.push(0);
        }
        Fingerprint(buf)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

fn write_cell(buf: &mut Vec<u8>, cell: &Cell) {
    match cell {
        Cell::Null => buf.push(NULL_MARKER),
        Cell::Bool(b) => buf.extend_from_slice(if *b { b"true" } else { b"false" }),
        Cell::Int(i) => buf.extend_from_slice(i.to_string().as_bytes()),
        Cell::Float(v) => buf.extend_from_slice(v.to_string().as_bytes()),
        Cell::Text(s) => buf.extend_from_slice(s.as_bytes()),
        Cell::Bytes(b) => buf.extend_from_slice(b),
        Cell::Timestamp(t) => {
            let text = t.format("%Y-%m-%d %H:%M:%S%.6f").to_string();
            buf.extend_from_slice(text.as_bytes());
        }
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in &self.0 {
            match b {
                0 => write!(f, "|")?,
                &NULL_MARKER => write!(f, "<null>")?,
                b if b.is_ascii_graphic() || *b == b' ' => write!(f, "{}", *b as char)?,
                b => write!(f, "\\x{:02x}", b)?,
            }
        }
        Ok(())
    }
}
