//! Versioned, magic-tagged, endian-normalized snapshot format.
//!
//! ```text
//! magic          u32 BE  = 0x4B56DB02
//! version_major  u8
//! version_minor  u8
//! version_patch  u8
//! entry_count    u32 BE
//! repeated entry_count times:
//!    key_len     u32 BE   (1..=1 MiB)
//!    key_bytes   [u8]
//!    value:
//!       tag      u8   (0..=5)
//!       payload per tag:
//!          0 (null)    : -
//!          1 (string)  : len u32 BE, bytes
//!          2 (int64)   : 8 bytes big-endian
//!          3 (double)  : 8 bytes big-endian (IEEE 754 bit pattern)
//!          4 (bool)    : 1 byte
//!          5 (binary)  : len u32 BE, bytes
//! ```
//!
//! Doubles are canonically big-endian here — the source implementation this
//! format is modeled on wrote them in host byte order while everything else
//! was big-endian; that inconsistency is not reproduced.
//!
//! A second, legacy magic (`0x4B56DB00`) existed in the source tree for a
//! string-only format. It is recognized only well enough to name it in an
//! `InvalidFormat` error — it is not loadable.

use std::io::{Read, Write};

use crate::error::{EngineError, EngineResult};
use crate::table::Table;
use crate::value::{Value, MAX_STRING_SIZE, TAG_BINARY, TAG_BOOL, TAG_DOUBLE, TAG_INT64, TAG_NULL, TAG_STRING};

pub const MAGIC: u32 = 0x4B56_DB02;
const LEGACY_MAGIC: u32 = 0x4B56_DB00;

pub const VERSION_MAJOR: u8 = 1;
pub const VERSION_MINOR: u8 = 0;
pub const VERSION_PATCH: u8 = 0;

fn write_u32_be<W: Write>(w: &mut W, v: u32) -> EngineResult<()> {
    w.write_all(&v.to_be_bytes())?;
    Ok(())
}

fn write_u64_be<W: Write>(w: &mut W, v: u64) -> EngineResult<()> {
    w.write_all(&v.to_be_bytes())?;
    Ok(())
}

fn read_u32_be<R: Read>(r: &mut R) -> EngineResult<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)
        .map_err(|_| EngineError::Io("unexpected end of file reading u32".into()))?;
    Ok(u32::from_be_bytes(buf))
}

fn read_u64_be<R: Read>(r: &mut R) -> EngineResult<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)
        .map_err(|_| EngineError::Io("unexpected end of file reading u64".into()))?;
    Ok(u64::from_be_bytes(buf))
}

fn read_u8<R: Read>(r: &mut R) -> EngineResult<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)
        .map_err(|_| EngineError::Io("unexpected end of file reading u8".into()))?;
    Ok(buf[0])
}

fn write_value<W: Write>(w: &mut W, value: &Value) -> EngineResult<()> {
    w.write_all(&[value.tag()])?;
    match value {
        Value::Null => {}
        Value::String(bytes) | Value::Binary(bytes) => {
            write_u32_be(w, bytes.len() as u32)?;
            w.write_all(bytes)?;
        }
        Value::Int64(v) => write_u64_be(w, *v as u64)?,
        Value::Double(v) => write_u64_be(w, v.to_bits())?,
        Value::Bool(v) => w.write_all(&[if *v { 1 } else { 0 }])?,
    }
    Ok(())
}

fn read_value<R: Read>(r: &mut R) -> EngineResult<Value> {
    let tag = read_u8(r)?;
    match tag {
        TAG_NULL => Ok(Value::Null),
        TAG_STRING => Ok(Value::String(read_len_prefixed(r)?)),
        TAG_INT64 => Ok(Value::Int64(read_u64_be(r)? as i64)),
        TAG_DOUBLE => Ok(Value::Double(f64::from_bits(read_u64_be(r)?))),
        TAG_BOOL => Ok(Value::Bool(read_u8(r)? != 0)),
        TAG_BINARY => Ok(Value::Binary(read_len_prefixed(r)?)),
        other => Err(EngineError::InvalidFormat(format!(
            "unknown value tag: {other}"
        ))),
    }
}

fn read_len_prefixed<R: Read>(r: &mut R) -> EngineResult<Vec<u8>> {
    let len = read_u32_be(r)? as usize;
    if len > MAX_STRING_SIZE {
        return Err(EngineError::StringTooLarge);
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)
        .map_err(|_| EngineError::Io("unexpected end of file reading payload".into()))?;
    Ok(buf)
}

/// Writes a full snapshot of `table` to `w`.
pub fn write_snapshot<W: Write>(w: &mut W, table: &Table) -> EngineResult<()> {
    write_u32_be(w, MAGIC)?;
    w.write_all(&[VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH])?;
    write_u32_be(w, table.size() as u32)?;

    for (key, value) in table.iter() {
        if key.len() > MAX_STRING_SIZE {
            return Err(EngineError::StringTooLarge);
        }
        write_u32_be(w, key.len() as u32)?;
        w.write_all(&key)?;
        write_value(w, &value)?;
    }

    Ok(())
}

/// Parses a full snapshot from `r` into an in-memory list of pairs, without
/// touching any table. Callers swap this in only after a full, successful
/// parse, so a truncated or malformed file never leaves a table half
/// populated.
pub fn read_snapshot<R: Read>(r: &mut R) -> EngineResult<Vec<(Vec<u8>, Value)>> {
    let magic = read_u32_be(r)?;
    if magic == LEGACY_MAGIC {
        return Err(EngineError::InvalidFormat(
            "legacy string-only snapshot format (magic 0x4B56DB00) is not supported".into(),
        ));
    }
    if magic != MAGIC {
        return Err(EngineError::InvalidFormat(format!(
            "bad magic: 0x{magic:08x}"
        )));
    }

    let mut version = [0u8; 3];
    r.read_exact(&mut version)
        .map_err(|_| EngineError::Io("unexpected end of file reading version".into()))?;
    // Version bytes are read but not enforced.

    let count = read_u32_be(r)? as usize;
    let mut pairs = Vec::with_capacity(count.min(1 << 20));

    for _ in 0..count {
        let key = read_len_prefixed(r)?;
        if key.is_empty() {
            return Err(EngineError::InvalidFormat("zero-length key in snapshot".into()));
        }
        let value = read_value(r)?;
        pairs.push((key, value));
    }

    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Table;

    fn roundtrip_table() -> Table {
        let mut t = Table::new(16);
        t.put(b"name", Value::String(b"Alice".to_vec())).unwrap();
        t.put(b"age", Value::Int64(30)).unwrap();
        t.put(b"pi", Value::Double(std::f64::consts::PI)).unwrap();
        t.put(b"active", Value::Bool(true)).unwrap();
        t.put(b"nothing", Value::Null).unwrap();
        t.put(b"blob", Value::Binary(vec![0, 255, 128, 1])).unwrap();
        t.put(b"empty", Value::String(Vec::new())).unwrap();
        t
    }

    #[test]
    fn save_then_load_preserves_every_value() {
        let table = roundtrip_table();
        let mut buf = Vec::new();
        write_snapshot(&mut buf, &table).unwrap();

        let pairs = read_snapshot(&mut std::io::Cursor::new(&buf)).unwrap();
        assert_eq!(pairs.len(), table.size());

        let mut restored = Table::new(16);
        for (k, v) in pairs {
            restored.put(&k, v).unwrap();
        }

        for (key, value) in table.iter() {
            assert_eq!(restored.get(&key).unwrap(), value);
        }
    }

    #[test]
    fn magic_is_checked() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0xDEAD_BEEFu32.to_be_bytes());
        let err = read_snapshot(&mut std::io::Cursor::new(&buf)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidFormat(_)));
    }

    #[test]
    fn legacy_magic_is_named_in_the_error() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&LEGACY_MAGIC.to_be_bytes());
        let err = read_snapshot(&mut std::io::Cursor::new(&buf)).unwrap_err();
        match err {
            EngineError::InvalidFormat(msg) => assert!(msg.contains("legacy")),
            other => panic!("expected InvalidFormat, got {other:?}"),
        }
    }

    #[test]
    fn truncated_file_is_an_io_error() {
        let table = roundtrip_table();
        let mut buf = Vec::new();
        write_snapshot(&mut buf, &table).unwrap();
        buf.truncate(buf.len() - 3); // cut off mid last value

        let err = read_snapshot(&mut std::io::Cursor::new(&buf)).unwrap_err();
        assert!(matches!(err, EngineError::Io(_)));
    }

    #[test]
    fn unknown_tag_is_invalid_format() {
        let mut buf = Vec::new();
        write_u32_be(&mut buf, MAGIC).unwrap();
        buf.extend_from_slice(&[VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH]);
        write_u32_be(&mut buf, 1).unwrap();
        write_u32_be(&mut buf, 1).unwrap();
        buf.push(b'k');
        buf.push(0xEE); // unknown tag

        let err = read_snapshot(&mut std::io::Cursor::new(&buf)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidFormat(_)));
    }

    #[test]
    fn double_is_stored_big_endian() {
        let mut t = Table::new(16);
        t.put(b"d", Value::Double(1.0)).unwrap();
        let mut buf = Vec::new();
        write_snapshot(&mut buf, &t).unwrap();

        // header: 4 (magic) + 3 (version) + 4 (count) = 11 bytes
        // entry: 4 (key_len) + 1 (key) + 1 (tag) = 6 bytes, then 8 bytes of double
        let double_offset = 11 + 6;
        let bits = 1.0f64.to_bits();
        assert_eq!(&buf[double_offset..double_offset + 8], &bits.to_be_bytes());
    }
}
