//! Bounds-checked little-endian reads/writes at an explicit offset.
//!
//! Mirrors `read_uint32_t`/`write_uint32_t` and friends from the ppelib C
//! sources this crate's PE codec is grounded on, except the bounds check
//! lives in the primitive itself instead of being the caller's
//! responsibility — idiomatic Rust prefers a `Result` here over trusting
//! every call site to pre-check `buf.len()`.

use crate::error::{Error, Result};
use scroll::{Pread, Pwrite, LE};

macro_rules! cursor_rw {
    ($read:ident, $write:ident, $ty:ty, $what:literal) => {
        pub fn $read(buf: &[u8], offset: usize) -> Result<$ty> {
            buf.pread_with::<$ty>(offset, LE).map_err(|_| Error::BufferTooShort {
                what: $what,
                offset,
                needed: core::mem::size_of::<$ty>(),
                available: buf.len().saturating_sub(offset),
            })
        }

        pub fn $write(buf: &mut [u8], offset: usize, value: $ty) -> Result<()> {
            buf.pwrite_with::<$ty>(value, offset, LE)
                .map(|_| ())
                .map_err(|_| Error::BufferTooShort {
                    what: $what,
                    offset,
                    needed: core::mem::size_of::<$ty>(),
                    available: buf.len().saturating_sub(offset),
                })
        }
    };
}

cursor_rw!(read_u8, write_u8, u8, "u8 field");
cursor_rw!(read_u16, write_u16, u16, "u16 field");
cursor_rw!(read_u32, write_u32, u32, "u32 field");
cursor_rw!(read_u64, write_u64, u64, "u64 field");

/// Borrow `len` bytes at `offset`, bounds-checked.
pub fn read_bytes<'a>(buf: &'a [u8], offset: usize, len: usize) -> Result<&'a [u8]> {
    buf.get(offset..offset + len).ok_or(Error::BufferTooShort {
        what: "byte string",
        offset,
        needed: len,
        available: buf.len().saturating_sub(offset),
    })
}

/// Copy `bytes` into `buf` at `offset`, bounds-checked.
pub fn write_bytes(buf: &mut [u8], offset: usize, bytes: &[u8]) -> Result<()> {
    let dst = buf
        .get_mut(offset..offset + bytes.len())
        .ok_or(Error::BufferTooShort {
            what: "byte string",
            offset,
            needed: bytes.len(),
            available: buf.len().saturating_sub(offset),
        })?;
    dst.copy_from_slice(bytes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_round_trip() {
        let mut buf = [0u8; 16];
        write_u32(&mut buf, 4, 0xdead_beef).unwrap();
        assert_eq!(read_u32(&buf, 4).unwrap(), 0xdead_beef);
    }

    #[test]
    fn out_of_bounds_reads_fail_cleanly() {
        let buf = [0u8; 4];
        assert!(read_u64(&buf, 0).is_err());
        assert!(read_u32(&buf, 2).is_err());
    }
}
