//! Field-level encode/decode for packet payloads.
//!
//! Fixed-width little-endian primitives, length-prefixed strings, byte
//! blobs and arrays, and `Option` with a one-byte tag. Decoders consume
//! from a shared slice cursor and fail with `anyhow` errors on short or
//! oversized input; callers treat any failure as a protocol error.

use anyhow::{bail, Result};
use uuid::Uuid;

/// Caps on decoded lengths, far above anything a well-behaved client sends.
const MAX_STR_LEN: usize = 1 << 16;
const MAX_ARRAY_LEN: usize = 1 << 20;

pub trait PacketEncode {
    fn encode(&self, out: &mut Vec<u8>);
}

pub trait PacketDecode: Sized {
    fn decode(inp: &mut &[u8]) -> Result<Self>;
}

pub fn take<const N: usize>(inp: &mut &[u8]) -> Result<[u8; N]> {
    if inp.len() < N {
        bail!("short read: need {N} bytes, have {}", inp.len());
    }
    let (head, rest) = inp.split_at(N);
    *inp = rest;
    let mut buf = [0u8; N];
    buf.copy_from_slice(head);
    Ok(buf)
}

macro_rules! impl_fixed {
    ($($t:ty),*) => {$(
        impl PacketEncode for $t {
            fn encode(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }
        }
        impl PacketDecode for $t {
            fn decode(inp: &mut &[u8]) -> Result<Self> {
                Ok(<$t>::from_le_bytes(take(inp)?))
            }
        }
    )*};
}

impl_fixed!(u8, i8, i16, u16, i32, u32, i64, u64, f32, f64);

impl PacketEncode for bool {
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(u8::from(*self));
    }
}

impl PacketDecode for bool {
    fn decode(inp: &mut &[u8]) -> Result<Self> {
        match u8::decode(inp)? {
            0 => Ok(false),
            1 => Ok(true),
            other => bail!("bad bool byte: {other}"),
        }
    }
}

impl PacketEncode for Uuid {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
    }
}

impl PacketDecode for Uuid {
    fn decode(inp: &mut &[u8]) -> Result<Self> {
        Ok(Uuid::from_bytes(take::<16>(inp)?))
    }
}

impl PacketEncode for str {
    fn encode(&self, out: &mut Vec<u8>) {
        let len = u32::try_from(self.len()).expect("string length fits u32");
        len.encode(out);
        out.extend_from_slice(self.as_bytes());
    }
}

impl PacketEncode for String {
    fn encode(&self, out: &mut Vec<u8>) {
        self.as_str().encode(out);
    }
}

impl PacketDecode for String {
    fn decode(inp: &mut &[u8]) -> Result<Self> {
        let len = u32::decode(inp)? as usize;
        if len > MAX_STR_LEN {
            bail!("string too long: {len}");
        }
        if inp.len() < len {
            bail!("short read: string of {len} bytes");
        }
        let (head, rest) = inp.split_at(len);
        *inp = rest;
        Ok(std::str::from_utf8(head)?.to_owned())
    }
}

/// Byte blobs carry a length prefix like any other array.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bytes(pub Vec<u8>);

impl PacketEncode for Bytes {
    fn encode(&self, out: &mut Vec<u8>) {
        let len = u32::try_from(self.0.len()).expect("blob length fits u32");
        len.encode(out);
        out.extend_from_slice(&self.0);
    }
}

impl PacketDecode for Bytes {
    fn decode(inp: &mut &[u8]) -> Result<Self> {
        let len = u32::decode(inp)? as usize;
        if len > MAX_ARRAY_LEN {
            bail!("blob too long: {len}");
        }
        if inp.len() < len {
            bail!("short read: blob of {len} bytes");
        }
        let (head, rest) = inp.split_at(len);
        *inp = rest;
        Ok(Bytes(head.to_vec()))
    }
}

impl<T: PacketEncode> PacketEncode for Vec<T> {
    fn encode(&self, out: &mut Vec<u8>) {
        let len = u32::try_from(self.len()).expect("array length fits u32");
        len.encode(out);
        for item in self {
            item.encode(out);
        }
    }
}

impl<T: PacketDecode> PacketDecode for Vec<T> {
    fn decode(inp: &mut &[u8]) -> Result<Self> {
        let len = u32::decode(inp)? as usize;
        if len > MAX_ARRAY_LEN {
            bail!("array too long: {len}");
        }
        let mut items = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            items.push(T::decode(inp)?);
        }
        Ok(items)
    }
}

impl<T: PacketEncode> PacketEncode for Option<T> {
    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Some(v) => {
                out.push(1);
                v.encode(out);
            }
            None => out.push(0),
        }
    }
}

impl<T: PacketDecode> PacketDecode for Option<T> {
    fn decode(inp: &mut &[u8]) -> Result<Self> {
        if bool::decode(inp)? {
            Ok(Some(T::decode(inp)?))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<T: PacketEncode + PacketDecode + PartialEq + std::fmt::Debug>(v: T) {
        let mut buf = Vec::new();
        v.encode(&mut buf);
        let mut cur = buf.as_slice();
        assert_eq!(T::decode(&mut cur).expect("decode"), v);
        assert!(cur.is_empty(), "decoder left {} bytes", cur.len());
    }

    #[test]
    fn primitives_round_trip() {
        round_trip(0x1234_5678i32);
        round_trip(-1i16);
        round_trip(u64::MAX);
        round_trip(3.75f64);
        round_trip(true);
        round_trip(String::from("hello, світ"));
        round_trip(Bytes(vec![0, 1, 2, 254]));
        round_trip(vec![1i32, -2, 3]);
        round_trip(Some(7i64));
        round_trip(Option::<i64>::None);
        round_trip(Uuid::from_u128(0x00112233_4455_6677_8899_aabbccddeeff));
    }

    #[test]
    fn short_input_is_an_error() {
        let mut cur: &[u8] = &[1, 2];
        assert!(i32::decode(&mut cur).is_err());

        let mut buf = Vec::new();
        String::from("abcdef").encode(&mut buf);
        let mut cur = &buf[..buf.len() - 2];
        assert!(String::decode(&mut cur).is_err());
    }

    #[test]
    fn oversized_lengths_are_rejected() {
        let mut buf = Vec::new();
        (u32::MAX).encode(&mut buf);
        let mut cur = buf.as_slice();
        assert!(String::decode(&mut cur).is_err());
        let mut cur = buf.as_slice();
        assert!(Vec::<i32>::decode(&mut cur).is_err());
    }

    #[test]
    fn bad_bool_is_rejected() {
        let mut cur: &[u8] = &[2];
        assert!(bool::decode(&mut cur).is_err());
    }
}
