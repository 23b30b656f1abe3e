//! OSC message encoding and decoding
//!
//! Implements the subset of OSC 1.0 used by tally receivers: a single
//! message (no bundles) with int32, float32 and string arguments.
//! Strings are NUL-terminated and padded to a multiple of 4 bytes;
//! numbers are big-endian.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// OSC codec errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OscError {
    #[error("address must start with '/': {0:?}")]
    InvalidAddress(String),

    #[error("packet truncated while reading {0}")]
    Truncated(&'static str),

    #[error("string is not NUL-terminated or not UTF-8")]
    BadString,

    #[error("type tag string must start with ','")]
    MissingTypeTags,

    #[error("unsupported argument type '{0}'")]
    UnsupportedType(char),

    #[error("bundles are not supported")]
    Bundle,
}

/// OSC argument
#[derive(Debug, Clone, PartialEq)]
pub enum OscArg {
    Int(i32),
    Float(f32),
    String(String),
}

impl OscArg {
    fn tag(&self) -> u8 {
        match self {
            OscArg::Int(_) => b'i',
            OscArg::Float(_) => b'f',
            OscArg::String(_) => b's',
        }
    }
}

impl fmt::Display for OscArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OscArg::Int(v) => write!(f, "{}i", v),
            OscArg::Float(v) => write!(f, "{}f", v),
            OscArg::String(v) => write!(f, "{:?}", v),
        }
    }
}

/// OSC message
#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    pub address: String,
    pub args: Vec<OscArg>,
}

impl OscMessage {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            args: Vec::new(),
        }
    }

    pub fn with_arg(mut self, arg: OscArg) -> Self {
        self.args.push(arg);
        self
    }

    /// Tally message: one float argument, 1 for on and 0 for off
    pub fn tally(address: impl Into<String>, active: bool) -> Self {
        Self::new(address).with_arg(OscArg::Float(if active { 1.0 } else { 0.0 }))
    }

    /// Encode to a datagram payload
    pub fn encode(&self) -> Result<Bytes, OscError> {
        if !self.address.starts_with('/') {
            return Err(OscError::InvalidAddress(self.address.clone()));
        }

        let mut buf = BytesMut::with_capacity(self.address.len() + 8 + self.args.len() * 8);
        put_padded_str(&mut buf, self.address.as_bytes());

        let mut tags = Vec::with_capacity(self.args.len() + 1);
        tags.push(b',');
        tags.extend(self.args.iter().map(OscArg::tag));
        put_padded_str(&mut buf, &tags);

        for arg in &self.args {
            match arg {
                OscArg::Int(v) => buf.put_i32(*v),
                OscArg::Float(v) => buf.put_f32(*v),
                OscArg::String(s) => put_padded_str(&mut buf, s.as_bytes()),
            }
        }

        Ok(buf.freeze())
    }

    /// Decode a datagram payload
    pub fn decode(mut data: &[u8]) -> Result<Self, OscError> {
        if data.starts_with(b"#bundle") {
            return Err(OscError::Bundle);
        }

        let address = take_padded_str(&mut data, "address")?;
        if !address.starts_with('/') {
            return Err(OscError::InvalidAddress(address));
        }

        // Type tags are optional in very old senders
        if data.is_empty() {
            return Ok(Self::new(address));
        }

        let tags = take_padded_str(&mut data, "type tags")?;
        let tags = tags.strip_prefix(',').ok_or(OscError::MissingTypeTags)?;

        let mut args = Vec::with_capacity(tags.len());
        for tag in tags.chars() {
            let arg = match tag {
                'i' => {
                    if data.remaining() < 4 {
                        return Err(OscError::Truncated("int32"));
                    }
                    OscArg::Int(data.get_i32())
                }
                'f' => {
                    if data.remaining() < 4 {
                        return Err(OscError::Truncated("float32"));
                    }
                    OscArg::Float(data.get_f32())
                }
                's' => OscArg::String(take_padded_str(&mut data, "string")?),
                other => return Err(OscError::UnsupportedType(other)),
            };
            args.push(arg);
        }

        Ok(Self { address, args })
    }
}

impl fmt::Display for OscMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

fn put_padded_str(buf: &mut BytesMut, s: &[u8]) {
    buf.put_slice(s);
    // At least one NUL, then pad to 4
    let pad = 4 - (s.len() % 4);
    buf.put_bytes(0, pad);
}

fn take_padded_str(data: &mut &[u8], what: &'static str) -> Result<String, OscError> {
    let end = data
        .iter()
        .position(|b| *b == 0)
        .ok_or(OscError::Truncated(what))?;
    let padded = (end / 4 + 1) * 4;
    if data.len() < padded {
        return Err(OscError::Truncated(what));
    }

    let s = std::str::from_utf8(&data[..end])
        .map_err(|_| OscError::BadString)?
        .to_string();
    data.advance(padded);
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_tally_on() {
        let bytes = OscMessage::tally("/exec/1/3", true).encode().unwrap();
        let mut expected = Vec::new();
        expected.extend_from_slice(b"/exec/1/3\0\0\0");
        expected.extend_from_slice(b",f\0\0");
        expected.extend_from_slice(&1.0f32.to_be_bytes());
        assert_eq!(&bytes[..], &expected[..]);
    }

    #[test]
    fn test_address_on_four_byte_boundary_gets_full_pad() {
        let bytes = OscMessage::new("/abc").encode().unwrap();
        assert_eq!(&bytes[..8], b"/abc\0\0\0\0");
        assert_eq!(&bytes[8..], b",\0\0\0");
    }

    #[test]
    fn test_decode_mixed_arguments() {
        let msg = OscMessage::new("/tally/M0/7")
            .with_arg(OscArg::Int(-2))
            .with_arg(OscArg::String("live".into()))
            .with_arg(OscArg::Float(0.0));
        let decoded = OscMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.to_string(), "/tally/M0/7 -2i \"live\" 0f");
    }

    #[test]
    fn test_rejects_bad_input() {
        assert_eq!(
            OscMessage::new("exec/1").encode(),
            Err(OscError::InvalidAddress("exec/1".into()))
        );
        assert_eq!(OscMessage::decode(b"#bundle\0"), Err(OscError::Bundle));
        assert_eq!(
            OscMessage::decode(b"/abc"),
            Err(OscError::Truncated("address"))
        );
        assert_eq!(
            OscMessage::decode(b"/a\0\0,f\0\0\0\0"),
            Err(OscError::Truncated("float32"))
        );
        assert_eq!(
            OscMessage::decode(b"/a\0\0,b\0\0"),
            Err(OscError::UnsupportedType('b'))
        );
    }
}
