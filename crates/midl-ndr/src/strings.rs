//! NDR string types
//!
//! NDR strings are conformant varying arrays with a null terminator.
//!
//! Wire format:
//! ```text
//! max_count     # maximum elements including null
//! offset        # always 0
//! actual_count  # actual elements including null
//! chars[actual_count]
//! ```
//! The three counts are size words: 4 bytes in NDR 2.0, 8 in NDR64.

use crate::arrays::read_variance;
use crate::{NdrDecode, NdrEncode, NdrError, NdrReader, NdrWriter, Result};

fn write_string_header(w: &mut NdrWriter, len_with_null: u64) -> Result<()> {
    w.write_size(len_with_null)?;
    w.write_size(0)?;
    w.write_size(len_with_null)
}

/// Read the three counts and return the number of `char_size`-byte
/// characters to read.
fn read_string_header(r: &mut NdrReader, char_size: usize) -> Result<usize> {
    let max_count = r.read_size()?;
    let (offset, actual_count) = read_variance(r, max_count)?;
    if offset != 0 {
        return Err(NdrError::InvalidString("non-zero offset".to_string()));
    }
    if actual_count == 0 {
        return Err(NdrError::InvalidString("missing terminator".to_string()));
    }
    r.check_count(actual_count, char_size)
}

/// ANSI string type (null-terminated char*)
///
/// Used for [string] annotated char* parameters in MIDL.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NdrString(pub String);

impl NdrString {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<&str> for NdrString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl NdrEncode for NdrString {
    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        write_string_header(w, self.0.len() as u64 + 1)?;
        w.write_bytes(self.0.as_bytes());
        w.write_data(0u8);
        Ok(())
    }
}

impl NdrDecode for NdrString {
    fn ndr_decode(r: &mut NdrReader) -> Result<Self> {
        let count = read_string_header(r, 1)?;
        let bytes = r.read_bytes(count)?;
        match bytes.split_last() {
            Some((&0, text)) => Ok(Self(String::from_utf8(text.to_vec())?)),
            _ => Err(NdrError::InvalidString("not null terminated".to_string())),
        }
    }
}

/// Unicode string type (null-terminated wchar_t*)
///
/// Used for [string] annotated wchar_t* parameters in MIDL.
/// Encoded as UTF-16LE on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NdrWString(pub String);

impl NdrWString {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<&str> for NdrWString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl NdrEncode for NdrWString {
    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        let units: Vec<u16> = self.0.encode_utf16().collect();
        write_string_header(w, units.len() as u64 + 1)?;
        for unit in units {
            w.write_data(unit);
        }
        w.write_data(0u16);
        Ok(())
    }
}

impl NdrDecode for NdrWString {
    fn ndr_decode(r: &mut NdrReader) -> Result<Self> {
        let count = read_string_header(r, 2)?;
        let mut units = Vec::with_capacity(count);
        for _ in 0..count {
            units.push(r.read_data::<u16>()?);
        }
        if units.pop() != Some(0) {
            return Err(NdrError::InvalidString("not null terminated".to_string()));
        }
        let s = char::decode_utf16(units.iter().copied())
            .collect::<std::result::Result<String, _>>()?;
        Ok(Self(s))
    }
}
