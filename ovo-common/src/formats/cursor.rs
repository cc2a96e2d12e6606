//! Little-endian payload reader/writer shared by every record layout.
//!
//! # Primitives
//! ```text
//! string: UTF-8 bytes + 0x00 terminator ("[none]" = absent)
//! vec3:   f32 × 3
//! mat4:   f32 × 16, column-major
//! ```

use glam::{Mat4, Vec3};

use crate::error::{FormatError, FormatResult};

/// Placeholder written for an absent optional string.
pub const NONE_PLACEHOLDER: &str = "[none]";

/// Append-only payload builder.
#[derive(Debug, Default, Clone)]
pub struct PayloadWriter {
    buf: Vec<u8>,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn bool(&mut self, v: bool) -> &mut Self {
        self.u8(v as u8)
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn f32(&mut self, v: f32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn vec3(&mut self, v: Vec3) -> &mut Self {
        self.f32(v.x).f32(v.y).f32(v.z)
    }

    pub fn mat4(&mut self, m: &Mat4) -> &mut Self {
        for v in m.to_cols_array() {
            self.f32(v);
        }
        self
    }

    /// Write a NUL-terminated string. Interior NULs are dropped.
    pub fn string(&mut self, s: &str) -> &mut Self {
        self.buf.extend(s.bytes().filter(|&b| b != 0));
        self.buf.push(0);
        self
    }

    pub fn opt_string(&mut self, s: Option<&str>) -> &mut Self {
        self.string(s.unwrap_or(NONE_PLACEHOLDER))
    }

    pub fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Bounds-checked payload cursor.
///
/// `base` is the absolute stream offset of `bytes[0]`, so every error
/// reports where in the file it happened.
#[derive(Debug, Clone)]
pub struct PayloadReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    base: u64,
}

impl<'a> PayloadReader<'a> {
    pub fn new(bytes: &'a [u8], base: u64) -> Self {
        Self {
            bytes,
            pos: 0,
            base,
        }
    }

    /// Absolute offset of the next unread byte.
    pub fn offset(&self) -> u64 {
        self.base + self.pos as u64
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn error(&self, reason: impl Into<String>) -> FormatError {
        FormatError::malformed(self.offset(), reason)
    }

    pub fn take(&mut self, n: usize, what: &str) -> FormatResult<&'a [u8]> {
        if n > self.remaining() {
            return Err(self.error(format!(
                "{what}: need {n} bytes, {} left in payload",
                self.remaining()
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self, what: &str) -> FormatResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, what)?);
        Ok(out)
    }

    pub fn u8(&mut self, what: &str) -> FormatResult<u8> {
        Ok(self.array::<1>(what)?[0])
    }

    pub fn bool(&mut self, what: &str) -> FormatResult<bool> {
        Ok(self.u8(what)? != 0)
    }

    pub fn u32(&mut self, what: &str) -> FormatResult<u32> {
        self.array(what).map(u32::from_le_bytes)
    }

    pub fn f32(&mut self, what: &str) -> FormatResult<f32> {
        self.array(what).map(f32::from_le_bytes)
    }

    pub fn vec3(&mut self, what: &str) -> FormatResult<Vec3> {
        Ok(Vec3::new(self.f32(what)?, self.f32(what)?, self.f32(what)?))
    }

    pub fn mat4(&mut self, what: &str) -> FormatResult<Mat4> {
        let mut cols = [0f32; 16];
        for v in &mut cols {
            *v = self.f32(what)?;
        }
        Ok(Mat4::from_cols_array(&cols))
    }

    /// Read a NUL-terminated UTF-8 string.
    pub fn string(&mut self, what: &str) -> FormatResult<String> {
        let start = self.offset();
        let rest = &self.bytes[self.pos..];
        let Some(len) = rest.iter().position(|&b| b == 0) else {
            return Err(self.error(format!("{what}: unterminated string")));
        };
        let s = std::str::from_utf8(&rest[..len])
            .map_err(|_| FormatError::malformed(start, format!("{what}: invalid UTF-8")))?
            .to_owned();
        self.pos += len + 1;
        Ok(s)
    }

    /// Read a string, mapping the `[none]` placeholder to `None`.
    pub fn opt_string(&mut self, what: &str) -> FormatResult<Option<String>> {
        let s = self.string(what)?;
        Ok((s != NONE_PLACEHOLDER).then_some(s))
    }

    /// Read a `u32` element count and check that `count * elem_size` bytes
    /// can still follow, before anything is allocated.
    pub fn count(&mut self, elem_size: usize, what: &str) -> FormatResult<usize> {
        let at = self.offset();
        let n = self.u32(what)? as usize;
        let needed = n.checked_mul(elem_size).unwrap_or(usize::MAX);
        if needed > self.remaining() {
            return Err(FormatError::malformed(
                at,
                format!("{what}: count {n} exceeds payload"),
            ));
        }
        Ok(n)
    }

    /// Fail unless the payload was consumed exactly.
    pub fn finish(self, record: &str) -> FormatResult<()> {
        if self.remaining() != 0 {
            return Err(self.error(format!(
                "{record}: {} trailing bytes in payload",
                self.remaining()
            )));
        }
        Ok(())
    }
}
