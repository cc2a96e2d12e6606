//! Chunk framing
//!
//! An OVO body is a flat sequence of chunks following the file header.
//!
//! # Layout
//! ```text
//! 0x00: kind    u16
//! 0x02: flags   u16 (presence flags, meaning depends on kind)
//! 0x04: length  u32 (payload byte length)
//! 0x08: payload [u8; length]
//! ```

use std::io::{self, Read, Write};

use crate::error::{FormatError, FormatResult};

/// Chunk kind codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkKind {
    Node,
    Texture,
    Material,
    Light,
    Bone,
    Mesh,
    Physics,
    Lod,
    /// Well-formed chunk of a kind this build does not interpret.
    Unknown(u16),
}

impl ChunkKind {
    pub fn code(self) -> u16 {
        match self {
            ChunkKind::Node => 1,
            ChunkKind::Texture => 7,
            ChunkKind::Material => 9,
            ChunkKind::Light => 16,
            ChunkKind::Bone => 17,
            ChunkKind::Mesh => 18,
            ChunkKind::Physics => 24,
            ChunkKind::Lod => 26,
            ChunkKind::Unknown(code) => code,
        }
    }

    pub fn from_code(code: u16) -> Self {
        match code {
            1 => ChunkKind::Node,
            7 => ChunkKind::Texture,
            9 => ChunkKind::Material,
            16 => ChunkKind::Light,
            17 => ChunkKind::Bone,
            18 => ChunkKind::Mesh,
            24 => ChunkKind::Physics,
            26 => ChunkKind::Lod,
            other => ChunkKind::Unknown(other),
        }
    }

    /// Chunk kinds that introduce a scene node.
    pub fn is_node(self) -> bool {
        matches!(
            self,
            ChunkKind::Node | ChunkKind::Light | ChunkKind::Bone | ChunkKind::Mesh
        )
    }
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkKind::Unknown(code) => write!(f, "unknown({code})"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Chunk header (8 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub kind: ChunkKind,
    pub flags: u16,
    pub length: u32,
}

impl ChunkHeader {
    pub const SIZE: usize = 8;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..2].copy_from_slice(&self.kind.code().to_le_bytes());
        bytes[2..4].copy_from_slice(&self.flags.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.length.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            kind: ChunkKind::from_code(u16::from_le_bytes([bytes[0], bytes[1]])),
            flags: u16::from_le_bytes([bytes[2], bytes[3]]),
            length: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }
}

/// Write one chunk (header + payload).
pub fn write_chunk<W: Write>(
    w: &mut W,
    kind: ChunkKind,
    flags: u16,
    payload: &[u8],
) -> io::Result<()> {
    let length = u32::try_from(payload.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{kind} chunk payload exceeds 4 GiB"),
        )
    })?;
    let header = ChunkHeader {
        kind,
        flags,
        length,
    };
    w.write_all(&header.to_bytes())?;
    w.write_all(payload)
}

/// A chunk as read from the stream, payload not yet interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChunk {
    pub kind: ChunkKind,
    pub flags: u16,
    /// Absolute offset of the chunk header.
    pub offset: u64,
    pub payload: Vec<u8>,
}

impl RawChunk {
    /// Absolute offset of the first payload byte.
    pub fn payload_offset(&self) -> u64 {
        self.offset + ChunkHeader::SIZE as u64
    }

    pub fn has_flag(&self, flag: u16) -> bool {
        self.flags & flag != 0
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_chunk(w, self.kind, self.flags, &self.payload)
    }
}

/// Lazy single-pass iterator over the chunks of a stream.
///
/// Yields `Err` once and then stops on the first framing error.
pub struct ChunkReader<R> {
    inner: R,
    offset: u64,
    done: bool,
}

impl<R: Read> ChunkReader<R> {
    /// `start_offset` is the absolute position of `inner` in the file
    /// (normally [`OvoFileHeader::SIZE`](super::OvoFileHeader::SIZE)).
    pub fn new(inner: R, start_offset: u64) -> Self {
        Self {
            inner,
            offset: start_offset,
            done: false,
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn read_header(&mut self) -> FormatResult<Option<ChunkHeader>> {
        let mut buf = [0u8; ChunkHeader::SIZE];
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        match filled {
            0 => Ok(None),
            n if n < ChunkHeader::SIZE => Err(FormatError::malformed(
                self.offset,
                format!("truncated chunk header ({n} of {} bytes)", ChunkHeader::SIZE),
            )),
            _ => Ok(ChunkHeader::from_bytes(&buf)),
        }
    }

    fn next_chunk(&mut self) -> FormatResult<Option<RawChunk>> {
        let Some(header) = self.read_header()? else {
            return Ok(None);
        };
        let offset = self.offset;

        // Bounded read: a corrupt length cannot force a huge allocation
        let mut payload = Vec::new();
        (&mut self.inner)
            .take(header.length as u64)
            .read_to_end(&mut payload)?;
        if payload.len() != header.length as usize {
            return Err(FormatError::malformed(
                offset,
                format!(
                    "{} chunk declares {} payload bytes, only {} remain",
                    header.kind,
                    header.length,
                    payload.len()
                ),
            ));
        }

        self.offset += ChunkHeader::SIZE as u64 + header.length as u64;
        Ok(Some(RawChunk {
            kind: header.kind,
            flags: header.flags,
            offset,
            payload,
        }))
    }
}

impl<R: Read> Iterator for ChunkReader<R> {
    type Item = FormatResult<RawChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_chunk() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(chunks: &[(ChunkKind, u16, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (kind, flags, payload) in chunks {
            write_chunk(&mut out, *kind, *flags, payload).unwrap();
        }
        out
    }

    #[test]
    fn test_kind_codes() {
        for kind in [
            ChunkKind::Node,
            ChunkKind::Texture,
            ChunkKind::Material,
            ChunkKind::Light,
            ChunkKind::Bone,
            ChunkKind::Mesh,
            ChunkKind::Physics,
            ChunkKind::Lod,
        ] {
            assert_eq!(ChunkKind::from_code(kind.code()), kind);
        }
        assert_eq!(ChunkKind::from_code(99), ChunkKind::Unknown(99));
        assert_eq!(ChunkKind::Unknown(99).code(), 99);
    }

    #[test]
    fn test_reader_yields_chunks_with_offsets() {
        let bytes = stream(&[
            (ChunkKind::Node, 0, b"abc"),
            (ChunkKind::Unknown(300), 5, b""),
            (ChunkKind::Mesh, 2, &[9; 10]),
        ]);
        let chunks: Vec<_> = ChunkReader::new(bytes.as_slice(), 24)
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].offset, 24);
        assert_eq!(chunks[0].payload, b"abc");
        assert_eq!(chunks[1].offset, 24 + 8 + 3);
        assert_eq!(chunks[1].kind, ChunkKind::Unknown(300));
        assert_eq!(chunks[1].flags, 5);
        assert_eq!(chunks[2].offset, 24 + 8 + 3 + 8);
        assert_eq!(chunks[2].payload_offset(), chunks[2].offset + 8);
        assert!(chunks[2].has_flag(2));
    }

    #[test]
    fn test_truncated_header() {
        let mut bytes = stream(&[(ChunkKind::Node, 0, b"xy")]);
        bytes.extend_from_slice(&[18, 0, 0]);
        let results: Vec<_> = ChunkReader::new(bytes.as_slice(), 0).collect();

        assert_eq!(results.len(), 2);
        let err = results[1].as_ref().unwrap_err();
        assert_eq!(err.offset(), Some(10));
    }

    #[test]
    fn test_overlong_length() {
        let mut bytes = ChunkHeader {
            kind: ChunkKind::Mesh,
            flags: 0,
            length: u32::MAX,
        }
        .to_bytes()
        .to_vec();
        bytes.extend_from_slice(&[0; 16]);

        let mut reader = ChunkReader::new(bytes.as_slice(), 24);
        let err = reader.next().unwrap().unwrap_err();
        assert_eq!(err.offset(), Some(24));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_raw_chunk_rewrite_is_identical() {
        let bytes = stream(&[(ChunkKind::Unknown(77), 3, b"payload")]);
        let chunk = ChunkReader::new(bytes.as_slice(), 0)
            .next()
            .unwrap()
            .unwrap();
        let mut out = Vec::new();
        chunk.write_to(&mut out).unwrap();
        assert_eq!(out, bytes);
    }
}
