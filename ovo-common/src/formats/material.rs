//! Material record
//!
//! # Layout
//! ```text
//! name       string
//! emission   vec3
//! albedo     vec3
//! roughness  f32
//! metallic   f32
//! alpha      f32
//! slot_count u32
//! slots      { name string, mode u8, texture_index u32 } × slot_count
//! ```
//!
//! Slot `mode` is 0 for a path reference, 1 for embedded pixel data.

use glam::Vec3;

use super::cursor::{PayloadReader, PayloadWriter};
use crate::error::FormatResult;

/// Conventional slot names. Any other name is carried through unchanged.
pub const SLOT_ALBEDO: &str = "albedo";
pub const SLOT_NORMAL: &str = "normal";
pub const SLOT_HEIGHT: &str = "height";
pub const SLOT_ROUGHNESS: &str = "roughness";
pub const SLOT_METALNESS: &str = "metalness";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotMode {
    Reference,
    Embedded,
    /// Mode byte this build cannot interpret.
    Unknown(u8),
}

impl SlotMode {
    pub fn code(self) -> u8 {
        match self {
            SlotMode::Reference => 0,
            SlotMode::Embedded => 1,
            SlotMode::Unknown(code) => code,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0 => SlotMode::Reference,
            1 => SlotMode::Embedded,
            other => SlotMode::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlotRef {
    pub name: String,
    pub mode: SlotMode,
    pub texture_index: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterialChunk {
    pub name: String,
    pub emission: Vec3,
    pub albedo: Vec3,
    pub roughness: f32,
    pub metallic: f32,
    pub alpha: f32,
    pub slots: Vec<SlotRef>,
}

impl MaterialChunk {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = PayloadWriter::new();
        w.string(&self.name)
            .vec3(self.emission)
            .vec3(self.albedo)
            .f32(self.roughness)
            .f32(self.metallic)
            .f32(self.alpha)
            .u32(self.slots.len() as u32);
        for slot in &self.slots {
            w.string(&slot.name)
                .u8(slot.mode.code())
                .u32(slot.texture_index);
        }
        w.finish()
    }

    /// Decode, returning each slot's absolute offset alongside so callers
    /// can report slot-level problems precisely.
    pub fn decode(payload: &[u8], base: u64) -> FormatResult<(Self, Vec<u64>)> {
        let mut r = PayloadReader::new(payload, base);
        let name = r.string("material name")?;
        let emission = r.vec3("emission")?;
        let albedo = r.vec3("albedo")?;
        let roughness = r.f32("roughness")?;
        let metallic = r.f32("metallic")?;
        let alpha = r.f32("alpha")?;
        // Smallest slot: empty name terminator + mode + index
        let count = r.count(6, "slot count")?;
        let mut slots = Vec::with_capacity(count);
        let mut offsets = Vec::with_capacity(count);
        for _ in 0..count {
            offsets.push(r.offset());
            slots.push(SlotRef {
                name: r.string("slot name")?,
                mode: SlotMode::from_code(r.u8("slot mode")?),
                texture_index: r.u32("slot texture")?,
            });
        }
        r.finish("material")?;
        Ok((
            Self {
                name,
                emission,
                albedo,
                roughness,
                metallic,
                alpha,
                slots,
            },
            offsets,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_roundtrip_keeps_slot_order() {
        let mat = MaterialChunk {
            name: "brick".into(),
            emission: Vec3::ZERO,
            albedo: Vec3::new(0.8, 0.3, 0.2),
            roughness: 0.7,
            metallic: 0.0,
            alpha: 1.0,
            slots: vec![
                SlotRef {
                    name: SLOT_NORMAL.into(),
                    mode: SlotMode::Embedded,
                    texture_index: 1,
                },
                SlotRef {
                    name: SLOT_ALBEDO.into(),
                    mode: SlotMode::Reference,
                    texture_index: 0,
                },
            ],
        };
        let (decoded, offsets) = MaterialChunk::decode(&mat.encode(), 10).unwrap();
        assert_eq!(decoded, mat);
        assert_eq!(offsets.len(), 2);
        assert!(offsets[0] < offsets[1]);
    }

    #[test]
    fn test_unknown_mode_survives_decode() {
        assert_eq!(SlotMode::from_code(5), SlotMode::Unknown(5));
        assert_eq!(SlotMode::Unknown(5).code(), 5);
    }
}
