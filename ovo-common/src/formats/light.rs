//! Light record
//!
//! # Layout (after the node header)
//! ```text
//! light_type   u8 (0 point, 1 directional, 2 spot)
//! color        vec3
//! intensity    f32
//! cast_shadows u8
//! volumetric   u8
//! point:       range f32
//! directional: direction vec3
//! spot:        range f32, direction vec3, cutoff_degrees f32, spot_exponent f32
//! ```

use glam::Vec3;

use super::cursor::{PayloadReader, PayloadWriter};
use super::node::NodeHeader;
use crate::error::FormatResult;

/// Largest spot cone half-angle the runtime supports, in degrees.
pub const MAX_SPOT_CUTOFF_DEGREES: f32 = 40.0;

/// Type-specific light parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightShape {
    Point {
        range: f32,
    },
    Directional {
        direction: Vec3,
    },
    Spot {
        range: f32,
        direction: Vec3,
        cutoff_degrees: f32,
        exponent: f32,
    },
}

impl LightShape {
    pub fn code(&self) -> u8 {
        match self {
            LightShape::Point { .. } => 0,
            LightShape::Directional { .. } => 1,
            LightShape::Spot { .. } => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LightChunk {
    pub node: NodeHeader,
    pub color: Vec3,
    pub intensity: f32,
    pub cast_shadows: bool,
    pub volumetric: bool,
    pub shape: LightShape,
}

/// Result of decoding a light chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum LightDecode {
    Light(LightChunk),
    /// The type code is not one this build knows. The node header is
    /// still valid so callers can keep the hierarchy intact.
    UnknownType { node: NodeHeader, code: u8 },
}

impl LightChunk {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = PayloadWriter::new();
        self.node.write(&mut w);
        w.u8(self.shape.code())
            .vec3(self.color)
            .f32(self.intensity)
            .bool(self.cast_shadows)
            .bool(self.volumetric);
        match self.shape {
            LightShape::Point { range } => {
                w.f32(range);
            }
            LightShape::Directional { direction } => {
                w.vec3(direction);
            }
            LightShape::Spot {
                range,
                direction,
                cutoff_degrees,
                exponent,
            } => {
                w.f32(range).vec3(direction).f32(cutoff_degrees).f32(exponent);
            }
        }
        w.finish()
    }

    pub fn decode(payload: &[u8], base: u64) -> FormatResult<LightDecode> {
        let mut r = PayloadReader::new(payload, base);
        let node = NodeHeader::read(&mut r)?;
        let code = r.u8("light type")?;
        if code > 2 {
            // Remaining bytes belong to a layout we cannot interpret
            return Ok(LightDecode::UnknownType { node, code });
        }
        let color = r.vec3("light color")?;
        let intensity = r.f32("light intensity")?;
        let cast_shadows = r.bool("cast shadows")?;
        let volumetric = r.bool("volumetric")?;
        let shape = match code {
            0 => LightShape::Point {
                range: r.f32("light range")?,
            },
            1 => LightShape::Directional {
                direction: r.vec3("light direction")?,
            },
            _ => LightShape::Spot {
                range: r.f32("light range")?,
                direction: r.vec3("light direction")?,
                cutoff_degrees: r.f32("spot cutoff")?,
                exponent: r.f32("spot exponent")?,
            },
        };
        r.finish("light")?;
        Ok(LightDecode::Light(Self {
            node,
            color,
            intensity,
            cast_shadows,
            volumetric,
            shape,
        }))
    }
}
