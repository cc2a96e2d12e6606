//! Light records ↔ light chunks.

use ovo_common::formats::{
    LightChunk, LightDecode, LightShape, MAX_SPOT_CUTOFF_DEGREES, NodeHeader,
};

use crate::config::OvoConfig;
use crate::error::{ExportError, ImportError};
use crate::report::{Report, Warning};
use crate::scene::{LightRecord, LightType};

/// Smallest spot cutoff written, in degrees.
const MIN_SPOT_CUTOFF_DEGREES: f32 = 0.1;

fn clamp_cutoff(node: &str, degrees: f32, report: &mut Report) -> f32 {
    if degrees > 0.0 && degrees <= MAX_SPOT_CUTOFF_DEGREES {
        return degrees;
    }
    let clamped = if degrees > MAX_SPOT_CUTOFF_DEGREES || degrees.is_nan() {
        MAX_SPOT_CUTOFF_DEGREES
    } else {
        MIN_SPOT_CUTOFF_DEGREES
    };
    report.push(Warning::Precision {
        context: format!("light '{node}'"),
        detail: format!("spot cutoff {degrees}° clamped to {clamped}°"),
    });
    clamped
}

pub fn encode_light(
    node: NodeHeader,
    light: &LightRecord,
    report: &mut Report,
) -> Result<LightChunk, ExportError> {
    let shape = match light.light_type {
        LightType::Point => LightShape::Point { range: light.range },
        LightType::Directional => LightShape::Directional {
            direction: light.direction,
        },
        LightType::Spot => LightShape::Spot {
            range: light.range,
            direction: light.direction,
            cutoff_degrees: clamp_cutoff(&node.name, light.cutoff_degrees, report),
            exponent: light.spot_exponent,
        },
        LightType::Area => {
            return Err(ExportError::UnsupportedLightType {
                light_type: light.light_type,
            });
        }
    };
    Ok(LightChunk {
        node,
        color: light.color,
        intensity: light.intensity,
        cast_shadows: light.cast_shadows,
        volumetric: light.volumetric,
        shape,
    })
}

/// Decode a light chunk. An unknown light type yields the node header with
/// no light (the caller keeps it as an empty node) unless `strict`.
pub fn decode_light(
    payload: &[u8],
    offset: u64,
    base: u64,
    config: &OvoConfig,
    report: &mut Report,
) -> Result<(NodeHeader, Option<LightRecord>), ImportError> {
    let chunk = match LightChunk::decode(payload, base)? {
        LightDecode::Light(chunk) => chunk,
        LightDecode::UnknownType { node, code } => {
            if config.strict {
                return Err(ImportError::UnsupportedLightType {
                    node: node.name,
                    code,
                    offset,
                });
            }
            report.push(Warning::UnsupportedSkipped {
                what: format!("light '{}'", node.name),
                detail: format!("type code {code}, kept as empty node"),
                offset,
            });
            return Ok((node, None));
        }
    };

    let mut light = LightRecord {
        color: chunk.color,
        intensity: chunk.intensity,
        cast_shadows: chunk.cast_shadows,
        volumetric: chunk.volumetric,
        ..Default::default()
    };
    match chunk.shape {
        LightShape::Point { range } => {
            light.light_type = LightType::Point;
            light.range = range;
        }
        LightShape::Directional { direction } => {
            light.light_type = LightType::Directional;
            light.direction = direction;
        }
        LightShape::Spot {
            range,
            direction,
            cutoff_degrees,
            exponent,
        } => {
            light.light_type = LightType::Spot;
            light.range = range;
            light.direction = direction;
            light.cutoff_degrees = cutoff_degrees;
            light.spot_exponent = exponent;
        }
    }
    Ok((chunk.node, Some(light)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, Vec3};
    use ovo_common::formats::PayloadWriter;

    fn header(name: &str) -> NodeHeader {
        NodeHeader {
            name: name.into(),
            parent: None,
            child_count: 0,
            transform: Mat4::IDENTITY,
        }
    }

    fn spot(cutoff: f32) -> LightRecord {
        LightRecord {
            light_type: LightType::Spot,
            direction: Vec3::NEG_Y,
            cutoff_degrees: cutoff,
            ..Default::default()
        }
    }

    #[test]
    fn test_spot_roundtrip() {
        let mut report = Report::new();
        let chunk = encode_light(header("lamp"), &spot(25.0), &mut report).unwrap();
        assert!(report.is_empty());

        let (node, light) =
            decode_light(&chunk.encode(), 0, 8, &OvoConfig::default(), &mut report).unwrap();
        assert_eq!(node.name, "lamp");
        assert_eq!(light.unwrap(), spot(25.0));
    }

    #[test]
    fn test_cutoff_clamped() {
        let mut report = Report::new();
        let chunk = encode_light(header("wide"), &spot(75.0), &mut report).unwrap();
        let LightShape::Spot { cutoff_degrees, .. } = chunk.shape else {
            panic!("expected spot");
        };
        assert_eq!(cutoff_degrees, MAX_SPOT_CUTOFF_DEGREES);

        let chunk = encode_light(header("shut"), &spot(-3.0), &mut report).unwrap();
        let LightShape::Spot { cutoff_degrees, .. } = chunk.shape else {
            panic!("expected spot");
        };
        assert!(cutoff_degrees > 0.0);
        assert_eq!(report.count(|w| matches!(w, Warning::Precision { .. })), 2);
    }

    #[test]
    fn test_area_rejected() {
        let area = LightRecord {
            light_type: LightType::Area,
            ..Default::default()
        };
        let err = encode_light(header("panel"), &area, &mut Report::new()).unwrap_err();
        assert!(matches!(
            err,
            ExportError::UnsupportedLightType {
                light_type: LightType::Area
            }
        ));
    }

    fn unknown_type_payload() -> Vec<u8> {
        let mut w = PayloadWriter::new();
        header("odd").write(&mut w);
        w.u8(9).f32(1.0).f32(2.0);
        w.finish()
    }

    #[test]
    fn test_unknown_type_demotes() {
        let mut report = Report::new();
        let (node, light) =
            decode_light(&unknown_type_payload(), 300, 308, &OvoConfig::default(), &mut report)
                .unwrap();
        assert_eq!(node.name, "odd");
        assert!(light.is_none());
        assert_eq!(
            report.count(|w| matches!(w, Warning::UnsupportedSkipped { offset: 300, .. })),
            1
        );
    }

    #[test]
    fn test_unknown_type_strict() {
        let strict = OvoConfig {
            strict: true,
            ..Default::default()
        };
        let err = decode_light(&unknown_type_payload(), 300, 308, &strict, &mut Report::new())
            .unwrap_err();
        assert!(matches!(
            err,
            ImportError::UnsupportedLightType {
                code: 9,
                offset: 300,
                ..
            }
        ));
    }
}
