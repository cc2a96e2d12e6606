//! Material records ↔ material chunks.

use hashbrown::HashSet;
use ovo_common::formats::{MaterialChunk, SlotMode, SlotRef};

use crate::config::OvoConfig;
use crate::error::{ExportError, ImportError};
use crate::report::{Report, Warning};
use crate::scene::{MaterialRecord, TextureAsset, TextureSlot};
use crate::texture::TextureManager;

/// Encode a material, resolving its texture slots through `textures`.
///
/// Texture chunks created on the way are queued in the manager; the caller
/// must write them before the material.
pub fn encode_material(
    material: &MaterialRecord,
    textures: &mut TextureManager<'_>,
    report: &mut Report,
) -> Result<MaterialChunk, ExportError> {
    let mut seen = HashSet::new();
    for slot in &material.slots {
        if !seen.insert(slot.name.as_str()) {
            return Err(ExportError::UnsupportedMaterialFeature {
                material: material.name.clone(),
                detail: format!("slot '{}' is bound more than once", slot.name),
            });
        }
    }

    let slots = material
        .slots
        .iter()
        .map(|slot| {
            let resolved = textures.resolve(slot, report);
            let context = format!("material '{}' slot", material.name);
            SlotRef {
                name: report.wire_name(&context, &slot.name),
                mode: resolved.mode,
                texture_index: resolved.index,
            }
        })
        .collect();

    Ok(MaterialChunk {
        name: report.wire_name("material", &material.name),
        emission: material.emission,
        albedo: material.albedo,
        roughness: material.roughness,
        metallic: material.metallic,
        alpha: material.alpha,
        slots,
    })
}

/// Turn a decoded material chunk back into a record.
///
/// `slot_offsets` are the absolute offsets returned by
/// [`MaterialChunk::decode`]; `textures` are the textures read so far.
pub fn decode_material(
    chunk: MaterialChunk,
    slot_offsets: &[u64],
    textures: &[TextureAsset],
    config: &OvoConfig,
    report: &mut Report,
) -> Result<MaterialRecord, ImportError> {
    let mut record = MaterialRecord::new(chunk.name);
    record.emission = chunk.emission;
    record.albedo = chunk.albedo;
    record.roughness = chunk.roughness;
    record.metallic = chunk.metallic;
    record.alpha = chunk.alpha;

    for (slot, &offset) in chunk.slots.into_iter().zip(slot_offsets) {
        let embedded = match slot.mode {
            SlotMode::Embedded => true,
            SlotMode::Reference => false,
            SlotMode::Unknown(code) => {
                let detail = format!("slot '{}' uses unknown mode {code}", slot.name);
                if config.strict {
                    return Err(ImportError::UnsupportedMaterialFeature {
                        material: record.name,
                        detail,
                        offset,
                    });
                }
                report.push(Warning::UnsupportedSkipped {
                    what: format!("material '{}' slot", record.name),
                    detail,
                    offset,
                });
                continue;
            }
        };

        let Some(texture) = textures.get(slot.texture_index as usize) else {
            return Err(ImportError::malformed(
                offset,
                format!(
                    "material '{}' slot '{}' references texture {} before it was defined",
                    record.name, slot.name, slot.texture_index
                ),
            ));
        };
        record.slots.push(TextureSlot {
            name: slot.name,
            path: texture.source_path.clone(),
            embed: Some(embedded),
            texture: Some(slot.texture_index),
        });
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::{MemoryTextureProvider, SourceImage};
    use glam::Vec3;
    use ovo_common::TextureCompression;

    fn asset(index: u32, path: &str) -> TextureAsset {
        TextureAsset {
            index,
            source_path: path.into(),
            width: 1,
            height: 1,
            channels: 4,
            compression: TextureCompression::Rgba8,
            flipped: false,
            placeholder: false,
            pixels: vec![0; 4],
        }
    }

    fn chunk(slots: Vec<SlotRef>) -> MaterialChunk {
        MaterialChunk {
            name: "stone".into(),
            emission: Vec3::ZERO,
            albedo: Vec3::ONE,
            roughness: 0.9,
            metallic: 0.0,
            alpha: 1.0,
            slots,
        }
    }

    fn slot(name: &str, mode: SlotMode, texture_index: u32) -> SlotRef {
        SlotRef {
            name: name.into(),
            mode,
            texture_index,
        }
    }

    #[test]
    fn test_encode_resolves_slots_in_order() {
        let provider = MemoryTextureProvider::new()
            .with("a.png", SourceImage::rgba8(1, 1, vec![1, 2, 3, 255]))
            .with("n.png", SourceImage::rgba8(1, 1, vec![128, 128, 255, 255]));
        let config = OvoConfig::default();
        let mut textures = TextureManager::new(&provider, &config);
        let mut material = MaterialRecord::new("stone");
        material.slots = vec![
            TextureSlot::new("normal", "n.png"),
            TextureSlot::new("albedo", "a.png"),
            TextureSlot::new("height", "n.png"),
        ];

        let chunk = encode_material(&material, &mut textures, &mut Report::new()).unwrap();
        let names: Vec<_> = chunk.slots.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["normal", "albedo", "height"]);
        let indices: Vec<_> = chunk.slots.iter().map(|s| s.texture_index).collect();
        assert_eq!(indices, [0, 1, 0]);
        assert_eq!(textures.drain_new().len(), 2);
    }

    #[test]
    fn test_encode_rejects_duplicate_slot() {
        let provider = MemoryTextureProvider::new();
        let config = OvoConfig::default();
        let mut textures = TextureManager::new(&provider, &config);
        let mut material = MaterialRecord::new("twice");
        material.slots = vec![
            TextureSlot::new("albedo", "a.png"),
            TextureSlot::new("albedo", "b.png"),
        ];
        let err = encode_material(&material, &mut textures, &mut Report::new()).unwrap_err();
        assert!(matches!(err, ExportError::UnsupportedMaterialFeature { .. }));
        assert_eq!(textures.texture_count(), 0);
    }

    #[test]
    fn test_decode_maps_textures() {
        let textures = [asset(0, "a.png")];
        let record = decode_material(
            chunk(vec![slot("albedo", SlotMode::Embedded, 0)]),
            &[100],
            &textures,
            &OvoConfig::default(),
            &mut Report::new(),
        )
        .unwrap();
        assert_eq!(record.roughness, 0.9);
        assert_eq!(record.slots[0].path, "a.png");
        assert_eq!(record.slots[0].embed, Some(true));
        assert_eq!(record.slots[0].texture, Some(0));
    }

    #[test]
    fn test_decode_unseen_texture_is_malformed() {
        let err = decode_material(
            chunk(vec![slot("albedo", SlotMode::Reference, 3)]),
            &[140],
            &[asset(0, "a.png")],
            &OvoConfig::default(),
            &mut Report::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ImportError::MalformedStream { offset: 140, .. }));
    }

    #[test]
    fn test_decode_unknown_mode() {
        let textures = [asset(0, "a.png")];
        let slots = || {
            vec![
                slot("albedo", SlotMode::Unknown(7), 0),
                slot("normal", SlotMode::Reference, 0),
            ]
        };

        let mut report = Report::new();
        let record = decode_material(
            chunk(slots()),
            &[10, 20],
            &textures,
            &OvoConfig::default(),
            &mut report,
        )
        .unwrap();
        assert_eq!(record.slots.len(), 1);
        assert_eq!(record.slots[0].name, "normal");
        assert_eq!(
            report.count(|w| matches!(w, Warning::UnsupportedSkipped { offset: 10, .. })),
            1
        );

        let strict = OvoConfig {
            strict: true,
            ..Default::default()
        };
        let err =
            decode_material(chunk(slots()), &[10, 20], &textures, &strict, &mut Report::new())
                .unwrap_err();
        assert!(matches!(
            err,
            ImportError::UnsupportedMaterialFeature { offset: 10, .. }
        ));
    }
}
