//! LOD chain generation and validation.

use ovo_common::formats::Geometry;

use super::simplify::simplify;
use crate::error::ExportError;
use crate::scene::LodLevel;

/// Build up to `levels` simplified levels, each from the one before it.
///
/// Level `k` aims for `ceil(tris(k-1) × reduction)` triangles. The chain
/// ends early when a level cannot remove a single triangle (typically
/// because `max_error` stops the first collapse).
pub fn generate_chain(
    base: &Geometry,
    levels: u32,
    reduction: f32,
    max_error: f32,
) -> Vec<LodLevel> {
    let mut chain: Vec<LodLevel> = Vec::new();
    let mut accumulated = 0.0f32;

    for level in 1..=levels {
        let source = chain.last().map_or(base, |l| &l.geometry);
        let previous = source.triangle_count();
        let target = (previous as f64 * reduction as f64).ceil() as usize;
        let out = simplify(source, target, Some(max_error));

        let produced = out.geometry.triangle_count();
        if produced == 0 || produced >= previous {
            tracing::debug!("LOD {level}: no reduction possible from {previous} triangles");
            break;
        }
        accumulated += out.max_error;
        tracing::debug!(
            "LOD {level}: {previous} -> {produced} triangles (target {target}, error {accumulated:.5})"
        );
        chain.push(LodLevel {
            geometry: out.geometry,
            target_triangles: target as u32,
            error: accumulated,
        });
    }
    chain
}

/// Authored chains must never gain triangles from one level to the next.
pub fn validate_chain(base_triangles: usize, lods: &[LodLevel]) -> Result<(), ExportError> {
    let mut previous = base_triangles;
    for (i, lod) in lods.iter().enumerate() {
        let tris = lod.geometry.triangle_count();
        if tris > previous {
            return Err(ExportError::InvalidLodChain {
                reason: format!(
                    "level {} has {tris} triangles, more than the {previous} before it",
                    i + 1
                ),
            });
        }
        previous = tris;
    }
    Ok(())
}
