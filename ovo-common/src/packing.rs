//! Vertex attribute packing
//!
//! Converts f32 vertex attributes to the packed OVO vertex layout:
//! - f32 → snorm10 (10-10-10-2, layout of `glm::packSnorm3x10_1x2`)
//! - f32 → f16 (IEEE 754 binary16, via the `half` crate)
//!
//! # Error bounds
//!
//! | encoding | bound |
//! |----------|-------|
//! | snorm10  | ≤ 1/1022 absolute per component (step is 1/511) |
//! | f16      | ≤ 2⁻¹¹ relative for \|v\| ≥ 2⁻¹⁴, ≤ 2⁻²⁵ absolute below that |
//!
//! Packing never produces NaN or Inf for finite inputs. Inputs outside the
//! representable range are clamped and reported as a [`PackingIssue`] so the
//! caller can record the loss.

use glam::{Vec2, Vec3, Vec4};
use half::f16;

/// Largest finite binary16 value.
pub const HALF_MAX: f32 = 65504.0;

/// Largest positive snorm10 magnitude.
const SNORM10_SCALE: f32 = 511.0;
const SNORM10_MASK: u32 = 0x3FF;

/// Vertex attribute a packing issue refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    Position,
    Normal,
    Uv,
    Tangent,
}

impl std::fmt::Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Attribute::Position => "position",
            Attribute::Normal => "normal",
            Attribute::Uv => "uv",
            Attribute::Tangent => "tangent",
        };
        f.write_str(name)
    }
}

/// A value that could not be represented exactly and was replaced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackingIssue {
    pub attribute: Attribute,
    /// Component index (x = 0, y = 1, ...). `None` when the whole attribute
    /// was replaced, e.g. a zero-length normal.
    pub component: Option<usize>,
    pub value: f32,
    pub replaced_with: f32,
}

// ============================================================================
// snorm10 (10-10-10-2)
// ============================================================================

/// Convert f32 to a 10-bit two's complement signed normalized value.
///
/// Maps [-1.0, 1.0] to [-511, 511].
#[inline]
pub fn f32_to_snorm10(value: f32) -> u32 {
    let q = (value.clamp(-1.0, 1.0) * SNORM10_SCALE).round() as i32;
    (q as u32) & SNORM10_MASK
}

/// Decode a 10-bit two's complement signed normalized value.
#[inline]
pub fn snorm10_to_f32(bits: u32) -> f32 {
    // Sign-extend from bit 9
    let q = (((bits & SNORM10_MASK) << 22) as i32) >> 22;
    (q as f32 / SNORM10_SCALE).max(-1.0)
}

/// Encode a 2-bit signed normalized value (-1, 0 or +1).
#[inline]
fn f32_to_snorm2(value: f32) -> u32 {
    let q = value.clamp(-1.0, 1.0).round() as i32;
    (q as u32) & 0x3
}

#[inline]
fn snorm2_to_f32(bits: u32) -> f32 {
    let q = (((bits & 0x3) << 30) as i32) >> 30;
    (q as f32).max(-1.0)
}

/// Pack xyz as snorm10 and w as snorm2 into one u32.
///
/// Bit layout: x = 0..9, y = 10..19, z = 20..29, w = 30..31.
#[inline]
pub fn pack_snorm3x10_1x2(v: Vec4) -> u32 {
    f32_to_snorm10(v.x)
        | (f32_to_snorm10(v.y) << 10)
        | (f32_to_snorm10(v.z) << 20)
        | (f32_to_snorm2(v.w) << 30)
}

/// Inverse of [`pack_snorm3x10_1x2`].
#[inline]
pub fn unpack_snorm3x10_1x2(packed: u32) -> Vec4 {
    Vec4::new(
        snorm10_to_f32(packed),
        snorm10_to_f32(packed >> 10),
        snorm10_to_f32(packed >> 20),
        snorm2_to_f32(packed >> 30),
    )
}

// ============================================================================
// Direction packing
// ============================================================================

/// Normalize a direction for packing, falling back to `fallback` when the
/// input has no usable direction.
fn normalize_direction(
    dir: Vec3,
    fallback: Vec3,
    attribute: Attribute,
    issues: &mut Vec<PackingIssue>,
) -> Vec3 {
    if dir.is_finite() {
        if let Some(n) = dir.try_normalize() {
            return n;
        }
    }
    issues.push(PackingIssue {
        attribute,
        component: None,
        value: dir.length(),
        replaced_with: 1.0,
    });
    fallback
}

/// Pack a normal to snorm 10-10-10-2 with w = 0.
pub fn pack_normal(normal: Vec3, issues: &mut Vec<PackingIssue>) -> u32 {
    let n = normalize_direction(normal, Vec3::Y, Attribute::Normal, issues);
    pack_snorm3x10_1x2(n.extend(0.0))
}

/// Unpack a normal; the result is renormalized.
pub fn unpack_normal(packed: u32) -> Vec3 {
    unpack_snorm3x10_1x2(packed).truncate().normalize_or(Vec3::Y)
}

/// Pack a tangent (xyz direction, w handedness) to snorm 10-10-10-2.
///
/// Handedness is stored as snorm2: +1 → `0b01`, −1 → `0b11`.
pub fn pack_tangent(tangent: Vec4, issues: &mut Vec<PackingIssue>) -> u32 {
    let t = normalize_direction(tangent.truncate(), Vec3::X, Attribute::Tangent, issues);
    let handedness = if tangent.w < 0.0 { -1.0 } else { 1.0 };
    pack_snorm3x10_1x2(t.extend(handedness))
}

/// Unpack a tangent; xyz is renormalized, w is ±1.
pub fn unpack_tangent(packed: u32) -> Vec4 {
    let v = unpack_snorm3x10_1x2(packed);
    let w = if v.w < 0.0 { -1.0 } else { 1.0 };
    v.truncate().normalize_or(Vec3::X).extend(w)
}

// ============================================================================
// Half-float packing
// ============================================================================

/// Clamp a value into the finite binary16 range.
///
/// Returns the value to encode; NaN becomes 0.
#[inline]
pub fn sanitize_half(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(-HALF_MAX, HALF_MAX)
    }
}

/// Pack a UV pair as two f16 values: u in bits 0..15, v in bits 16..31.
pub fn pack_uv(uv: Vec2, issues: &mut Vec<PackingIssue>) -> u32 {
    let mut halves = [0u16; 2];
    for (i, value) in uv.to_array().into_iter().enumerate() {
        let safe = sanitize_half(value);
        if safe != value || value.is_nan() {
            issues.push(PackingIssue {
                attribute: Attribute::Uv,
                component: Some(i),
                value,
                replaced_with: safe,
            });
        }
        halves[i] = f16::from_f32(safe).to_bits();
    }
    (halves[0] as u32) | ((halves[1] as u32) << 16)
}

/// Inverse of [`pack_uv`].
pub fn unpack_uv(packed: u32) -> Vec2 {
    Vec2::new(
        f16::from_bits((packed & 0xFFFF) as u16).to_f32(),
        f16::from_bits((packed >> 16) as u16).to_f32(),
    )
}

// ============================================================================
// Position sanitizing
// ============================================================================

/// Replace non-finite position components (NaN → 0, ±Inf → ±f32::MAX).
pub fn sanitize_position(position: Vec3, issues: &mut Vec<PackingIssue>) -> Vec3 {
    if position.is_finite() {
        return position;
    }
    let mut out = position.to_array();
    for (i, c) in out.iter_mut().enumerate() {
        if c.is_finite() {
            continue;
        }
        let replaced = if c.is_nan() {
            0.0
        } else {
            f32::MAX.copysign(*c)
        };
        issues.push(PackingIssue {
            attribute: Attribute::Position,
            component: Some(i),
            value: *c,
            replaced_with: replaced,
        });
        *c = replaced;
    }
    Vec3::from_array(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snorm10_range() {
        assert_eq!(f32_to_snorm10(0.0), 0);
        assert_eq!(f32_to_snorm10(1.0), 511);
        // -511 in 10-bit two's complement
        assert_eq!(f32_to_snorm10(-1.0), 513);
        assert_eq!(snorm10_to_f32(513), -1.0);
        assert_eq!(snorm10_to_f32(511), 1.0);
    }

    #[test]
    fn test_snorm10_error_bound() {
        let bound = 1.0 / 1022.0 + f32::EPSILON;
        let mut v = -1.0f32;
        while v <= 1.0 {
            let decoded = snorm10_to_f32(f32_to_snorm10(v));
            assert!((decoded - v).abs() <= bound, "{v} -> {decoded}");
            v += 0.0137;
        }
    }

    #[test]
    fn test_snorm10_clamps_out_of_range() {
        assert_eq!(f32_to_snorm10(3.0), 511);
        assert_eq!(f32_to_snorm10(-7.5), 513);
    }

    #[test]
    fn test_normal_roundtrip() {
        let dirs = [
            Vec3::X,
            Vec3::NEG_Y,
            Vec3::Z,
            Vec3::new(0.577, 0.577, 0.577),
            Vec3::new(-0.3, 0.8, -0.52),
        ];
        let mut issues = Vec::new();
        for dir in dirs {
            let n = dir.normalize();
            let decoded = unpack_normal(pack_normal(n, &mut issues));
            assert!((decoded - n).length() < 0.005, "{n:?} -> {decoded:?}");
        }
        assert!(issues.is_empty());
    }

    #[test]
    fn test_zero_normal_falls_back() {
        let mut issues = Vec::new();
        let decoded = unpack_normal(pack_normal(Vec3::ZERO, &mut issues));
        assert_eq!(decoded, Vec3::Y);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].attribute, Attribute::Normal);
    }

    #[test]
    fn test_tangent_handedness() {
        let mut issues = Vec::new();
        let pos = unpack_tangent(pack_tangent(Vec4::new(1.0, 0.0, 0.0, 1.0), &mut issues));
        let neg = unpack_tangent(pack_tangent(Vec4::new(0.0, 0.0, 1.0, -1.0), &mut issues));
        assert_eq!(pos.w, 1.0);
        assert_eq!(neg.w, -1.0);
        assert!((neg.truncate() - Vec3::Z).length() < 0.005);
        let packed = pack_tangent(Vec4::new(0.0, 1.0, 0.0, -1.0), &mut issues);
        assert_eq!(packed >> 30, 0b11);
    }

    #[test]
    fn test_uv_half_error_bound() {
        let mut issues = Vec::new();
        for &(u, v) in &[(0.0, 1.0), (0.25, 0.75), (0.3333, 0.9001), (2.5, -1.25)] {
            let decoded = unpack_uv(pack_uv(Vec2::new(u, v), &mut issues));
            assert!((decoded.x - u).abs() <= u.abs().max(1.0) * 2f32.powi(-11));
            assert!((decoded.y - v).abs() <= v.abs().max(1.0) * 2f32.powi(-11));
        }
        assert!(issues.is_empty());
    }

    #[test]
    fn test_uv_out_of_range_is_clamped_and_reported() {
        let mut issues = Vec::new();
        let decoded = unpack_uv(pack_uv(Vec2::new(1.0e6, f32::NAN), &mut issues));
        assert_eq!(decoded, Vec2::new(HALF_MAX, 0.0));
        assert!(decoded.is_finite());
        assert_eq!(issues.len(), 2);
    }

    #[test]
    fn test_position_sanitize() {
        let mut issues = Vec::new();
        let p = sanitize_position(Vec3::new(1.0, f32::INFINITY, f32::NAN), &mut issues);
        assert_eq!(p, Vec3::new(1.0, f32::MAX, 0.0));
        assert_eq!(issues.len(), 2);

        issues.clear();
        let p = sanitize_position(Vec3::new(1.0, 2.0, 3.0), &mut issues);
        assert_eq!(p, Vec3::new(1.0, 2.0, 3.0));
        assert!(issues.is_empty());
    }
}
