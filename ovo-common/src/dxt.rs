//! Block decoding and block-level vertical flipping
//!
//! BC1 (DXT1) blocks are 8 bytes: two RGB565 endpoints then 16 × 2-bit
//! indices, one byte per pixel row. BC3 (DXT5) blocks prefix an 8-byte
//! alpha block: two alpha endpoints then 16 × 3-bit indices (12 bits per row).
//! BC5 is two such single-channel blocks (red, green). BC7 blocks are a
//! 128-bit stream whose layout depends on one of eight modes.
//!
//! Flipping compressed data reverses the order of block rows and the pixel
//! rows inside each block, so a flipped texture never has to be recompressed.
//! BC7 has no such shortcut; it is flipped as pixels before compression.

use crate::error::{FormatError, FormatResult};
use crate::formats::TextureCompression;

/// Decoded 4×4 block, row-major RGBA8.
pub type BlockPixels = [[u8; 4]; 16];

#[inline]
fn expand_565(c: u16) -> [u32; 3] {
    let r = ((c >> 11) & 0x1F) as u32;
    let g = ((c >> 5) & 0x3F) as u32;
    let b = (c & 0x1F) as u32;
    [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]
}

#[inline]
fn mix(a: [u32; 3], b: [u32; 3], wa: u32, wb: u32) -> [u8; 4] {
    let d = wa + wb;
    let c = |i: usize| ((a[i] * wa + b[i] * wb + d / 2) / d) as u8;
    [c(0), c(1), c(2), 255]
}

fn color_palette(block: &[u8], allow_transparent: bool) -> [[u8; 4]; 4] {
    let c0 = u16::from_le_bytes([block[0], block[1]]);
    let c1 = u16::from_le_bytes([block[2], block[3]]);
    let (e0, e1) = (expand_565(c0), expand_565(c1));
    let p0 = mix(e0, e1, 1, 0);
    let p1 = mix(e0, e1, 0, 1);
    if c0 > c1 || !allow_transparent {
        [p0, p1, mix(e0, e1, 2, 1), mix(e0, e1, 1, 2)]
    } else {
        [p0, p1, mix(e0, e1, 1, 1), [0, 0, 0, 0]]
    }
}

fn decode_color(block: &[u8], allow_transparent: bool) -> BlockPixels {
    let palette = color_palette(block, allow_transparent);
    let indices = u32::from_le_bytes([block[4], block[5], block[6], block[7]]);
    let mut out = [[0u8; 4]; 16];
    for (i, px) in out.iter_mut().enumerate() {
        *px = palette[((indices >> (2 * i)) & 0x3) as usize];
    }
    out
}

fn alpha_palette(a0: u8, a1: u8) -> [u8; 8] {
    let (a, b) = (a0 as u32, a1 as u32);
    let lerp = |wa: u32, wb: u32, d: u32| ((a * wa + b * wb + d / 2) / d) as u8;
    if a0 > a1 {
        [
            a0,
            a1,
            lerp(6, 1, 7),
            lerp(5, 2, 7),
            lerp(4, 3, 7),
            lerp(3, 4, 7),
            lerp(2, 5, 7),
            lerp(1, 6, 7),
        ]
    } else {
        [
            a0,
            a1,
            lerp(4, 1, 5),
            lerp(3, 2, 5),
            lerp(2, 3, 5),
            lerp(1, 4, 5),
            0,
            255,
        ]
    }
}

#[inline]
fn alpha_indices(block: &[u8]) -> u64 {
    let mut bits = [0u8; 8];
    bits[..6].copy_from_slice(&block[2..8]);
    u64::from_le_bytes(bits)
}

/// Decode one 8-byte BC1 block.
pub fn decode_bc1_block(block: &[u8; 8]) -> BlockPixels {
    decode_color(block, true)
}

/// Decode one 16-byte BC3 block.
pub fn decode_bc3_block(block: &[u8; 16]) -> BlockPixels {
    let mut out = decode_color(&block[8..], false);
    let palette = alpha_palette(block[0], block[1]);
    let indices = alpha_indices(block);
    for (i, px) in out.iter_mut().enumerate() {
        px[3] = palette[((indices >> (3 * i)) & 0x7) as usize];
    }
    out
}

/// Decode one 16-byte BC5 block.
///
/// Red and green hold a tangent-space normal's X and Y; blue is rebuilt as
/// `z = sqrt(1 - x² - y²)` so the result reads as a normal map.
pub fn decode_bc5_block(block: &[u8; 16]) -> BlockPixels {
    let red = decode_single_channel(&block[..8]);
    let green = decode_single_channel(&block[8..]);
    let mut out = [[0u8; 4]; 16];
    for (i, px) in out.iter_mut().enumerate() {
        *px = [red[i], green[i], reconstruct_z(red[i], green[i]), 255];
    }
    out
}

fn decode_single_channel(block: &[u8]) -> [u8; 16] {
    let palette = alpha_palette(block[0], block[1]);
    let indices = alpha_indices(block);
    let mut out = [0u8; 16];
    for (i, v) in out.iter_mut().enumerate() {
        *v = palette[((indices >> (3 * i)) & 0x7) as usize];
    }
    out
}

fn reconstruct_z(r: u8, g: u8) -> u8 {
    let x = r as f32 / 127.5 - 1.0;
    let y = g as f32 / 127.5 - 1.0;
    let z = (1.0 - x * x - y * y).max(0.0).sqrt();
    ((z + 1.0) * 127.5).round() as u8
}

/// Per-mode BC7 field widths.
struct Bc7Mode {
    subsets: usize,
    partition_bits: u32,
    rotation_bits: u32,
    index_selection_bits: u32,
    color_bits: u32,
    alpha_bits: u32,
    /// One p-bit per endpoint
    endpoint_pbits: bool,
    /// One p-bit per subset, shared by both endpoints
    shared_pbits: bool,
    index_bits: u32,
    index2_bits: u32,
}

#[allow(clippy::too_many_arguments)]
const fn mode(
    subsets: usize,
    partition_bits: u32,
    rotation_bits: u32,
    index_selection_bits: u32,
    color_bits: u32,
    alpha_bits: u32,
    endpoint_pbits: bool,
    shared_pbits: bool,
    index_bits: u32,
    index2_bits: u32,
) -> Bc7Mode {
    Bc7Mode {
        subsets,
        partition_bits,
        rotation_bits,
        index_selection_bits,
        color_bits,
        alpha_bits,
        endpoint_pbits,
        shared_pbits,
        index_bits,
        index2_bits,
    }
}

#[rustfmt::skip]
const BC7_MODES: [Bc7Mode; 8] = [
    mode(3, 4, 0, 0, 4, 0, true,  false, 3, 0),
    mode(2, 6, 0, 0, 6, 0, false, true,  3, 0),
    mode(3, 6, 0, 0, 5, 0, false, false, 2, 0),
    mode(2, 6, 0, 0, 7, 0, true,  false, 2, 0),
    mode(1, 0, 2, 1, 5, 6, false, false, 2, 3),
    mode(1, 0, 2, 0, 7, 8, false, false, 2, 2),
    mode(1, 0, 0, 0, 7, 7, true,  false, 4, 0),
    mode(2, 6, 0, 0, 5, 5, true,  false, 2, 0),
];

/// Two-subset partitions, bit `i` = subset of pixel `i`.
#[rustfmt::skip]
const BC7_PARTITIONS_2: [u16; 64] = [
    0xCCCC, 0x8888, 0xEEEE, 0xECC8, 0xC880, 0xFEEC, 0xFEC8, 0xEC80,
    0xC800, 0xFFEC, 0xFE80, 0xE800, 0xFFE8, 0xFF00, 0xFFF0, 0xF000,
    0xF710, 0x008E, 0x7100, 0x08CE, 0x008C, 0x7310, 0x3100, 0x8CCE,
    0x088C, 0x3110, 0x6666, 0x366C, 0x17E8, 0x0FF0, 0x718E, 0x399C,
    0xAAAA, 0xF0F0, 0x5A5A, 0x33CC, 0x3C3C, 0x55AA, 0x9696, 0xA55A,
    0x73CE, 0x13C8, 0x324C, 0x3BDC, 0x6996, 0xC33C, 0x9966, 0x0660,
    0x0272, 0x04E4, 0x4E40, 0x2720, 0xC936, 0x936C, 0x39C6, 0x639C,
    0x9336, 0x9CC6, 0x817E, 0xE718, 0xCCF0, 0x0FCC, 0x7744, 0xEE22,
];

/// Three-subset partitions, bits `2i..2i+2` = subset of pixel `i`.
#[rustfmt::skip]
const BC7_PARTITIONS_3: [u32; 64] = [
    0xAA685050, 0x6A5A5040, 0x5A5A4200, 0x5450A0A8, 0xA5A50000, 0xA0A05050, 0x5555A0A0, 0x5A5A5050,
    0xAA550000, 0xAA555500, 0xAAAA5500, 0x90909090, 0x94949494, 0xA4A4A4A4, 0xA9A59450, 0x2A0A4250,
    0xA5945040, 0x0A425054, 0xA5A5A500, 0x55A0A0A0, 0xA8A85454, 0x6A6A4040, 0xA4A45000, 0x1A1A0500,
    0x0050A4A4, 0xAAA59090, 0x14696914, 0x69691400, 0xA08585A0, 0xAA821414, 0x50A4A450, 0x6A5A0200,
    0xA9A58000, 0x5090A0A8, 0xA8A09050, 0x24242424, 0x00AA5500, 0x24924924, 0x24499224, 0x50A50A50,
    0x500AA550, 0xAAAA4444, 0x66660000, 0xA5A0A5A0, 0x50A050A0, 0x69286928, 0x44AAAA44, 0x66666600,
    0xAA444444, 0x54A854A8, 0x95809580, 0x96969600, 0xA85454A8, 0x80959580, 0xAA141414, 0x96960000,
    0xAAAA1414, 0xA05050A0, 0xA0A5A5A0, 0x96000000, 0x40804080, 0xA9A8A9A8, 0xAAAAAA44, 0x2A4A5254,
];

/// Anchor pixel of the second subset in two-subset partitions.
#[rustfmt::skip]
const BC7_ANCHOR_2: [u8; 64] = [
    15, 15, 15, 15, 15, 15, 15, 15, 15, 15, 15, 15, 15, 15, 15, 15,
    15,  2,  8,  2,  2,  8,  8, 15,  2,  8,  2,  2,  8,  8,  2,  2,
    15, 15,  6,  8,  2,  8, 15, 15,  2,  8,  2,  2,  2, 15, 15,  6,
     6,  2,  6,  8, 15, 15,  2,  2, 15, 15, 15, 15, 15,  2,  2, 15,
];

/// Anchor pixels of the second and third subsets in three-subset partitions.
#[rustfmt::skip]
const BC7_ANCHOR_3: [[u8; 2]; 64] = [
    [3, 15], [3, 8], [15, 8], [15, 3], [8, 15], [3, 15], [15, 3], [15, 8],
    [8, 15], [8, 15], [6, 15], [6, 15], [6, 15], [5, 15], [3, 15], [3, 8],
    [3, 15], [3, 8], [8, 15], [15, 3], [3, 15], [3, 8], [6, 15], [10, 8],
    [5, 3], [8, 15], [8, 6], [6, 10], [8, 15], [5, 15], [15, 10], [15, 8],
    [8, 15], [15, 3], [3, 15], [5, 10], [6, 10], [10, 8], [8, 9], [15, 10],
    [15, 6], [3, 15], [15, 8], [5, 15], [15, 3], [15, 6], [15, 6], [15, 8],
    [3, 15], [15, 3], [5, 15], [5, 15], [5, 15], [8, 15], [5, 15], [10, 15],
    [5, 15], [10, 15], [8, 15], [13, 15], [15, 3], [12, 15], [3, 15], [3, 8],
];

const BC7_WEIGHTS_2: [u32; 4] = [0, 21, 43, 64];
const BC7_WEIGHTS_3: [u32; 8] = [0, 9, 18, 27, 37, 46, 55, 64];
const BC7_WEIGHTS_4: [u32; 16] = [0, 4, 9, 13, 17, 21, 26, 30, 34, 38, 43, 47, 51, 55, 60, 64];

/// LSB-first reader over a 128-bit block.
struct BitReader(u128);

impl BitReader {
    fn take(&mut self, n: u32) -> u8 {
        let v = (self.0 & ((1u128 << n) - 1)) as u8;
        self.0 >>= n;
        v
    }
}

fn bc7_weight(bits: u32, index: u8) -> u32 {
    match bits {
        2 => BC7_WEIGHTS_2[index as usize],
        3 => BC7_WEIGHTS_3[index as usize],
        _ => BC7_WEIGHTS_4[index as usize],
    }
}

/// Widen a `precision`-bit endpoint to 8 bits by replicating its top bits.
fn bc7_expand(v: u8, precision: u32) -> u8 {
    let v = (v as u32) << (8 - precision);
    (v | (v >> precision)) as u8
}

fn bc7_interpolate(e0: u8, e1: u8, weight: u32) -> u8 {
    (((64 - weight) * e0 as u32 + weight * e1 as u32 + 32) >> 6) as u8
}

/// Decode one 16-byte BC7 block. The reserved mode 8 decodes to
/// transparent black.
pub fn decode_bc7_block(block: &[u8; 16]) -> BlockPixels {
    let Some(mode_index) = (0..8usize).find(|&m| block[0] & (1u8 << m) != 0) else {
        return [[0u8; 4]; 16];
    };
    let mode = &BC7_MODES[mode_index];
    let mut bits = BitReader(u128::from_le_bytes(*block));
    bits.take(mode_index as u32 + 1);

    let partition = bits.take(mode.partition_bits) as usize;
    let rotation = bits.take(mode.rotation_bits);
    let index_selection = bits.take(mode.index_selection_bits);

    // endpoints[subset][end] = RGBA at stored precision
    let mut endpoints = [[[0u8; 4]; 2]; 3];
    for channel in 0..3 {
        for subset in endpoints.iter_mut().take(mode.subsets) {
            for end in subset.iter_mut() {
                end[channel] = bits.take(mode.color_bits);
            }
        }
    }
    for subset in endpoints.iter_mut().take(mode.subsets) {
        for end in subset.iter_mut() {
            end[3] = bits.take(mode.alpha_bits);
        }
    }

    let mut color_precision = mode.color_bits;
    let mut alpha_precision = mode.alpha_bits;
    if mode.endpoint_pbits || mode.shared_pbits {
        let channels = if mode.alpha_bits > 0 { 4 } else { 3 };
        for subset in endpoints.iter_mut().take(mode.subsets) {
            let shared = if mode.shared_pbits { bits.take(1) } else { 0 };
            for end in subset.iter_mut() {
                let pbit = if mode.endpoint_pbits { bits.take(1) } else { shared };
                for v in end.iter_mut().take(channels) {
                    *v = (*v << 1) | pbit;
                }
            }
        }
        color_precision += 1;
        if mode.alpha_bits > 0 {
            alpha_precision += 1;
        }
    }
    for subset in endpoints.iter_mut().take(mode.subsets) {
        for end in subset.iter_mut() {
            for v in end.iter_mut().take(3) {
                *v = bc7_expand(*v, color_precision);
            }
            end[3] = if mode.alpha_bits > 0 {
                bc7_expand(end[3], alpha_precision)
            } else {
                255
            };
        }
    }

    let subset_of = |i: usize| -> usize {
        match mode.subsets {
            1 => 0,
            2 => ((BC7_PARTITIONS_2[partition] >> i) & 1) as usize,
            _ => ((BC7_PARTITIONS_3[partition] >> (2 * i)) & 3) as usize,
        }
    };
    let is_anchor = |i: usize| -> bool {
        i == 0
            || match mode.subsets {
                2 => i == BC7_ANCHOR_2[partition] as usize,
                3 => BC7_ANCHOR_3[partition].contains(&(i as u8)),
                _ => false,
            }
    };

    // Anchor indices drop their implicit zero top bit
    let mut primary = [0u8; 16];
    for (i, index) in primary.iter_mut().enumerate() {
        *index = bits.take(mode.index_bits - is_anchor(i) as u32);
    }
    let mut secondary = [0u8; 16];
    if mode.index2_bits > 0 {
        for (i, index) in secondary.iter_mut().enumerate() {
            *index = bits.take(mode.index2_bits - (i == 0) as u32);
        }
    }

    let (color_indices, color_bits, alpha_indices, alpha_bits) = if mode.index2_bits == 0 {
        (&primary, mode.index_bits, &primary, mode.index_bits)
    } else if index_selection == 0 {
        (&primary, mode.index_bits, &secondary, mode.index2_bits)
    } else {
        (&secondary, mode.index2_bits, &primary, mode.index_bits)
    };

    let mut out = [[0u8; 4]; 16];
    for (i, px) in out.iter_mut().enumerate() {
        let [e0, e1] = endpoints[subset_of(i)];
        let cw = bc7_weight(color_bits, color_indices[i]);
        let aw = bc7_weight(alpha_bits, alpha_indices[i]);
        *px = [
            bc7_interpolate(e0[0], e1[0], cw),
            bc7_interpolate(e0[1], e1[1], cw),
            bc7_interpolate(e0[2], e1[2], cw),
            bc7_interpolate(e0[3], e1[3], aw),
        ];
        match rotation {
            1 => px.swap(0, 3),
            2 => px.swap(1, 3),
            3 => px.swap(2, 3),
            _ => {}
        }
    }
    out
}

fn decode_block(block: &[u8], compression: TextureCompression) -> BlockPixels {
    if compression == TextureCompression::Dxt1 {
        let mut b = [0u8; 8];
        b.copy_from_slice(block);
        return decode_bc1_block(&b);
    }
    let mut b = [0u8; 16];
    b.copy_from_slice(block);
    match compression {
        TextureCompression::Bc7 => decode_bc7_block(&b),
        TextureCompression::Bc5 => decode_bc5_block(&b),
        _ => decode_bc3_block(&b),
    }
}

/// Decode texture data of any supported compression to RGBA8, cropped to
/// the logical `width × height`.
pub fn decode_to_rgba8(
    data: &[u8],
    width: u32,
    height: u32,
    compression: TextureCompression,
) -> FormatResult<Vec<u8>> {
    let expected = compression.data_size(width, height).ok_or_else(|| {
        FormatError::malformed(0, format!("texture size {width}x{height} overflows"))
    })?;
    if data.len() != expected {
        return Err(FormatError::malformed(
            0,
            format!(
                "{compression:?} data for {width}x{height} is {} bytes, expected {expected}",
                data.len()
            ),
        ));
    }
    let Some(block_size) = compression.block_size() else {
        return Ok(data.to_vec());
    };

    let (w, h) = (width as usize, height as usize);
    let blocks_x = w.div_ceil(4);
    let mut out = vec![0u8; w * h * 4];
    for (bi, block) in data.chunks_exact(block_size).enumerate() {
        let (bx, by) = (bi % blocks_x, bi / blocks_x);
        let pixels = decode_block(block, compression);
        for (i, px) in pixels.iter().enumerate() {
            let (x, y) = (bx * 4 + i % 4, by * 4 + i / 4);
            // Padding texels fall outside the logical image
            if x < w && y < h {
                let at = (y * w + x) * 4;
                out[at..at + 4].copy_from_slice(px);
            }
        }
    }
    Ok(out)
}

/// Reverse the four 2-bit index rows of a BC1 color block.
fn flip_color_block(block: &mut [u8]) {
    block[4..8].reverse();
}

/// Reverse the four 12-bit index rows of a BC3 alpha (or BC4) block.
fn flip_alpha_block(block: &mut [u8]) {
    let idx = alpha_indices(block);
    let mut flipped = 0u64;
    for row in 0..4 {
        let bits = (idx >> (12 * row)) & 0xFFF;
        flipped |= bits << (12 * (3 - row));
    }
    block[2..8].copy_from_slice(&flipped.to_le_bytes()[..6]);
}

/// Vertically flip block-compressed data without decoding it.
///
/// Only exact when the image height is a multiple of 4 (no padding rows);
/// returns `None` otherwise, or for uncompressed, BC7 or mis-sized data.
pub fn flip_blocks_vertically(
    data: &[u8],
    width: u32,
    height: u32,
    compression: TextureCompression,
) -> Option<Vec<u8>> {
    let block_size = compression.block_size()?;
    if compression == TextureCompression::Bc7
        || height % 4 != 0
        || data.len() != compression.data_size(width, height)?
    {
        return None;
    }
    let row_bytes = (width as usize).div_ceil(4) * block_size;
    let mut out = Vec::with_capacity(data.len());
    for row in data.chunks_exact(row_bytes).rev() {
        for block in row.chunks_exact(block_size) {
            let mut b = block.to_vec();
            match compression {
                TextureCompression::Dxt5 => {
                    flip_alpha_block(&mut b[..8]);
                    flip_color_block(&mut b[8..]);
                }
                TextureCompression::Bc5 => {
                    flip_alpha_block(&mut b[..8]);
                    flip_alpha_block(&mut b[8..]);
                }
                _ => flip_color_block(&mut b),
            }
            out.extend_from_slice(&b);
        }
    }
    Some(out)
}

/// Flip an RGBA8 image vertically in place.
pub fn flip_rows_rgba8(pixels: &mut [u8], width: u32, height: u32) {
    let row = width as usize * 4;
    let h = height as usize;
    if pixels.len() < row * h {
        return;
    }
    for y in 0..h / 2 {
        let (top, bottom) = pixels.split_at_mut((h - 1 - y) * row);
        top[y * row..(y + 1) * row].swap_with_slice(&mut bottom[..row]);
    }
}
