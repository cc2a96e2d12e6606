//! RGBA8 normalization and block compression (S3TC, BC7, BC5).

use ovo_common::TextureCompression;

use super::SourceImage;

/// Placeholder colour for unresolved textures.
pub const PLACEHOLDER_RGBA: [u8; 4] = [255, 0, 255, 255];
pub const PLACEHOLDER_SIZE: u32 = 4;

/// Expand 1-4 channel pixels to RGBA8.
///
/// Returns `None` when the buffer does not match the declared dimensions.
pub fn to_rgba8(image: &SourceImage) -> Option<Vec<u8>> {
    let ch = image.channels as usize;
    let count = image.width as usize * image.height as usize;
    if !(1..=4).contains(&ch) || image.pixels.len() != count * ch {
        return None;
    }
    if ch == 4 {
        return Some(image.pixels.clone());
    }
    let mut out = Vec::with_capacity(count * 4);
    for px in image.pixels.chunks_exact(ch) {
        let rgba = match ch {
            1 => [px[0], px[0], px[0], 255],
            2 => [px[0], px[0], px[0], px[1]],
            _ => [px[0], px[1], px[2], 255],
        };
        out.extend_from_slice(&rgba);
    }
    Some(out)
}

/// DXT5 when the source carries alpha that is actually used, DXT1 otherwise.
pub fn choose_block_format(channels: u8, rgba: &[u8]) -> TextureCompression {
    let has_alpha_channel = channels == 2 || channels == 4;
    if has_alpha_channel && rgba.chunks_exact(4).any(|px| px[3] < 255) {
        TextureCompression::Dxt5
    } else {
        TextureCompression::Dxt1
    }
}

/// BC5 for normal maps, BC7 for everything else.
pub fn choose_modern_format(normal_map: bool) -> TextureCompression {
    if normal_map {
        TextureCompression::Bc5
    } else {
        TextureCompression::Bc7
    }
}

/// Pad an RGBA8 image to whole 4×4 blocks by replicating edge pixels.
///
/// Returns the (possibly unchanged) buffer and its padded dimensions.
pub fn pad_to_blocks(pixels: &[u8], width: u32, height: u32) -> (Vec<u8>, u32, u32) {
    let (w, h) = (width as usize, height as usize);
    let padded_width = w.div_ceil(4) * 4;
    let padded_height = h.div_ceil(4) * 4;
    if w == padded_width && h == padded_height {
        return (pixels.to_vec(), width, height);
    }

    let mut padded = vec![0u8; padded_width * padded_height * 4];
    for y in 0..padded_height {
        for x in 0..padded_width {
            let src_x = x.min(w - 1);
            let src_y = y.min(h - 1);

            let src_idx = (src_y * w + src_x) * 4;
            let dst_idx = (y * padded_width + x) * 4;

            padded[dst_idx..dst_idx + 4].copy_from_slice(&pixels[src_idx..src_idx + 4]);
        }
    }
    (padded, padded_width as u32, padded_height as u32)
}

/// Compress RGBA8 pixels with intel_tex_2 (ISPC kernels).
///
/// Pads to whole blocks first; `Rgba8` returns the pixels unchanged. BC5
/// keeps only the red and green channels.
pub fn compress_rgba8(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: TextureCompression,
) -> Vec<u8> {
    let output_size = format.data_size(width, height).unwrap_or(0);
    if format == TextureCompression::Rgba8 || output_size == 0 {
        return pixels.to_vec();
    }
    let (input, padded_width, padded_height) = pad_to_blocks(pixels, width, height);
    let mut output = vec![0u8; output_size];

    if format == TextureCompression::Bc5 {
        let rg: Vec<u8> = input.chunks_exact(4).flat_map(|px| [px[0], px[1]]).collect();
        let surface = intel_tex_2::RgSurface {
            width: padded_width,
            height: padded_height,
            stride: padded_width * 2,
            data: &rg,
        };
        intel_tex_2::bc5::compress_blocks_into(&surface, &mut output);
        return output;
    }

    let surface = intel_tex_2::RgbaSurface {
        width: padded_width,
        height: padded_height,
        stride: padded_width * 4,
        data: &input,
    };
    match format {
        TextureCompression::Dxt1 => intel_tex_2::bc1::compress_blocks_into(&surface, &mut output),
        TextureCompression::Bc7 => {
            use intel_tex_2::bc7;
            let settings = if input.chunks_exact(4).any(|px| px[3] < 255) {
                bc7::alpha_fast_settings()
            } else {
                bc7::opaque_fast_settings()
            };
            bc7::compress_blocks_into(&settings, &surface, &mut output)
        }
        _ => intel_tex_2::bc3::compress_blocks_into(&surface, &mut output),
    }
    output
}

/// Solid magenta RGBA8 image written for missing sources.
pub fn placeholder() -> SourceImage {
    let n = (PLACEHOLDER_SIZE * PLACEHOLDER_SIZE) as usize;
    SourceImage::rgba8(
        PLACEHOLDER_SIZE,
        PLACEHOLDER_SIZE,
        PLACEHOLDER_RGBA.repeat(n),
    )
}
