//! PNG encoding of rendered rasters.
//!
//! Supports two encoding modes:
//! - **Indexed PNG (color type 3)**: used when the raster has at most 256
//!   distinct colors, which is the common case for LUT mapped weather data.
//! - **RGBA PNG (color type 6)**: fallback for photographic imagery.
//!
//! Transparent pixels are written with alpha 0 in both modes.

use crate::raster::Raster;
use imagery_common::{Rgb, SynthError, SynthResult, RASTER_BPP};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::io::Write;

/// Maximum colors for indexed PNG (PNG8)
const MAX_PALETTE_SIZE: usize = 256;

/// Minimum pixels to benefit from parallel palette extraction
const PARALLEL_THRESHOLD: usize = 4096; // 64x64 or larger

const PNG_SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

/// Encode a raster, choosing indexed or RGBA output automatically.
pub fn encode_raster(raster: &Raster, compression: u32) -> SynthResult<Vec<u8>> {
    let pixels = raster.data();
    let palette = if raster.width() * raster.height() >= PARALLEL_THRESHOLD {
        extract_palette_parallel(pixels)
    } else {
        extract_palette_sequential(pixels)
    };

    match palette {
        Some((palette, indices)) => {
            encode_indexed(raster.width(), raster.height(), &palette, &indices, compression)
        }
        None => encode_rgba(raster, compression),
    }
}

/// Sequential palette extraction for small rasters.
fn extract_palette_sequential(pixels: &[u8]) -> Option<(Vec<Rgb>, Vec<u8>)> {
    let mut color_to_index: HashMap<Rgb, u8> = HashMap::with_capacity(MAX_PALETTE_SIZE);
    let mut palette: Vec<Rgb> = Vec::with_capacity(MAX_PALETTE_SIZE);
    let mut indices: Vec<u8> = Vec::with_capacity(pixels.len() / RASTER_BPP);

    for chunk in pixels.chunks_exact(RASTER_BPP) {
        let color = Rgb::from_slice(chunk);
        let index = match color_to_index.get(&color) {
            Some(&idx) => idx,
            None => {
                if palette.len() >= MAX_PALETTE_SIZE {
                    return None;
                }
                let idx = palette.len() as u8;
                palette.push(color);
                color_to_index.insert(color, idx);
                idx
            }
        };
        indices.push(index);
    }

    Some((palette, indices))
}

/// Parallel palette extraction for larger rasters.
///
/// Unique colors are first collected per chunk on the thread pool in first
/// occurrence order, merged in chunk order, then every pixel is mapped to its
/// palette index in parallel. The palette matches the sequential one.
fn extract_palette_parallel(pixels: &[u8]) -> Option<(Vec<Rgb>, Vec<u8>)> {
    let chunk_pixels = (pixels.len() / RASTER_BPP / rayon::current_num_threads()).max(256);
    let chunk_size = chunk_pixels * RASTER_BPP;

    let unique: Vec<Rgb> = pixels
        .par_chunks(chunk_size)
        .flat_map_iter(|chunk| {
            let mut seen: HashSet<Rgb> = HashSet::with_capacity(MAX_PALETTE_SIZE);
            let mut local: Vec<Rgb> = Vec::with_capacity(MAX_PALETTE_SIZE);
            for p in chunk.chunks_exact(RASTER_BPP) {
                let color = Rgb::from_slice(p);
                if seen.insert(color) {
                    local.push(color);
                }
                // Early exit once the chunk alone overflows the palette
                if local.len() > MAX_PALETTE_SIZE {
                    break;
                }
            }
            local
        })
        .collect();

    let mut global: HashMap<Rgb, u8> = HashMap::with_capacity(MAX_PALETTE_SIZE);
    let mut palette: Vec<Rgb> = Vec::with_capacity(MAX_PALETTE_SIZE);
    for color in unique {
        if !global.contains_key(&color) {
            if palette.len() >= MAX_PALETTE_SIZE {
                return None;
            }
            global.insert(color, palette.len() as u8);
            palette.push(color);
        }
    }

    let indices: Vec<u8> = pixels
        .par_chunks_exact(RASTER_BPP)
        .map(|p| global.get(&Rgb::from_slice(p)).copied().unwrap_or(0))
        .collect();

    Some((palette, indices))
}

/// Create an indexed PNG (color type 3) from palette and indices.
fn encode_indexed(
    width: usize,
    height: usize,
    palette: &[Rgb],
    indices: &[u8],
    compression: u32,
) -> SynthResult<Vec<u8>> {
    let mut png = Vec::new();
    png.extend_from_slice(&PNG_SIGNATURE);
    write_chunk(&mut png, b"IHDR", &ihdr(width, height, 3));

    let plte: Vec<u8> = palette.iter().flat_map(|c| c.to_bytes()).collect();
    write_chunk(&mut png, b"PLTE", &plte);

    // tRNS only when the sentinel is present
    if palette.iter().any(|c| c.is_transparent()) {
        let trns: Vec<u8> = palette
            .iter()
            .map(|c| if c.is_transparent() { 0 } else { 255 })
            .collect();
        write_chunk(&mut png, b"tRNS", &trns);
    }

    let idat = deflate_scanlines(indices, width, height, compression)?;
    write_chunk(&mut png, b"IDAT", &idat);
    write_chunk(&mut png, b"IEND", &[]);

    Ok(png)
}

/// Create an RGBA PNG (color type 6).
fn encode_rgba(raster: &Raster, compression: u32) -> SynthResult<Vec<u8>> {
    let rgba: Vec<u8> = raster
        .data()
        .chunks_exact(RASTER_BPP)
        .flat_map(|p| {
            let c = Rgb::from_slice(p);
            if c.is_transparent() {
                [0, 0, 0, 0]
            } else {
                [c.r, c.g, c.b, 255]
            }
        })
        .collect();

    let mut png = Vec::new();
    png.extend_from_slice(&PNG_SIGNATURE);
    write_chunk(&mut png, b"IHDR", &ihdr(raster.width(), raster.height(), 6));
    let idat = deflate_scanlines(&rgba, raster.width() * 4, raster.height(), compression)?;
    write_chunk(&mut png, b"IDAT", &idat);
    write_chunk(&mut png, b"IEND", &[]);

    Ok(png)
}

fn ihdr(width: usize, height: usize, color_type: u8) -> Vec<u8> {
    let mut data = Vec::with_capacity(13);
    data.extend_from_slice(&(width as u32).to_be_bytes());
    data.extend_from_slice(&(height as u32).to_be_bytes());
    data.push(8); // bit depth
    data.push(color_type);
    data.push(0); // compression method
    data.push(0); // filter method
    data.push(0); // interlace method
    data
}

/// Prefix each `row_bytes` scanline with filter type 0 and zlib compress.
fn deflate_scanlines(
    data: &[u8],
    row_bytes: usize,
    height: usize,
    compression: u32,
) -> SynthResult<Vec<u8>> {
    let mut uncompressed = Vec::with_capacity(height * (1 + row_bytes));
    for row in data.chunks_exact(row_bytes.max(1)).take(height) {
        uncompressed.push(0);
        uncompressed.extend_from_slice(row);
    }

    let mut encoder =
        flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::new(compression.min(9)));
    encoder
        .write_all(&uncompressed)
        .and_then(|_| encoder.finish())
        .map_err(|e| SynthError::Encode(format!("IDAT compression failed: {}", e)))
}

/// Write a PNG chunk
fn write_chunk(png: &mut Vec<u8>, chunk_type: &[u8; 4], data: &[u8]) {
    png.extend_from_slice(&(data.len() as u32).to_be_bytes());
    png.extend_from_slice(chunk_type);
    png.extend_from_slice(data);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(chunk_type);
    hasher.update(data);
    png.extend_from_slice(&hasher.finalize().to_be_bytes());
}
