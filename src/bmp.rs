//! BMP decoding for scanner output
//!
//! With raw normalization disabled, libinsane delivers black & white and
//! grayscale pages as uncompressed BMP streams. Those two layouts are
//! decoded here directly into a [`GrayImage`]; anything else (24-bit
//! colour, compressed data) goes through the `image` crate's BMP decoder.

use crate::{Error, Result};
use image::{DynamicImage, GrayImage};
use std::io::Read;

/// BITMAPFILEHEADER (14 bytes) followed by BITMAPINFOHEADER (40 bytes).
pub const HEADER_SIZE: usize = FILE_HEADER_SIZE + INFO_HEADER_SIZE;

const FILE_HEADER_SIZE: usize = 14;
const INFO_HEADER_SIZE: usize = 40;
const MAGIC: u16 = 0x4D42; // "BM"

/// Largest gap accepted between the fixed header and the pixel data: the
/// rest of a version 5 info header, three colour masks and a full
/// 256-entry palette.
pub const MAX_EXTRA_LEN: usize = (124 - INFO_HEADER_SIZE) + 3 * 4 + 256 * 4;

// Upper bound for buffers sized from header fields before any data is read.
pub(crate) const MAX_PREALLOC: usize = 16 * 1024 * 1024;

/// A BMP version 3 header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BmpHeader {
    pub magic: u16,
    pub file_size: u32,
    pub offset_to_data: u32,
    pub header_size: u32,
    /// Width in pixels, without scan-line padding.
    pub width: u32,
    /// Positive for bottom-up bitmaps, negative for top-down ones.
    pub height: i32,
    pub color_planes: u16,
    pub bits_per_pixel: u16,
    pub compression: u32,
    pub pixel_data_size: u32,
    pub horizontal_resolution: u32,
    pub vertical_resolution: u32,
    pub colors_in_palette: u32,
    pub important_colors: u32,
}

fn u16_at(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

impl BmpHeader {
    pub fn parse(bytes: &[u8; HEADER_SIZE]) -> Result<Self> {
        let header = BmpHeader {
            magic: u16_at(bytes, 0),
            file_size: u32_at(bytes, 2),
            offset_to_data: u32_at(bytes, 10),
            header_size: u32_at(bytes, 14),
            width: u32_at(bytes, 18),
            height: u32_at(bytes, 22) as i32,
            color_planes: u16_at(bytes, 26),
            bits_per_pixel: u16_at(bytes, 28),
            compression: u32_at(bytes, 30),
            pixel_data_size: u32_at(bytes, 34),
            horizontal_resolution: u32_at(bytes, 38),
            vertical_resolution: u32_at(bytes, 42),
            colors_in_palette: u32_at(bytes, 46),
            important_colors: u32_at(bytes, 50),
        };
        if header.magic != MAGIC {
            return Err(Error::Bmp(format!("bad magic {:#06x}", header.magic)));
        }
        Ok(header)
    }

    /// Read the header and whatever sits between it and the pixel data
    /// (the palette, for a version 3 header).
    ///
    /// Returns the header, and the raw bytes consumed so far.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<(Self, Vec<u8>)> {
        let mut fixed = [0u8; HEADER_SIZE];
        reader.read_exact(&mut fixed)?;
        let header = Self::parse(&fixed)?;
        tracing::debug!(?header, "header is read");

        let mut raw = fixed.to_vec();
        let extra = header.extra_len();
        if extra > MAX_EXTRA_LEN {
            return Err(Error::Bmp(format!(
                "pixel data offset {} is too far from the header",
                header.offset_to_data
            )));
        }
        if extra > 0 {
            tracing::debug!(palette_size = extra, "palette detected");
            reader.by_ref().take(extra as u64).read_to_end(&mut raw)?;
            if raw.len() != HEADER_SIZE + extra {
                return Err(Error::Bmp(format!(
                    "truncated palette: {} bytes, expected {extra}",
                    raw.len() - HEADER_SIZE
                )));
            }
        }
        Ok((header, raw))
    }

    fn extra_len(&self) -> usize {
        (self.offset_to_data as usize).saturating_sub(HEADER_SIZE)
    }

    pub fn is_top_down(&self) -> bool {
        self.height < 0
    }

    pub fn abs_height(&self) -> u32 {
        self.height.unsigned_abs()
    }

    /// Bytes per scan line, padded to a multiple of 4.
    pub fn stride(&self) -> usize {
        (self.width as usize * usize::from(self.bits_per_pixel)).div_ceil(32) * 4
    }

    /// Whether [`decode_gray`] handles this layout.
    pub fn is_plain_gray(&self) -> bool {
        matches!(self.bits_per_pixel, 1 | 8) && self.compression == 0
    }
}

/// Decode a whole BMP stream.
pub fn decode<R: Read>(mut reader: R) -> Result<DynamicImage> {
    let (header, raw) = BmpHeader::read_from(&mut reader)?;

    tracing::debug!("reading image data");
    let mut data = Vec::with_capacity((header.pixel_data_size as usize).min(MAX_PREALLOC));
    reader.read_to_end(&mut data)?;
    tracing::debug!(bytes = data.len(), "image data is read");

    if header.is_plain_gray() {
        let palette = if header.header_size as usize == INFO_HEADER_SIZE {
            &raw[HEADER_SIZE..]
        } else {
            &[]
        };
        return decode_gray(&header, palette, &data).map(DynamicImage::ImageLuma8);
    }

    let mut whole = raw;
    whole.extend_from_slice(&data);
    Ok(image::load_from_memory_with_format(
        &whole,
        image::ImageFormat::Bmp,
    )?)
}

/// Decode uncompressed 1-bit or 8-bit pixel data.
///
/// 8-bit values are taken as gray levels. 1-bit pixels (MSB first) use the
/// first two palette entries when present, otherwise bit 1 is white and
/// bit 0 black.
pub fn decode_gray(header: &BmpHeader, palette: &[u8], data: &[u8]) -> Result<GrayImage> {
    let width = header.width;
    let height = header.abs_height();
    let stride = header.stride();
    let needed = stride
        .checked_mul(height as usize)
        .ok_or_else(|| Error::Bmp(format!("{width}x{height} is too large")))?;
    if data.len() < needed {
        return Err(Error::Bmp(format!(
            "truncated pixel data: {} bytes, expected {needed}",
            data.len()
        )));
    }

    let levels = match header.bits_per_pixel {
        1 => Some([palette_gray(palette, 0, 0), palette_gray(palette, 1, 255)]),
        8 => None,
        bpp => return Err(Error::Bmp(format!("{bpp} bits per pixel"))),
    };

    let mut img = GrayImage::new(width, height);
    for y in 0..height {
        let src_row = if header.is_top_down() { y } else { height - y - 1 };
        let row = &data[src_row as usize * stride..][..stride];
        for x in 0..width {
            let luma = match levels {
                Some(levels) => {
                    let byte = row[x as usize / 8];
                    let bit = (byte >> (7 - x % 8)) & 1;
                    levels[usize::from(bit)]
                }
                None => row[x as usize],
            };
            img.put_pixel(x, y, image::Luma([luma]));
        }
    }
    Ok(img)
}

// Palette entries are BGRx quadruplets.
fn palette_gray(palette: &[u8], index: usize, fallback: u8) -> u8 {
    match palette.get(index * 4..index * 4 + 3) {
        Some(&[b, g, r]) => {
            ((u32::from(r) * 299 + u32::from(g) * 587 + u32::from(b) * 114) / 1000) as u8
        }
        _ => fallback,
    }
}
