//! Reader for the IDX binary files MNIST ships in.
//!
//! # IDX3 image file layout
//! ```text
//! bytes  0-1:   0x00 0x00   (reserved, must be zero)
//! byte   2:     0x08        (dtype = uint8)
//! byte   3:     0x03        (number of dimensions = 3)
//! bytes  4-7:   N           (number of images, big-endian u32)
//! bytes  8-11:  rows        (image height in pixels, big-endian u32)
//! bytes 12-15:  cols        (image width in pixels, big-endian u32)
//! bytes 16..:   N * rows * cols bytes, row-major, uint8
//! ```
//!
//! # IDX1 label file layout
//! ```text
//! bytes  0-1:   0x00 0x00   (reserved, must be zero)
//! byte   2:     0x08        (dtype = uint8)
//! byte   3:     0x01        (number of dimensions = 1)
//! bytes  4-7:   N           (number of labels, big-endian u32)
//! bytes  8..:   N bytes, one class index each
//! ```

use crate::error::{Error, Result};

/// Raw images parsed from an IDX3 file.
#[derive(Debug, Clone, PartialEq)]
pub struct IdxImages {
    pub count: usize,
    pub rows: usize,
    pub cols: usize,
    /// `count * rows * cols` pixels, row-major.
    pub pixels: Vec<u8>,
}

fn read_u32(bytes: &[u8], offset: usize) -> usize {
    u32::from_be_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ]) as usize
}

fn check_header(bytes: &[u8], what: &str, header_len: usize, dims: u8) -> Result<()> {
    if bytes.len() < header_len {
        return Err(Error::dataset(format!(
            "IDX {} file too short: expected at least {} header bytes, got {}.",
            what, header_len, bytes.len()
        )));
    }
    if bytes[0] != 0x00 || bytes[1] != 0x00 {
        return Err(Error::dataset(format!(
            "IDX {} file: bytes 0-1 must be 0x00 0x00 (reserved), got 0x{:02X} 0x{:02X}.",
            what, bytes[0], bytes[1]
        )));
    }
    if bytes[2] != 0x08 {
        return Err(Error::dataset(format!(
            "IDX {} file: byte 2 (dtype) must be 0x08 (uint8), got 0x{:02X}.",
            what, bytes[2]
        )));
    }
    if bytes[3] != dims {
        return Err(Error::dataset(format!(
            "IDX {} file: byte 3 (dimensions) must be {}, got {}.",
            what, dims, bytes[3]
        )));
    }
    Ok(())
}

pub fn parse_images(bytes: &[u8]) -> Result<IdxImages> {
    check_header(bytes, "image", 16, 0x03)?;

    let count = read_u32(bytes, 4);
    let rows = read_u32(bytes, 8);
    let cols = read_u32(bytes, 12);

    let n_pixels = rows
        .checked_mul(cols)
        .and_then(|p| p.checked_mul(count))
        .ok_or_else(|| Error::dataset("IDX image file: pixel count overflows usize."))?;

    let end = n_pixels
        .checked_add(16)
        .ok_or_else(|| Error::dataset("IDX image file: pixel count overflows usize."))?;
    if bytes.len() < end {
        return Err(Error::dataset(format!(
            "IDX image file truncated: header declares {} images of {}×{} pixels, \
             but file is only {} bytes.",
            count, rows, cols, bytes.len()
        )));
    }

    Ok(IdxImages {
        count,
        rows,
        cols,
        pixels: bytes[16..end].to_vec(),
    })
}

pub fn parse_labels(bytes: &[u8]) -> Result<Vec<u8>> {
    check_header(bytes, "label", 8, 0x01)?;

    let count = read_u32(bytes, 4);
    let end = count
        .checked_add(8)
        .ok_or_else(|| Error::dataset("IDX label file: label count overflows usize."))?;
    if bytes.len() < end {
        return Err(Error::dataset(format!(
            "IDX label file truncated: header declares {} labels but file is only {} bytes.",
            count, bytes.len()
        )));
    }
    Ok(bytes[8..end].to_vec())
}
