//! Content fingerprinting.

use crate::ContentDigest;
use image::imageops::FilterType;
use sha2::{Digest, Sha256};

/// Edge length images are normalized to before block hashing.
const NORMALIZED_EDGE: u32 = 256;
/// Blocks per row and column.
const BLOCKS_PER_EDGE: u32 = 16;
const BLOCK_EDGE: u32 = NORMALIZED_EDGE / BLOCKS_PER_EDGE;
const BLOCK_COUNT: usize = (BLOCKS_PER_EDGE * BLOCKS_PER_EDGE) as usize;

/// SHA-256 of the raw bytes, lowercase hex.
pub(crate) fn exact_digest(bytes: &[u8]) -> ContentDigest {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    ContentDigest::new(format!("{:x}", hasher.finalize()))
}

/// Block-mean perceptual hash.
///
/// The image is decoded, converted to grayscale and resized to 256×256. Each
/// of the 16×16 blocks contributes one bit, set when the block's mean
/// brightness is at or above the median block mean. Re-encoding or small
/// scaling changes leave most bits intact.
///
/// Every block of a flat image equals the median, so all flat images share
/// the all-ones digest regardless of colour.
pub(crate) fn perceptual_digest(bytes: &[u8]) -> Result<ContentDigest, image::ImageError> {
    let gray = image::load_from_memory(bytes)?.to_luma8();
    let normalized = image::imageops::resize(
        &gray,
        NORMALIZED_EDGE,
        NORMALIZED_EDGE,
        FilterType::Triangle,
    );

    // Sums stand in for means; every block has the same pixel count.
    let mut sums = [0u32; BLOCK_COUNT];
    for (x, y, pixel) in normalized.enumerate_pixels() {
        let block = (y / BLOCK_EDGE) * BLOCKS_PER_EDGE + x / BLOCK_EDGE;
        sums[block as usize] += u32::from(pixel.0[0]);
    }

    let mut sorted = sums;
    sorted.sort_unstable();
    let median = (sorted[BLOCK_COUNT / 2 - 1] + sorted[BLOCK_COUNT / 2]) / 2;

    let mut bits = [0u8; BLOCK_COUNT / 8];
    for (i, sum) in sums.iter().enumerate() {
        if *sum >= median {
            bits[i / 8] |= 0x80 >> (i % 8);
        }
    }

    Ok(ContentDigest::new(
        bits.iter().map(|b| format!("{b:02x}")).collect::<String>(),
    ))
}
