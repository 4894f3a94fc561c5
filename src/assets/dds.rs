// DDS texture decoding
//
// Only the legacy header with DXT1/DXT3/DXT5 block compression is
// understood. Level data is returned as stored, ready to be copied into a
// buffer and uploaded to a BC-compressed image.

use crate::backend::image::mip_levels;
use anyhow::{Context, Result};
use ash::vk;
use std::path::Path;
use thiserror::Error;

const MAGIC: &[u8; 4] = b"DDS ";
const HEADER_SIZE: usize = 124;
const DATA_OFFSET: usize = MAGIC.len() + HEADER_SIZE;

// Offsets inside the 124-byte header
const HEIGHT_OFFSET: usize = 8;
const WIDTH_OFFSET: usize = 12;
const LINEAR_SIZE_OFFSET: usize = 16;
const MIP_COUNT_OFFSET: usize = 24;
const PIXEL_FORMAT_FLAGS_OFFSET: usize = 76;
const FOURCC_OFFSET: usize = 80;
const CAPS2_OFFSET: usize = 108;

const DDPF_ALPHAPIXELS: u32 = 0x1;
const DDSCAPS2_CUBEMAP: u32 = 0x200;

const FOURCC_DXT1: u32 = u32::from_le_bytes(*b"DXT1");
const FOURCC_DXT3: u32 = u32::from_le_bytes(*b"DXT3");
const FOURCC_DXT5: u32 = u32::from_le_bytes(*b"DXT5");

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DdsError {
    #[error("not a DDS file")]
    BadMagic,

    #[error("DDS data truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("{levels} mip levels declared, a {width}x{height} image has at most {max}")]
    TooManyLevels {
        levels: u32,
        max: u32,
        width: u32,
        height: u32,
    },

    #[error("unsupported DDS pixel format {0:#010x}, expected DXT1, DXT3 or DXT5")]
    UnsupportedFormat(u32),

    #[error("level {level} not available, the image has {levels} levels")]
    LevelOutOfRange { level: u32, levels: u32 },

    #[error("face {face} not available, the image has {faces} faces")]
    FaceOutOfRange { face: u32, faces: u32 },
}

/// Format and extent of one image level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

/// A decoded DDS file
#[derive(Debug, Clone)]
pub struct DdsImage {
    data: Vec<u8>,
    width: u32,
    height: u32,
    levels: u32,
    faces: u32,
    format: vk::Format,
}

impl DdsImage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data =
            std::fs::read(path).with_context(|| format!("Unable to read DDS file {:?}", path))?;
        let image = Self::from_bytes(data).with_context(|| format!("Invalid DDS file {:?}", path))?;

        log::debug!(
            "DDS {:?}: {}x{} {:?}, {} levels, {} faces",
            path,
            image.width,
            image.height,
            image.format,
            image.levels,
            image.faces
        );
        Ok(image)
    }

    pub fn from_bytes(data: Vec<u8>) -> Result<Self, DdsError> {
        if data.len() < MAGIC.len() || &data[..MAGIC.len()] != MAGIC {
            return Err(DdsError::BadMagic);
        }
        if data.len() < DATA_OFFSET {
            return Err(DdsError::Truncated {
                needed: DATA_OFFSET,
                available: data.len(),
            });
        }

        let header = &data[MAGIC.len()..DATA_OFFSET];
        let height = read_u32(header, HEIGHT_OFFSET);
        let width = read_u32(header, WIDTH_OFFSET);
        let linear_size = read_u32(header, LINEAR_SIZE_OFFSET);
        let levels = read_u32(header, MIP_COUNT_OFFSET).max(1);
        let pixel_flags = read_u32(header, PIXEL_FORMAT_FLAGS_OFFSET);
        let fourcc = read_u32(header, FOURCC_OFFSET);
        let caps2 = read_u32(header, CAPS2_OFFSET);

        let format = match fourcc {
            FOURCC_DXT1 if pixel_flags & DDPF_ALPHAPIXELS != 0 => vk::Format::BC1_RGBA_SRGB_BLOCK,
            FOURCC_DXT1 => vk::Format::BC1_RGB_SRGB_BLOCK,
            FOURCC_DXT3 => vk::Format::BC2_SRGB_BLOCK,
            FOURCC_DXT5 => vk::Format::BC3_SRGB_BLOCK,
            other => return Err(DdsError::UnsupportedFormat(other)),
        };

        let max_levels = mip_levels(width, height);
        if levels > max_levels {
            return Err(DdsError::TooManyLevels {
                levels,
                max: max_levels,
                width,
                height,
            });
        }

        let faces = if caps2 & DDSCAPS2_CUBEMAP != 0 { 6 } else { 1 };

        let image = Self {
            data,
            width,
            height,
            levels,
            faces,
            format,
        };

        let top_level = image.level_size(0)?;
        if linear_size != 0 && linear_size as usize != top_level {
            log::warn!(
                "DDS header linear size {} does not match computed size {}",
                linear_size,
                top_level
            );
        }

        Ok(image)
    }

    /// Info about the top level
    pub fn info(&self) -> ImageInfo {
        ImageInfo {
            format: self.format,
            extent: vk::Extent2D {
                width: self.width,
                height: self.height,
            },
        }
    }

    pub fn level_info(&self, level: u32) -> Result<ImageInfo, DdsError> {
        self.check_level(level)?;
        Ok(ImageInfo {
            format: self.format,
            extent: level_extent(self.width, self.height, level),
        })
    }

    pub fn level_count(&self) -> u32 {
        self.levels
    }

    pub fn face_count(&self) -> u32 {
        self.faces
    }

    pub fn is_cube_map(&self) -> bool {
        self.faces == 6
    }

    /// Compressed blocks of one level of one face
    pub fn face_level_data(&self, face: u32, level: u32) -> Result<&[u8], DdsError> {
        self.check_level(level)?;
        if face >= self.faces {
            return Err(DdsError::FaceOutOfRange {
                face,
                faces: self.faces,
            });
        }

        let face_size = self.levels_size(self.levels)?;
        let level_offset = self.levels_size(level)?;
        let start = (face as usize)
            .checked_mul(face_size)
            .and_then(|offset| offset.checked_add(DATA_OFFSET))
            .and_then(|offset| offset.checked_add(level_offset))
            .ok_or_else(|| self.overflow())?;
        let end = start
            .checked_add(self.level_size(level)?)
            .ok_or_else(|| self.overflow())?;

        self.data.get(start..end).ok_or(DdsError::Truncated {
            needed: end,
            available: self.data.len(),
        })
    }

    /// Total size of the first `count` levels of one face
    fn levels_size(&self, count: u32) -> Result<usize, DdsError> {
        (0..count).try_fold(0usize, |total, level| {
            total
                .checked_add(self.level_size(level)?)
                .ok_or_else(|| self.overflow())
        })
    }

    /// Sizes that do not fit in memory can never be backed by the file
    fn overflow(&self) -> DdsError {
        DdsError::Truncated {
            needed: usize::MAX,
            available: self.data.len(),
        }
    }

    fn check_level(&self, level: u32) -> Result<(), DdsError> {
        if level >= self.levels {
            return Err(DdsError::LevelOutOfRange {
                level,
                levels: self.levels,
            });
        }
        Ok(())
    }

    fn level_size(&self, level: u32) -> Result<usize, DdsError> {
        let extent = level_extent(self.width, self.height, level);
        compressed_size(extent.width, extent.height, block_size(self.format))
            .ok_or_else(|| self.overflow())
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn level_extent(width: u32, height: u32, level: u32) -> vk::Extent2D {
    vk::Extent2D {
        width: width.checked_shr(level).unwrap_or(0).max(1),
        height: height.checked_shr(level).unwrap_or(0).max(1),
    }
}

/// Bytes per 4x4 block
fn block_size(format: vk::Format) -> usize {
    match format {
        vk::Format::BC1_RGB_SRGB_BLOCK | vk::Format::BC1_RGBA_SRGB_BLOCK => 8,
        _ => 16,
    }
}

fn compressed_size(width: u32, height: u32, block_size: usize) -> Option<usize> {
    let blocks_wide = width.div_ceil(4).max(1) as usize;
    let blocks_high = height.div_ceil(4).max(1) as usize;
    blocks_wide.checked_mul(blocks_high)?.checked_mul(block_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(width: u32, height: u32, levels: u32, fourcc: &[u8; 4], flags: u32, caps2: u32) -> Vec<u8> {
        let mut bytes = vec![0u8; DATA_OFFSET];
        bytes[..4].copy_from_slice(MAGIC);
        let mut put = |offset: usize, value: u32| {
            bytes[4 + offset..8 + offset].copy_from_slice(&value.to_le_bytes());
        };
        put(0, HEADER_SIZE as u32);
        put(HEIGHT_OFFSET, height);
        put(WIDTH_OFFSET, width);
        put(MIP_COUNT_OFFSET, levels);
        put(PIXEL_FORMAT_FLAGS_OFFSET, flags | 0x4);
        put(FOURCC_OFFSET, u32::from_le_bytes(*fourcc));
        put(CAPS2_OFFSET, caps2);
        bytes
    }

    fn with_payload(mut bytes: Vec<u8>, len: usize) -> Vec<u8> {
        bytes.extend((0..len).map(|i| (i % 251) as u8));
        bytes
    }

    #[test]
    fn dxt_formats_map_to_srgb_block_formats() {
        let cases: [(&[u8; 4], u32, vk::Format); 4] = [
            (b"DXT1", 0, vk::Format::BC1_RGB_SRGB_BLOCK),
            (b"DXT1", DDPF_ALPHAPIXELS, vk::Format::BC1_RGBA_SRGB_BLOCK),
            (b"DXT3", 0, vk::Format::BC2_SRGB_BLOCK),
            (b"DXT5", 0, vk::Format::BC3_SRGB_BLOCK),
        ];
        for (fourcc, flags, expected) in cases {
            let image = DdsImage::from_bytes(header(8, 8, 1, fourcc, flags, 0)).unwrap();
            assert_eq!(image.info().format, expected);
        }
    }

    #[test]
    fn rejects_non_dds_data() {
        assert_eq!(
            DdsImage::from_bytes(b"PNG\0not a dds".to_vec()).unwrap_err(),
            DdsError::BadMagic
        );
        assert!(matches!(
            DdsImage::from_bytes(b"DDS \0\0".to_vec()).unwrap_err(),
            DdsError::Truncated { .. }
        ));
    }

    #[test]
    fn rejects_unknown_fourcc() {
        let err = DdsImage::from_bytes(header(4, 4, 1, b"ATI2", 0, 0)).unwrap_err();
        assert!(matches!(err, DdsError::UnsupportedFormat(_)));
    }

    #[test]
    fn level_extents_halve_down_to_one() {
        let image = DdsImage::from_bytes(header(16, 4, 5, b"DXT5", 0, 0)).unwrap();
        assert_eq!(image.level_count(), 5);
        assert_eq!(image.level_info(1).unwrap().extent, vk::Extent2D { width: 8, height: 2 });
        assert_eq!(image.level_info(4).unwrap().extent, vk::Extent2D { width: 1, height: 1 });
        assert_eq!(
            image.level_info(5).unwrap_err(),
            DdsError::LevelOutOfRange { level: 5, levels: 5 }
        );
    }

    #[test]
    fn level_data_follows_the_previous_levels() {
        // 8x8 DXT1: 4 blocks (32 bytes), then 4x4: 1 block (8 bytes)
        let image = DdsImage::from_bytes(with_payload(header(8, 8, 2, b"DXT1", 0, 0), 40)).unwrap();

        let level0 = image.face_level_data(0, 0).unwrap();
        let level1 = image.face_level_data(0, 1).unwrap();
        assert_eq!(level0.len(), 32);
        assert_eq!(level1.len(), 8);
        assert_eq!(level1[0], 32);
    }

    #[test]
    fn cube_maps_have_six_faces() {
        // 4x4 DXT5, one level: 16 bytes per face
        let bytes = with_payload(header(4, 4, 1, b"DXT5", 0, DDSCAPS2_CUBEMAP), 6 * 16);
        let image = DdsImage::from_bytes(bytes).unwrap();

        assert!(image.is_cube_map());
        assert_eq!(image.face_count(), 6);
        assert_eq!(image.face_level_data(5, 0).unwrap()[0], 80);
        assert_eq!(
            image.face_level_data(6, 0).unwrap_err(),
            DdsError::FaceOutOfRange { face: 6, faces: 6 }
        );
    }

    #[test]
    fn missing_payload_is_reported() {
        let image = DdsImage::from_bytes(with_payload(header(8, 8, 1, b"DXT3", 0, 0), 10)).unwrap();
        assert_eq!(
            image.face_level_data(0, 0).unwrap_err(),
            DdsError::Truncated {
                needed: DATA_OFFSET + 64,
                available: DATA_OFFSET + 10
            }
        );
    }

    #[test]
    fn mip_count_beyond_the_full_chain_is_rejected() {
        // 4x4 has levels 4x4, 2x2, 1x1
        assert_eq!(
            DdsImage::from_bytes(header(4, 4, 40, b"DXT5", 0, 0)).unwrap_err(),
            DdsError::TooManyLevels {
                levels: 40,
                max: 3,
                width: 4,
                height: 4
            }
        );
        assert!(DdsImage::from_bytes(header(4, 4, 3, b"DXT5", 0, 0)).is_ok());
    }

    #[test]
    fn huge_dimensions_report_missing_data() {
        let err = DdsImage::from_bytes(header(u32::MAX, u32::MAX, 1, b"DXT5", 0, 0)).unwrap_err();
        assert!(matches!(err, DdsError::Truncated { needed: usize::MAX, .. }));

        // One face fits in usize, the offset of the last cube face does not
        let bytes = header(1 << 31, 1 << 31, 1, b"DXT5", 0, DDSCAPS2_CUBEMAP);
        let image = DdsImage::from_bytes(bytes).unwrap();
        assert!(matches!(
            image.face_level_data(5, 0).unwrap_err(),
            DdsError::Truncated { needed: usize::MAX, .. }
        ));
    }

    #[test]
    fn levels_past_the_shift_width_stay_one_pixel() {
        assert_eq!(level_extent(u32::MAX, 1, 40), vk::Extent2D { width: 1, height: 1 });
        assert_eq!(compressed_size(u32::MAX, u32::MAX, 16), None);
    }

    #[test]
    fn zero_mip_count_means_one_level() {
        let image = DdsImage::from_bytes(header(4, 4, 0, b"DXT1", 0, 0)).unwrap();
        assert_eq!(image.level_count(), 1);
    }
}
