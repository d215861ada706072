use std::fmt;
use std::ops::Deref;

use image::GrayImage;
use subtitle_wer_types::{OcrRegion, YPlaneFrame};

use crate::error::OcrError;

/// Immutable view over a Y (luminance) plane.
#[derive(Clone)]
pub struct LumaPlane<'a> {
    width: u32,
    height: u32,
    stride: usize,
    data: &'a [u8],
}

impl<'a> LumaPlane<'a> {
    pub fn from_parts(
        width: u32,
        height: u32,
        stride: usize,
        data: &'a [u8],
    ) -> Result<Self, OcrError> {
        let required = stride
            .checked_mul(height as usize)
            .ok_or(OcrError::PlaneOverflow { stride, height })?;
        if data.len() < required {
            return Err(OcrError::InsufficientPlaneData {
                provided: data.len(),
                required,
            });
        }
        Ok(Self {
            width,
            height,
            stride,
            data: &data[..required],
        })
    }

    pub fn from_frame(frame: &'a YPlaneFrame) -> Self {
        // YPlaneFrame validates stride * height on construction.
        Self {
            width: frame.width(),
            height: frame.height(),
            stride: frame.stride(),
            data: frame.data(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Copies `region` (rounded outwards to whole pixels) into a tightly packed image.
    pub fn crop(&self, region: &OcrRegion) -> Result<GrayImage, OcrError> {
        let out_of_bounds = || OcrError::RegionOutOfBounds {
            region: format!(
                "{},{},{},{}",
                region.x, region.y, region.width, region.height
            ),
            width: self.width,
            height: self.height,
        };
        if !(region.x >= 0.0 && region.y >= 0.0 && region.width > 0.0 && region.height > 0.0) {
            return Err(out_of_bounds());
        }
        let x = region.x.floor() as u32;
        let y = region.y.floor() as u32;
        let right = (region.x + region.width).ceil() as u32;
        let bottom = (region.y + region.height).ceil() as u32;
        if right > self.width || bottom > self.height {
            return Err(out_of_bounds());
        }

        let width = right - x;
        let height = bottom - y;
        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for row in y..bottom {
            let start = row as usize * self.stride + x as usize;
            pixels.extend_from_slice(&self.data[start..start + width as usize]);
        }
        GrayImage::from_raw(width, height, pixels)
            .ok_or_else(|| OcrError::backend("cropped buffer does not match its dimensions"))
    }

    pub fn to_image(&self) -> Result<GrayImage, OcrError> {
        self.crop(&OcrRegion::new(
            0.0,
            0.0,
            self.width as f32,
            self.height as f32,
        ))
    }
}

impl fmt::Debug for LumaPlane<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LumaPlane")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl Deref for LumaPlane<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_parts_rejects_short_data() {
        let data = vec![0u8; 10];
        let err = LumaPlane::from_parts(4, 4, 4, &data).unwrap_err();
        assert!(matches!(
            err,
            OcrError::InsufficientPlaneData {
                provided: 10,
                required: 16
            }
        ));
    }

    #[test]
    fn crop_respects_stride_padding() {
        // 3x2 image stored with a stride of 4.
        let data = [1, 2, 3, 0, 4, 5, 6, 0];
        let plane = LumaPlane::from_parts(3, 2, 4, &data).unwrap();
        let cropped = plane.crop(&OcrRegion::new(1.0, 0.0, 2.0, 2.0)).unwrap();
        assert_eq!(cropped.dimensions(), (2, 2));
        assert_eq!(cropped.into_raw(), vec![2, 3, 5, 6]);
        assert_eq!(plane.to_image().unwrap().into_raw(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn crop_rejects_regions_outside_plane() {
        let data = [0u8; 4];
        let plane = LumaPlane::from_parts(2, 2, 2, &data).unwrap();
        assert!(plane.crop(&OcrRegion::new(1.0, 1.0, 2.0, 1.0)).is_err());
        assert!(plane.crop(&OcrRegion::new(-1.0, 0.0, 1.0, 1.0)).is_err());
    }
}
