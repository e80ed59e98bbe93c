//! Region detection seam.
//!
//! The watermark-detection/overlay routine is an external collaborator; the
//! pipeline only consumes its output as the network's mask input. The trait
//! keeps that boundary explicit, and [`RectMask`] is a minimal built-in
//! implementation for fixed-position watermarks.

use ndarray::Array4;

use crate::error::{Error, Result};
use crate::image_io::DecodedImage;

/// Produces the `[1, 1, H, W]` float mask fed to the network alongside the
/// image tensor. Values of 1.0 mark pixels to inpaint, 0.0 pixels to keep.
pub trait RegionDetector: Send + Sync {
    fn prepare_mask(&self, image: &DecodedImage) -> Result<Array4<f32>>;
}

/// A fixed rectangular inpaint region, clipped to the image bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RectMask {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl RectMask {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A region anchored to the bottom-right corner, where overlay
    /// watermarks typically sit.
    pub fn bottom_right(width: u32, height: u32) -> BottomRightMask {
        BottomRightMask { width, height }
    }
}

impl RegionDetector for RectMask {
    fn prepare_mask(&self, image: &DecodedImage) -> Result<Array4<f32>> {
        let w = image.width as usize;
        let h = image.height as usize;
        if w == 0 || h == 0 {
            return Err(Error::invalid_image(format!(
                "zero dimension: {}x{}",
                image.width, image.height
            )));
        }

        let x0 = (self.x as usize).min(w);
        let y0 = (self.y as usize).min(h);
        let x1 = (self.x as usize + self.width as usize).min(w);
        let y1 = (self.y as usize + self.height as usize).min(h);

        let mut mask = Array4::<f32>::zeros((1, 1, h, w));
        for y in y0..y1 {
            for x in x0..x1 {
                mask[[0, 0, y, x]] = 1.0;
            }
        }
        Ok(mask)
    }
}

/// A rectangle anchored to the image's bottom-right corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BottomRightMask {
    pub width: u32,
    pub height: u32,
}

impl RegionDetector for BottomRightMask {
    fn prepare_mask(&self, image: &DecodedImage) -> Result<Array4<f32>> {
        let x = image.width.saturating_sub(self.width);
        let y = image.height.saturating_sub(self.height);
        RectMask::new(x, y, self.width, self.height).prepare_mask(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(width: u32, height: u32) -> DecodedImage {
        DecodedImage {
            width,
            height,
            rgba: vec![0u8; (width * height * 4) as usize],
        }
    }

    #[test]
    fn rect_mask_marks_only_the_region() {
        let mask = RectMask::new(1, 1, 2, 1)
            .prepare_mask(&blank(4, 3))
            .expect("mask");
        assert_eq!(mask.shape(), &[1, 1, 3, 4]);
        assert_eq!(mask[[0, 0, 1, 1]], 1.0);
        assert_eq!(mask[[0, 0, 1, 2]], 1.0);
        assert_eq!(mask[[0, 0, 0, 1]], 0.0);
        assert_eq!(mask[[0, 0, 1, 3]], 0.0);
        assert_eq!(mask.sum(), 2.0);
    }

    #[test]
    fn rect_mask_clips_to_image_bounds() {
        let mask = RectMask::new(3, 2, 10, 10)
            .prepare_mask(&blank(4, 3))
            .expect("mask");
        assert_eq!(mask.sum(), 1.0);
        assert_eq!(mask[[0, 0, 2, 3]], 1.0);
    }

    #[test]
    fn bottom_right_mask_anchors_to_corner() {
        let mask = RectMask::bottom_right(2, 2)
            .prepare_mask(&blank(5, 5))
            .expect("mask");
        assert_eq!(mask[[0, 0, 4, 4]], 1.0);
        assert_eq!(mask[[0, 0, 3, 3]], 1.0);
        assert_eq!(mask[[0, 0, 2, 2]], 0.0);
        assert_eq!(mask.sum(), 4.0);
    }

    #[test]
    fn bottom_right_mask_larger_than_image_covers_everything() {
        let mask = RectMask::bottom_right(100, 80)
            .prepare_mask(&blank(4, 3))
            .expect("mask");
        assert_eq!(mask.sum(), 12.0);
    }

    #[test]
    fn zero_dimension_image_is_rejected() {
        let image = DecodedImage {
            width: 0,
            height: 3,
            rgba: Vec::new(),
        };
        let err = RectMask::new(0, 0, 1, 1)
            .prepare_mask(&image)
            .expect_err("zero width");
        assert!(matches!(err, Error::InvalidImage { .. }));
    }
}
