//! HWC↔CHW tensor conversion for the inpainting network.
//!
//! Forward: interleaved RGBA bytes → planar `[1,3,H,W]` float32, normalized
//! to `[0,1]` by ÷255. Inverse: planar float output (arbitrary range) →
//! interleaved RGBA with `[0,1]` clamping, ×255 scaling, and a constant
//! opaque alpha. Clamping is a correctness requirement — the network is not
//! guaranteed to produce bounded output.

use ndarray::{Array4, ArrayD};

use crate::error::{Error, Result};
use crate::image_io::DecodedImage;

/// Convert a decoded RGBA image into the network's input tensor.
///
/// Drops the alpha channel, re-layouts interleaved (H×W×C) into planar
/// (C×H×W), and normalizes each value by 255. Uses the image's true decoded
/// dimensions; no resizing happens here.
pub fn to_chw(image: &DecodedImage) -> Result<Array4<f32>> {
    let w = image.width as usize;
    let h = image.height as usize;

    if w == 0 || h == 0 {
        return Err(Error::invalid_image(format!(
            "zero dimension: {}x{}",
            image.width, image.height
        )));
    }

    let expected = h * w * 4;
    if image.rgba.len() != expected {
        return Err(Error::invalid_image(format!(
            "pixel data length mismatch: expected {expected} ({h}x{w}x4), got {}",
            image.rgba.len()
        )));
    }

    let hw = h * w;
    let mut chw = Array4::<f32>::zeros((1, 3, h, w));
    let slice = match chw.as_slice_mut() {
        Some(slice) => slice,
        None => {
            return Err(Error::invalid_image(
                "freshly allocated tensor is not contiguous",
            ))
        }
    };

    for i in 0..hw {
        let src = i * 4;
        slice[i] = image.rgba[src] as f32 / 255.0;
        slice[hw + i] = image.rgba[src + 1] as f32 / 255.0;
        slice[2 * hw + i] = image.rgba[src + 2] as f32 / 255.0;
    }

    Ok(chw)
}

/// Convert the network's planar float output back to interleaved RGBA.
///
/// Each value is clamped to `[0,1]` and scaled by 255; the alpha channel is
/// fixed to 255 since the network only predicts RGB.
pub fn to_rgba(output: &ArrayD<f32>, width: u32, height: u32) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    let hw = h * w;

    let owned_contig;
    let slice = if let Some(s) = output.as_slice() {
        s
    } else {
        owned_contig = output.as_standard_layout().into_owned();
        match owned_contig.as_slice() {
            Some(s) => s,
            None => return Err(Error::inference("output tensor is not contiguous")),
        }
    };

    if slice.len() != 3 * hw {
        return Err(Error::inference(format!(
            "output tensor length mismatch: expected {} (3x{h}x{w}), got {}",
            3 * hw,
            slice.len()
        )));
    }

    let mut rgba = vec![0u8; hw * 4];
    for i in 0..hw {
        let dst = i * 4;
        rgba[dst] = (slice[i].clamp(0.0, 1.0) * 255.0) as u8;
        rgba[dst + 1] = (slice[hw + i].clamp(0.0, 1.0) * 255.0) as u8;
        rgba[dst + 2] = (slice[2 * hw + i].clamp(0.0, 1.0) * 255.0) as u8;
        rgba[dst + 3] = 255;
    }

    Ok(rgba)
}
