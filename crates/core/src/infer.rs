//! Feed construction and forward-pass execution.
//!
//! Builds the named input feed from the session's declared signature,
//! validates tensor shapes before dispatch, and runs one forward pass.
//! Validation failures surface as [`Error::Inference`] here rather than as a
//! late backend-level failure.

use std::sync::Arc;

use ndarray::{Array4, ArrayD};
use ort::value::Tensor;
use tracing::debug;

use crate::error::{Error, Result};
use crate::session::InpaintSession;

/// Validate the image and mask tensors against the fixed model contract:
/// image `[1, 3, H, W]`, mask `[1, 1, H, W]`, matching spatial dimensions.
pub fn validate_feed(image: &Array4<f32>, mask: &Array4<f32>) -> Result<()> {
    let image_shape = image.shape();
    let mask_shape = mask.shape();

    if image_shape[0] != 1 || image_shape[1] != 3 {
        return Err(Error::inference(format!(
            "image tensor shape {image_shape:?} does not match [1, 3, H, W]"
        )));
    }
    if mask_shape[0] != 1 || mask_shape[1] != 1 {
        return Err(Error::inference(format!(
            "mask tensor shape {mask_shape:?} does not match [1, 1, H, W]"
        )));
    }
    if image_shape[2..] != mask_shape[2..] {
        return Err(Error::inference(format!(
            "image {}x{} and mask {}x{} dimensions differ",
            image_shape[2], image_shape[3], mask_shape[2], mask_shape[3]
        )));
    }
    Ok(())
}

/// Run one forward pass, feeding the image and mask under the session's
/// declared input names and extracting its declared output.
///
/// With `offload` set, the pass runs on a blocking thread so the caller's
/// async task only suspends for the duration of the dispatch.
pub async fn run(
    session: Arc<InpaintSession>,
    image: Array4<f32>,
    mask: Array4<f32>,
    offload: bool,
) -> Result<ArrayD<f32>> {
    validate_feed(&image, &mask)?;

    if offload {
        tokio::task::spawn_blocking(move || run_blocking(&session, image, mask))
            .await
            .map_err(|e| Error::inference(format!("inference task failed: {e}")))?
    } else {
        run_blocking(&session, image, mask)
    }
}

fn run_blocking(
    session: &InpaintSession,
    image: Array4<f32>,
    mask: Array4<f32>,
) -> Result<ArrayD<f32>> {
    let image_name = session.input_names()[0].clone();
    let mask_name = session.input_names()[1].clone();
    let output_name = session.output_name().to_string();

    debug!(
        image = %image_name,
        mask = %mask_name,
        output = %output_name,
        shape = ?image.shape(),
        "Dispatching forward pass"
    );

    let image_tensor = Tensor::from_array(image)
        .map_err(|e| Error::inference(format!("image tensor rejected: {e}")))?;
    let mask_tensor = Tensor::from_array(mask)
        .map_err(|e| Error::inference(format!("mask tensor rejected: {e}")))?;

    let mut guard = session.lock();
    let outputs = guard
        .run(ort::inputs![
            image_name.as_str() => &image_tensor,
            mask_name.as_str() => &mask_tensor,
        ])
        .map_err(|e| Error::inference(format!("backend execution failed: {e}")))?;

    let output_view = outputs[output_name.as_str()]
        .try_extract_array::<f32>()
        .map_err(|e| Error::inference(format!("output extraction failed: {e}")))?;

    Ok(output_view.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_shapes_validate() {
        let image = Array4::<f32>::zeros((1, 3, 4, 6));
        let mask = Array4::<f32>::zeros((1, 1, 4, 6));
        assert!(validate_feed(&image, &mask).is_ok());
    }

    #[test]
    fn wrong_channel_count_is_rejected() {
        let image = Array4::<f32>::zeros((1, 4, 4, 6));
        let mask = Array4::<f32>::zeros((1, 1, 4, 6));
        let err = validate_feed(&image, &mask).expect_err("4-channel image");
        assert!(matches!(err, Error::Inference { .. }));
    }

    #[test]
    fn wrong_mask_channels_are_rejected() {
        let image = Array4::<f32>::zeros((1, 3, 4, 6));
        let mask = Array4::<f32>::zeros((1, 3, 4, 6));
        let err = validate_feed(&image, &mask).expect_err("3-channel mask");
        assert!(matches!(err, Error::Inference { .. }));
    }

    #[test]
    fn mismatched_spatial_dimensions_are_rejected() {
        let image = Array4::<f32>::zeros((1, 3, 4, 6));
        let mask = Array4::<f32>::zeros((1, 1, 6, 4));
        let err = validate_feed(&image, &mask).expect_err("transposed mask");
        assert!(matches!(err, Error::Inference { .. }));
        assert!(err.to_string().contains("differ"));
    }

    #[test]
    fn batched_input_is_rejected() {
        let image = Array4::<f32>::zeros((2, 3, 4, 6));
        let mask = Array4::<f32>::zeros((1, 1, 4, 6));
        assert!(validate_feed(&image, &mask).is_err());
    }
}
