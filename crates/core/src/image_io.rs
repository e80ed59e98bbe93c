//! Image loading and result materialization.
//!
//! The loader turns an opaque source (path, raw bytes, remote URL, or an
//! already-decoded buffer) into a dimensioned RGBA pixel buffer; the
//! materializer renders an RGBA buffer back into a portable encoded
//! representation (a PNG data URL).

use std::io::Cursor;
use std::path::PathBuf;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tracing::debug;

use crate::error::{Error, Result};

/// An opaque image source accepted by the pipeline.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// A file on disk.
    Path(PathBuf),
    /// Raw encoded image bytes (PNG, JPEG, ...).
    Bytes(Vec<u8>),
    /// A remote image fetched over HTTP(S).
    Url(String),
    /// An already-decoded image; used as-is.
    Decoded(DecodedImage),
}

/// A decoded image: RGBA interleaved, row-major. Read-only after creation.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl DecodedImage {
    /// Wrap an RGBA buffer, validating dimensions against its length.
    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::invalid_image(format!(
                "zero dimension: {width}x{height}"
            )));
        }
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(Error::invalid_image(format!(
                "buffer length {} does not match {width}x{height}x4",
                rgba.len()
            )));
        }
        Ok(Self {
            width,
            height,
            rgba,
        })
    }
}

/// Decode an image source into an RGBA pixel buffer.
///
/// Decoding and any network fetch run on a blocking thread; the caller's
/// async task only suspends. All parse and transport failures surface as
/// [`Error::Decode`] — never as a silent blank image.
pub async fn load(source: ImageSource) -> Result<DecodedImage> {
    match source {
        ImageSource::Decoded(image) => Ok(image),
        other => tokio::task::spawn_blocking(move || load_blocking(other))
            .await
            .map_err(|e| Error::decode(format!("decode task failed: {e}")))?,
    }
}

fn load_blocking(source: ImageSource) -> Result<DecodedImage> {
    let bytes = match source {
        ImageSource::Decoded(image) => return Ok(image),
        ImageSource::Bytes(bytes) => bytes,
        ImageSource::Path(path) => std::fs::read(&path)
            .map_err(|e| Error::decode(format!("cannot read {}: {e}", path.display())))?,
        ImageSource::Url(url) => fetch_url(&url)?,
    };
    decode_bytes(&bytes)
}

fn fetch_url(url: &str) -> Result<Vec<u8>> {
    let response = reqwest::blocking::get(url)
        .map_err(|e| Error::decode(format!("failed to fetch {url}: {e}")))?;
    if !response.status().is_success() {
        return Err(Error::decode(format!(
            "fetching {url} returned HTTP {}",
            response.status().as_u16()
        )));
    }
    let bytes = response
        .bytes()
        .map_err(|e| Error::decode(format!("failed reading body of {url}: {e}")))?;
    Ok(bytes.to_vec())
}

fn decode_bytes(bytes: &[u8]) -> Result<DecodedImage> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| Error::decode(format!("unparseable image data: {e}")))?;

    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    debug!(width, height, "Decoded source image");

    DecodedImage::from_rgba(width, height, rgba.into_raw())
}

/// Render an RGBA buffer into a PNG data URL (`data:image/png;base64,...`).
pub fn to_data_url(rgba: &[u8], width: u32, height: u32) -> Result<String> {
    if width == 0 || height == 0 {
        return Err(Error::render(format!(
            "cannot create {width}x{height} output surface"
        )));
    }

    let surface = image::RgbaImage::from_raw(width, height, rgba.to_vec()).ok_or_else(|| {
        Error::render(format!(
            "buffer length {} does not match {width}x{height}x4",
            rgba.len()
        ))
    })?;

    let mut encoded = Vec::new();
    surface
        .write_to(&mut Cursor::new(&mut encoded), image::ImageFormat::Png)
        .map_err(|e| Error::render(format!("PNG encode failed: {e}")))?;

    Ok(format!("data:image/png;base64,{}", BASE64.encode(&encoded)))
}
