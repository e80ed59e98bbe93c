//! Error taxonomy for the inpainting pipeline.
//!
//! Every failure surfaced by the core maps onto exactly one of these
//! variants; nothing is retried or swallowed internally. Retry policy, if
//! any, belongs to the caller.

/// Errors that can occur while running the inpainting pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The source image could not be decoded (corrupt bytes, unsupported
    /// format, or an unreachable remote source).
    #[error("failed to decode source image: {reason}")]
    Decode { reason: String },

    /// The decoded image has zero or otherwise malformed dimensions.
    #[error("invalid image: {reason}")]
    InvalidImage { reason: String },

    /// Model weights could not be fetched, or the backend rejected the
    /// model graph during session construction.
    #[error("inference session initialization failed: {reason}")]
    SessionInit { reason: String },

    /// Feed shape/dtype mismatch, or the backend raised during execution.
    /// Fatal for the current call; the cached session is not invalidated.
    #[error("inference failed: {reason}")]
    Inference { reason: String },

    /// The output surface could not be created or encoded.
    #[error("failed to render output image: {reason}")]
    Render { reason: String },

    /// The call was cancelled at a suspension point.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub fn decode(reason: impl std::fmt::Display) -> Self {
        Self::Decode {
            reason: reason.to_string(),
        }
    }

    pub fn invalid_image(reason: impl std::fmt::Display) -> Self {
        Self::InvalidImage {
            reason: reason.to_string(),
        }
    }

    pub fn session_init(reason: impl std::fmt::Display) -> Self {
        Self::SessionInit {
            reason: reason.to_string(),
        }
    }

    pub fn inference(reason: impl std::fmt::Display) -> Self {
        Self::Inference {
            reason: reason.to_string(),
        }
    }

    pub fn render(reason: impl std::fmt::Display) -> Self {
        Self::Render {
            reason: reason.to_string(),
        }
    }
}

/// A specialized `Result` type for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let decode = Error::decode("truncated PNG stream");
        assert!(decode.to_string().contains("truncated PNG stream"));

        let invalid = Error::invalid_image("width is 0");
        assert!(invalid.to_string().contains("width is 0"));

        let init = Error::session_init("unsupported op: FourierUnit");
        assert!(init.to_string().contains("FourierUnit"));

        assert_eq!(Error::Cancelled.to_string(), "operation cancelled");
    }
}
