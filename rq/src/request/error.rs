//! Request construction errors

use thiserror::Error;

/// Errors raised while building a [`Request`](super::Request)
///
/// These are fatal and never retried: they surface synchronously to whoever
/// tried to enqueue the request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Invalid request: url is empty")]
    MissingUrl,

    #[error("Invalid request: body nests deeper than {max} levels")]
    BodyTooDeep { max: usize },

    #[error("Unknown callback key: {0}")]
    UnknownCallback(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_url_message() {
        let msg = RequestError::MissingUrl.to_string();
        assert!(msg.contains("url is empty"));
    }

    #[test]
    fn test_body_too_deep_message() {
        let msg = RequestError::BodyTooDeep { max: 32 }.to_string();
        assert!(msg.contains("32"));
    }
}
