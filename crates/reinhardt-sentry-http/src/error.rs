//! Extraction errors

/// Errors raised while reading a request into an event
///
/// Cloneable so that a cached parse failure can be handed out on every read.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
	#[error("Malformed urlencoded body: {0}")]
	MalformedForm(String),
	#[error("Missing multipart boundary: {0}")]
	MissingBoundary(String),
	#[error("Malformed multipart body: {0}")]
	MalformedMultipart(String),
	#[error("Extraction failed: {0}")]
	Other(String),
}

impl From<serde_urlencoded::de::Error> for ExtractError {
	fn from(err: serde_urlencoded::de::Error) -> Self {
		Self::MalformedForm(err.to_string())
	}
}

impl From<multer::Error> for ExtractError {
	fn from(err: multer::Error) -> Self {
		Self::MalformedMultipart(err.to_string())
	}
}

pub type ExtractResult<T> = Result<T, ExtractError>;
