//! Error types of the integration

use reinhardt_sentry_core::DsnError;

/// Fatal problems found while installing the integration
///
/// These surface at startup through [`Installer::install`](crate::Installer::install).
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
	#[error("Other sentry middleware already registered: {}", .0.join(", "))]
	ConflictingMiddleware(Vec<String>),
	#[error("Invalid value for setting {key}: expected {expected}")]
	InvalidSetting { key: String, expected: &'static str },
	#[error("Invalid DSN: {0}")]
	InvalidDsn(#[from] DsnError),
}

pub type ConfigurationResult<T> = Result<T, ConfigurationError>;

/// Failures inside the per-request hooks
///
/// Never returned to the host; reported on the internal-error channel.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum MiddlewareError {
	#[error("Request hook panicked: {0}")]
	Panicked(String),
	#[error("Request extraction failed: {0}")]
	Extraction(#[from] reinhardt_sentry_http::ExtractError),
}
