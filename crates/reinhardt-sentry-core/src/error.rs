//! Error types for the capture pipeline

use std::error::Error;

/// Errors raised by an event processor while enriching an event
///
/// Processor errors never reach application code. The pipeline forwards
/// them to the internal-error channel and keeps running the remaining
/// processors.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
	#[error("event processor failed: {0}")]
	Failed(#[from] Box<dyn Error + Send + Sync>),
	#[error("event processor panicked: {0}")]
	Panicked(String),
}

impl ProcessorError {
	/// Wrap any error as a processor failure
	pub fn failed<E>(err: E) -> Self
	where
		E: Error + Send + Sync + 'static,
	{
		Self::Failed(Box::new(err))
	}
}

/// Errors that can occur while parsing a DSN
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DsnError {
	#[error("invalid DSN url: {0}")]
	InvalidUrl(String),
	#[error("unsupported DSN scheme: {0}")]
	UnsupportedScheme(String),
	#[error("DSN has no public key")]
	MissingPublicKey,
	#[error("DSN has no host")]
	MissingHost,
	#[error("DSN has no project id")]
	MissingProjectId,
}

/// Extracts a readable message from a panic payload
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
	if let Some(message) = payload.downcast_ref::<&'static str>() {
		(*message).to_string()
	} else if let Some(message) = payload.downcast_ref::<String>() {
		message.clone()
	} else {
		"unknown panic payload".to_string()
	}
}
