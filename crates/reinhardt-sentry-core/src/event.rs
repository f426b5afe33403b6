//! Event model
//!
//! An [`Event`] is the normalized record of one error occurrence. It is
//! created by a capture call, enriched by the current scope and its
//! processors, and handed to the transport by value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use uuid::Uuid;

/// Severity of an event
#[derive(
	Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Level {
	Debug,
	Info,
	Warning,
	#[default]
	Error,
	Fatal,
}

impl fmt::Display for Level {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Debug => "debug",
			Self::Info => "info",
			Self::Warning => "warning",
			Self::Error => "error",
			Self::Fatal => "fatal",
		};
		f.write_str(name)
	}
}

/// One entry of an error chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exception {
	#[serde(rename = "type")]
	pub ty: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub value: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub module: Option<String>,
}

/// SDK identification attached by the client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdkInfo {
	pub name: String,
	pub version: String,
	#[serde(default)]
	pub integrations: Vec<String>,
}

/// A single form field as recorded on an event
///
/// Uploaded files are recorded by name and size only; their content is
/// never attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FormValue {
	Text(String),
	List(Vec<String>),
	File {
		filename: Option<String>,
		size: u64,
	},
}

impl FormValue {
	/// Collapse a multi-valued field: one value becomes `Text`, more become `List`
	pub fn from_values(values: &[String]) -> Self {
		match values {
			[single] => Self::Text(single.clone()),
			_ => Self::List(values.to_vec()),
		}
	}
}

/// Request body as recorded on an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RequestData {
	Json(Value),
	Form(BTreeMap<String, FormValue>),
	/// The body exists but was not attached
	Omitted { len: usize },
}

/// Normalized request metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestInfo {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub method: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub query_string: Option<String>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub cookies: BTreeMap<String, String>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub headers: BTreeMap<String, String>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub env: BTreeMap<String, String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<RequestData>,
}

/// A reportable error occurrence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
	pub event_id: Uuid,
	pub timestamp: DateTime<Utc>,
	pub level: Level,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub exception: Vec<Exception>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub transaction: Option<String>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub tags: BTreeMap<String, String>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub extra: BTreeMap<String, Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub request: Option<RequestInfo>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub release: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub environment: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub server_name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub sdk: Option<SdkInfo>,
}

impl Default for Event {
	fn default() -> Self {
		Self {
			event_id: Uuid::new_v4(),
			timestamp: Utc::now(),
			level: Level::Error,
			message: None,
			exception: Vec::new(),
			transaction: None,
			tags: BTreeMap::new(),
			extra: BTreeMap::new(),
			request: None,
			release: None,
			environment: None,
			server_name: None,
			sdk: None,
		}
	}
}

impl Event {
	/// Create an empty error-level event with a fresh id
	pub fn new() -> Self {
		Self::default()
	}

	/// Build an event from an error and its source chain
	///
	/// Exceptions are ordered innermost cause first, the error itself last.
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_sentry_core::{Event, Level};
	///
	/// let err = std::io::Error::other("disk full");
	/// let event = Event::from_error(&err);
	///
	/// assert_eq!(event.level, Level::Error);
	/// assert_eq!(event.exception.last().unwrap().value.as_deref(), Some("disk full"));
	/// ```
	pub fn from_error<E>(err: &E) -> Self
	where
		E: Error + ?Sized,
	{
		let mut exception = vec![exception_from_error(err)];
		let mut source = err.source();
		while let Some(cause) = source {
			exception.push(exception_from_error(cause));
			source = cause.source();
		}
		exception.reverse();

		Self {
			exception,
			..Self::default()
		}
	}

	/// Build a message event
	pub fn from_message(message: impl Into<String>, level: Level) -> Self {
		Self {
			message: Some(message.into()),
			level,
			..Self::default()
		}
	}
}

fn exception_from_error<E>(err: &E) -> Exception
where
	E: Error + ?Sized,
{
	let debug = format!("{:?}", err);
	Exception {
		ty: parse_type_from_debug(&debug).to_string(),
		value: Some(err.to_string()),
		module: None,
	}
}

/// Best-effort type name from a `Debug` rendering (`Io(Custom { .. })` → `Io`)
fn parse_type_from_debug(debug: &str) -> &str {
	let head = debug
		.split(|c: char| c == '(' || c == '{' || c.is_whitespace())
		.next()
		.unwrap_or_default();
	if head.starts_with(|c: char| c.is_ascii_alphabetic())
		&& head.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
	{
		head
	} else {
		"Error"
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[derive(Debug, thiserror::Error)]
	enum AppError {
		#[error("could not load profile")]
		Load(#[source] std::io::Error),
	}

	#[rstest]
	fn from_error_orders_chain_innermost_first() {
		// Arrange
		let err = AppError::Load(std::io::Error::other("permission denied"));

		// Act
		let event = Event::from_error(&err);

		// Assert
		assert_eq!(event.exception.len(), 2);
		assert_eq!(event.exception[0].value.as_deref(), Some("permission denied"));
		assert_eq!(event.exception[1].ty, "Load");
		assert_eq!(event.exception[1].value.as_deref(), Some("could not load profile"));
	}

	#[rstest]
	#[case("Load(Custom { kind: Other })", "Load")]
	#[case("Custom { kind: Other, error: \"x\" }", "Custom")]
	#[case("Timeout", "Timeout")]
	#[case("\"bare string\"", "Error")]
	#[case("", "Error")]
	fn parses_type_name_from_debug(#[case] debug: &str, #[case] expected: &str) {
		assert_eq!(parse_type_from_debug(debug), expected);
	}

	#[rstest]
	fn form_value_collapses_single_values() {
		assert_eq!(
			FormValue::from_values(&["1".to_string()]),
			FormValue::Text("1".to_string())
		);
		assert_eq!(
			FormValue::from_values(&["a".to_string(), "b".to_string()]),
			FormValue::List(vec!["a".to_string(), "b".to_string()])
		);
	}

	#[rstest]
	fn serializes_level_and_skips_empty_fields() {
		// Arrange
		let event = Event::from_message("hello", Level::Warning);

		// Act
		let json = serde_json::to_value(&event).unwrap();

		// Assert
		assert_eq!(json["level"], "warning");
		assert_eq!(json["message"], "hello");
		assert!(json.get("exception").is_none());
		assert!(json.get("request").is_none());
	}
}
