//! Process-wide settings store and the table of recognized keys

use serde_json::Value;
use std::collections::BTreeMap;

/// Name of the modern middleware setting
pub const MIDDLEWARE: &str = "MIDDLEWARE";

/// Name of the legacy middleware setting
pub const MIDDLEWARE_CLASSES: &str = "MIDDLEWARE_CLASSES";

/// Flat mapping of upper-case setting names to values
///
/// # Examples
///
/// ```
/// use reinhardt_sentry::Settings;
/// use serde_json::json;
///
/// let mut settings = Settings::new();
/// settings.set("SENTRY_DSN", "https://key@sentry.example.com/42");
/// settings.set("MIDDLEWARE", json!(["app.middleware.Timing"]));
///
/// assert_eq!(settings.get_str("SENTRY_DSN"), Some("https://key@sentry.example.com/42"));
/// assert_eq!(settings.string_list("MIDDLEWARE").unwrap(), vec!["app.middleware.Timing"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
	values: BTreeMap<String, Value>,
}

impl Settings {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self, key: &str) -> Option<&Value> {
		self.values.get(key)
	}

	pub fn get_str(&self, key: &str) -> Option<&str> {
		self.get(key).and_then(Value::as_str)
	}

	pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
		self.values.insert(key.into(), value.into());
	}

	pub fn remove(&mut self, key: &str) -> Option<Value> {
		self.values.remove(key)
	}

	pub fn contains_key(&self, key: &str) -> bool {
		self.values.contains_key(key)
	}

	pub fn keys(&self) -> impl Iterator<Item = &str> {
		self.values.keys().map(String::as_str)
	}

	/// Reads a list of strings; `None` when the key is unset, null or not such a list
	pub fn string_list(&self, key: &str) -> Option<Vec<String>> {
		self.get(key)?
			.as_array()?
			.iter()
			.map(|item| item.as_str().map(str::to_string))
			.collect()
	}

	pub fn set_string_list(&mut self, key: impl Into<String>, list: Vec<String>) {
		self.set(key, Value::from(list));
	}
}

impl<K> FromIterator<(K, Value)> for Settings
where
	K: Into<String>,
{
	fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
		Self {
			values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
		}
	}
}

impl From<BTreeMap<String, Value>> for Settings {
	fn from(values: BTreeMap<String, Value>) -> Self {
		Self { values }
	}
}

/// Option a recognized setting feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionSlot {
	Dsn,
	Release,
	Environment,
	ServerName,
	SendDefaultPii,
	RequestBodies,
	Debug,
	TransactionStyle,
}

impl OptionSlot {
	/// Human-readable type, used in error messages
	pub fn expected(self) -> &'static str {
		match self {
			Self::Dsn | Self::Release | Self::Environment | Self::ServerName => "a string",
			Self::SendDefaultPii | Self::Debug => "a boolean",
			Self::RequestBodies => "one of \"never\", \"small\", \"medium\", \"always\"",
			Self::TransactionStyle => "one of \"function_name\", \"url\"",
		}
	}

	/// Whether the option belongs to the integration rather than the client
	pub fn is_integration_option(self) -> bool {
		matches!(self, Self::TransactionStyle)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecognizedSetting {
	pub key: &'static str,
	pub slot: OptionSlot,
}

/// Every setting the integration reads; all other keys are ignored
pub const RECOGNIZED_SETTINGS: &[RecognizedSetting] = &[
	RecognizedSetting {
		key: "SENTRY_DSN",
		slot: OptionSlot::Dsn,
	},
	RecognizedSetting {
		key: "SENTRY_RELEASE",
		slot: OptionSlot::Release,
	},
	RecognizedSetting {
		key: "SENTRY_ENVIRONMENT",
		slot: OptionSlot::Environment,
	},
	RecognizedSetting {
		key: "SENTRY_SERVER_NAME",
		slot: OptionSlot::ServerName,
	},
	RecognizedSetting {
		key: "SENTRY_SEND_DEFAULT_PII",
		slot: OptionSlot::SendDefaultPii,
	},
	RecognizedSetting {
		key: "SENTRY_REQUEST_BODIES",
		slot: OptionSlot::RequestBodies,
	},
	RecognizedSetting {
		key: "SENTRY_DEBUG",
		slot: OptionSlot::Debug,
	},
	RecognizedSetting {
		key: "SENTRY_TRANSACTION_STYLE",
		slot: OptionSlot::TransactionStyle,
	},
];

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use serde_json::json;

	#[rstest]
	fn recognized_keys_share_the_prefix() {
		assert!(
			RECOGNIZED_SETTINGS
				.iter()
				.all(|setting| setting.key.starts_with("SENTRY_"))
		);
	}

	#[rstest]
	#[case(json!(["a", "b"]), Some(vec!["a", "b"]))]
	#[case(json!([]), Some(vec![]))]
	#[case(json!(null), None)]
	#[case(json!("a"), None)]
	#[case(json!(["a", 1]), None)]
	fn string_list_accepts_only_string_arrays(
		#[case] value: Value,
		#[case] expected: Option<Vec<&str>>,
	) {
		// Arrange
		let mut settings = Settings::new();
		settings.set("MIDDLEWARE", value);

		// Act
		let list = settings.string_list("MIDDLEWARE");

		// Assert
		assert_eq!(
			list,
			expected.map(|items| items.into_iter().map(String::from).collect())
		);
	}

	#[rstest]
	fn collects_from_pairs() {
		let settings: Settings = [("DEBUG", json!(true)), ("ALLOWED_HOSTS", json!(["*"]))]
			.into_iter()
			.collect();

		assert!(settings.contains_key("DEBUG"));
		assert_eq!(settings.keys().collect::<Vec<_>>(), vec!["ALLOWED_HOSTS", "DEBUG"]);
	}
}
