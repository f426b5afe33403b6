//! The Reinhardt integration descriptor

use crate::error::{ConfigurationError, ConfigurationResult};
use crate::settings::{OptionSlot, RECOGNIZED_SETTINGS, RecognizedSetting, Settings};
use reinhardt_sentry_core::{ClientOptions, Dsn, Integration, RequestBodies};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// How a request's transaction name is derived
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransactionStyle {
	/// Name of the handler the route resolved to
	#[default]
	FunctionName,
	/// The request path
	Url,
}

impl FromStr for TransactionStyle {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"function_name" => Ok(Self::FunctionName),
			"url" => Ok(Self::Url),
			other => Err(format!("unknown transaction style: {}", other)),
		}
	}
}

impl fmt::Display for TransactionStyle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::FunctionName => "function_name",
			Self::Url => "url",
		})
	}
}

/// Options owned by the integration rather than the client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrationOptions {
	pub transaction_style: TransactionStyle,
}

/// Registered on the client once the integration is installed
///
/// # Examples
///
/// ```
/// use reinhardt_sentry::{ReinhardtIntegration, Settings};
/// use serde_json::json;
///
/// let settings: Settings = [
///     ("SENTRY_DSN", json!("https://key@sentry.example.com/42")),
///     ("SENTRY_TRANSACTION_STYLE", json!("url")),
///     ("INSTALLED_APPS", json!(["blog"])),
/// ]
/// .into_iter()
/// .collect();
///
/// let (client, integration) = ReinhardtIntegration::parse_settings(&settings).unwrap();
/// assert_eq!(client.dsn.unwrap().project_id(), "42");
/// assert_eq!(integration.transaction_style.to_string(), "url");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ReinhardtIntegration {
	options: IntegrationOptions,
}

impl ReinhardtIntegration {
	pub const IDENTIFIER: &'static str = "reinhardt";

	pub fn new(options: IntegrationOptions) -> Self {
		Self { options }
	}

	pub fn options(&self) -> &IntegrationOptions {
		&self.options
	}

	/// Splits the recognized settings into client and integration options
	///
	/// Keys missing from [`RECOGNIZED_SETTINGS`] are ignored, as are null
	/// values. A recognized key holding the wrong type is an error.
	pub fn parse_settings(
		settings: &Settings,
	) -> ConfigurationResult<(ClientOptions, IntegrationOptions)> {
		let mut client = ClientOptions::default();
		let mut integration = IntegrationOptions::default();

		for setting in RECOGNIZED_SETTINGS {
			let Some(value) = settings.get(setting.key).filter(|v| !v.is_null()) else {
				continue;
			};
			match setting.slot {
				OptionSlot::Dsn => client.dsn = Some(Dsn::from_str(as_str(setting, value)?)?),
				OptionSlot::Release => client.release = Some(as_str(setting, value)?.to_string()),
				OptionSlot::Environment => {
					client.environment = Some(as_str(setting, value)?.to_string())
				}
				OptionSlot::ServerName => {
					client.server_name = Some(as_str(setting, value)?.to_string())
				}
				OptionSlot::SendDefaultPii => client.send_default_pii = as_bool(setting, value)?,
				OptionSlot::RequestBodies => {
					client.request_bodies = RequestBodies::from_str(as_str(setting, value)?)
						.map_err(|_| invalid(setting))?
				}
				OptionSlot::Debug => client.debug = as_bool(setting, value)?,
				OptionSlot::TransactionStyle => {
					integration.transaction_style =
						TransactionStyle::from_str(as_str(setting, value)?)
							.map_err(|_| invalid(setting))?
				}
			}
		}

		Ok((client, integration))
	}
}

impl Integration for ReinhardtIntegration {
	fn identifier(&self) -> &'static str {
		Self::IDENTIFIER
	}
}

fn invalid(setting: &RecognizedSetting) -> ConfigurationError {
	ConfigurationError::InvalidSetting {
		key: setting.key.to_string(),
		expected: setting.slot.expected(),
	}
}

fn as_str<'a>(setting: &RecognizedSetting, value: &'a Value) -> ConfigurationResult<&'a str> {
	value.as_str().ok_or_else(|| invalid(setting))
}

fn as_bool(setting: &RecognizedSetting, value: &Value) -> ConfigurationResult<bool> {
	value.as_bool().ok_or_else(|| invalid(setting))
}
