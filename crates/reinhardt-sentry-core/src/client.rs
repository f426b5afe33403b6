//! Client, options and the collaborator traits the client delivers through

use crate::error::DsnError;
use crate::event::{Event, SdkInfo};
use crate::scope::Scope;
use std::any::Any;
use std::error::Error;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

/// SDK name reported on every event
pub const SDK_NAME: &str = "reinhardt-sentry";

/// Tracing target of the internal-error channel
pub const INTERNAL_ERROR_TARGET: &str = "reinhardt_sentry::internal";

/// Delivers finished events
///
/// Batching, retries and network I/O belong to the implementor.
pub trait Transport: Send + Sync {
	fn send_event(&self, event: Event);
}

/// A named binding between the client and a host framework
///
/// The identifier is used for deduplication and is reported in the SDK
/// info of every event.
pub trait Integration: Any + Send + Sync {
	fn identifier(&self) -> &'static str;

	/// Adjusts client options when the client is built
	fn setup(&self, _options: &mut ClientOptions) {}

	/// Last-chance processing after all scope processors ran
	fn process_event(&self, event: Event, _options: &ClientOptions) -> Option<Event> {
		Some(event)
	}
}

/// Which request bodies are attached to events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestBodies {
	Never,
	/// Up to 1 000 bytes
	Small,
	/// Up to 10 000 bytes
	#[default]
	Medium,
	Always,
}

impl RequestBodies {
	/// Returns true if a body of `len` bytes may be attached
	pub fn allows(self, len: usize) -> bool {
		match self {
			Self::Never => false,
			Self::Small => len <= 1_000,
			Self::Medium => len <= 10_000,
			Self::Always => true,
		}
	}
}

impl FromStr for RequestBodies {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"never" => Ok(Self::Never),
			"small" => Ok(Self::Small),
			"medium" => Ok(Self::Medium),
			"always" => Ok(Self::Always),
			other => Err(format!("unknown request body policy: {}", other)),
		}
	}
}

/// Parsed data source name: `{scheme}://{public_key}@{host}[:port]/{project_id}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dsn {
	scheme: String,
	public_key: String,
	host: String,
	port: Option<u16>,
	project_id: String,
}

impl Dsn {
	pub fn scheme(&self) -> &str {
		&self.scheme
	}

	pub fn public_key(&self) -> &str {
		&self.public_key
	}

	pub fn host(&self) -> &str {
		&self.host
	}

	pub fn port(&self) -> Option<u16> {
		self.port
	}

	pub fn project_id(&self) -> &str {
		&self.project_id
	}
}

impl FromStr for Dsn {
	type Err = DsnError;

	/// # Examples
	///
	/// ```
	/// use reinhardt_sentry_core::Dsn;
	///
	/// let dsn: Dsn = "https://abc123@errors.example.com/42".parse().unwrap();
	/// assert_eq!(dsn.public_key(), "abc123");
	/// assert_eq!(dsn.host(), "errors.example.com");
	/// assert_eq!(dsn.project_id(), "42");
	/// ```
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let url = Url::parse(s).map_err(|e| DsnError::InvalidUrl(e.to_string()))?;
		let scheme = url.scheme();
		if scheme != "http" && scheme != "https" {
			return Err(DsnError::UnsupportedScheme(scheme.to_string()));
		}
		if url.username().is_empty() {
			return Err(DsnError::MissingPublicKey);
		}
		let host = url.host_str().ok_or(DsnError::MissingHost)?;
		let project_id = url
			.path_segments()
			.and_then(|mut segments| segments.next_back())
			.filter(|segment| !segment.is_empty())
			.ok_or(DsnError::MissingProjectId)?;

		Ok(Self {
			scheme: scheme.to_string(),
			public_key: url.username().to_string(),
			host: host.to_string(),
			port: url.port(),
			project_id: project_id.to_string(),
		})
	}
}

impl fmt::Display for Dsn {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}://{}@{}", self.scheme, self.public_key, self.host)?;
		if let Some(port) = self.port {
			write!(f, ":{}", port)?;
		}
		write!(f, "/{}", self.project_id)
	}
}

/// Callback receiving every internal capture error
pub type InternalErrorHandler = Arc<dyn Fn(&dyn Error) + Send + Sync>;

/// Client configuration
#[derive(Clone, Default)]
pub struct ClientOptions {
	pub dsn: Option<Dsn>,
	pub release: Option<String>,
	pub environment: Option<String>,
	pub server_name: Option<String>,
	/// Attach cookies, auth headers and client addresses
	pub send_default_pii: bool,
	pub request_bodies: RequestBodies,
	/// Log internal errors at `error` instead of `debug`
	pub debug: bool,
	pub integrations: Vec<Arc<dyn Integration>>,
	pub transport: Option<Arc<dyn Transport>>,
	pub internal_error_handler: Option<InternalErrorHandler>,
}

impl ClientOptions {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers an integration
	pub fn add_integration<I: Integration>(mut self, integration: I) -> Self {
		self.integrations.push(Arc::new(integration));
		self
	}

	pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
		self.transport = Some(transport);
		self
	}

	pub fn with_internal_error_handler(mut self, handler: InternalErrorHandler) -> Self {
		self.internal_error_handler = Some(handler);
		self
	}
}

impl fmt::Debug for ClientOptions {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let integrations: Vec<_> = self.integrations.iter().map(|i| i.identifier()).collect();
		f.debug_struct("ClientOptions")
			.field("dsn", &self.dsn)
			.field("release", &self.release)
			.field("environment", &self.environment)
			.field("server_name", &self.server_name)
			.field("send_default_pii", &self.send_default_pii)
			.field("request_bodies", &self.request_bodies)
			.field("debug", &self.debug)
			.field("integrations", &integrations)
			.field("transport", &self.transport.is_some())
			.finish()
	}
}

/// Prepares events and hands them to the transport
pub struct Client {
	options: ClientOptions,
}

impl Client {
	/// Builds a client, giving every integration a chance to adjust the options
	pub fn with_options(mut options: ClientOptions) -> Self {
		let integrations = options.integrations.clone();
		for integration in &integrations {
			integration.setup(&mut options);
			tracing::debug!(
				integration = integration.identifier(),
				"installed integration"
			);
		}
		Self { options }
	}

	pub fn options(&self) -> &ClientOptions {
		&self.options
	}

	/// A client without a transport discards every event
	pub fn is_enabled(&self) -> bool {
		self.options.transport.is_some()
	}

	/// Looks up an installed integration by type
	pub fn get_integration<I: Integration>(&self) -> Option<&I> {
		self.options.integrations.iter().find_map(|integration| {
			let any: &dyn Any = integration.as_ref();
			any.downcast_ref::<I>()
		})
	}

	/// Runs the scope, its processors and the integrations over an event
	///
	/// Returns `None` when any stage dropped the event.
	pub fn prepare_event(&self, event: Event, scope: Option<&Scope>) -> Option<Event> {
		let mut event = match scope {
			Some(scope) => scope.apply_to_event(event, &self.options)?,
			None => event,
		};

		for integration in &self.options.integrations {
			event = integration.process_event(event, &self.options)?;
		}

		if event.release.is_none() {
			event.release = self.options.release.clone();
		}
		if event.environment.is_none() {
			event.environment = self.options.environment.clone();
		}
		if event.server_name.is_none() {
			event.server_name = self.options.server_name.clone();
		}
		event.sdk.get_or_insert_with(|| SdkInfo {
			name: SDK_NAME.to_string(),
			version: env!("CARGO_PKG_VERSION").to_string(),
			integrations: self
				.options
				.integrations
				.iter()
				.map(|integration| integration.identifier().to_string())
				.collect(),
		});

		Some(event)
	}

	/// Prepares and delivers an event, returning its id if it was sent
	pub fn capture_event(&self, event: Event, scope: Option<&Scope>) -> Option<Uuid> {
		let Some(transport) = self.options.transport.as_ref() else {
			tracing::debug!(event_id = %event.event_id, "client has no transport, discarding event");
			return None;
		};
		let event = self.prepare_event(event, scope)?;
		let event_id = event.event_id;
		transport.send_event(event);
		Some(event_id)
	}
}

impl fmt::Debug for Client {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Client")
			.field("options", &self.options)
			.finish()
	}
}

/// The internal-error channel
///
/// Internal errors are logged and forwarded to the configured handler.
/// They never propagate into application code.
pub fn report_internal_error(options: Option<&ClientOptions>, err: &dyn Error) {
	let debug = options.is_some_and(|options| options.debug);
	if debug {
		tracing::error!(target: INTERNAL_ERROR_TARGET, error = %err, "internal error during event capture");
	} else {
		tracing::debug!(target: INTERNAL_ERROR_TARGET, error = %err, "internal error during event capture");
	}
	if let Some(handler) = options.and_then(|options| options.internal_error_handler.as_ref()) {
		handler(err);
	}
}
