//! One-time installation of the integration

use crate::error::{ConfigurationError, ConfigurationResult};
use crate::integration::ReinhardtIntegration;
use crate::settings::{MIDDLEWARE, MIDDLEWARE_CLASSES, Settings};
use crate::signals::LifecycleHooks;
use parking_lot::Mutex;
use reinhardt_sentry_core::{
	ClientInitGuard, Transport, capture_exception, init, pop_scope_unsafe,
};
use serde_json::Value;
use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

/// Entry this integration adds to the middleware list
pub const MIDDLEWARE_NAME: &str = "reinhardt.contrib.sentry.middleware.SentryMiddleware";

/// Middleware that must not run alongside this integration
pub const CONFLICTING_MIDDLEWARE: &[&str] = &[
	"raven.contrib.reinhardt.middleware.SentryMiddleware",
	"raven.contrib.reinhardt.middleware.SentryLogMiddleware",
	MIDDLEWARE_NAME,
];

pub const REQUEST_FINISHED_UID: &str = "reinhardt_sentry.request_finished";
pub const GOT_REQUEST_EXCEPTION_UID: &str = "reinhardt_sentry.got_request_exception";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InstallState {
	Uninstalled = 0,
	Installing = 1,
	Installed = 2,
}

impl InstallState {
	fn from_u8(value: u8) -> Self {
		match value {
			1 => Self::Installing,
			2 => Self::Installed,
			_ => Self::Uninstalled,
		}
	}
}

/// Installs the integration at most once per process
///
/// Concurrent callers serialize on an internal lock; once installed every
/// call returns immediately.
#[derive(Debug)]
pub struct Installer {
	state: AtomicU8,
	guard: Mutex<Option<ClientInitGuard>>,
	runs: AtomicUsize,
}

static GLOBAL_INSTALLER: Installer = Installer::new();

impl Installer {
	pub const fn new() -> Self {
		Self {
			state: AtomicU8::new(InstallState::Uninstalled as u8),
			guard: Mutex::new(None),
			runs: AtomicUsize::new(0),
		}
	}

	/// The process-wide installer
	pub fn global() -> &'static Installer {
		&GLOBAL_INSTALLER
	}

	pub fn state(&self) -> InstallState {
		InstallState::from_u8(self.state.load(Ordering::Acquire))
	}

	pub fn is_installed(&self) -> bool {
		self.state() == InstallState::Installed
	}

	/// How many times the install steps ran to completion
	pub fn install_count(&self) -> usize {
		self.runs.load(Ordering::Acquire)
	}

	/// Installs the integration
	///
	/// Adds [`MIDDLEWARE_NAME`] to the active middleware setting, connects
	/// the lifecycle receivers and binds a client configured from
	/// `settings`. On error `settings` is left untouched and a later call may
	/// try again.
	pub fn install(
		&self,
		settings: &mut Settings,
		hooks: &dyn LifecycleHooks,
		transport: Option<Arc<dyn Transport>>,
	) -> ConfigurationResult<()> {
		if self.is_installed() {
			return Ok(());
		}

		let mut guard = self.guard.lock();
		if self.is_installed() {
			return Ok(());
		}
		let mut window = InstallingWindow::open(&self.state);

		match install_steps(settings, hooks, transport) {
			Ok(client) => {
				*guard = Some(client);
				self.runs.fetch_add(1, Ordering::AcqRel);
				window.close(InstallState::Installed);
				tracing::debug!("sentry integration installed");
				Ok(())
			}
			Err(err) => {
				window.close(InstallState::Uninstalled);
				tracing::error!(error = %err, "sentry integration could not be installed");
				Err(err)
			}
		}
	}

	/// Unbinds the client and returns to `Uninstalled`
	///
	/// Receivers stay connected; a later install replaces them by dispatch uid.
	pub fn teardown(&self) {
		let mut guard = self.guard.lock();
		guard.take();
		self.state
			.store(InstallState::Uninstalled as u8, Ordering::Release);
		tracing::debug!("sentry integration torn down");
	}
}

/// Holds the `Installing` state; stores `Uninstalled` on drop unless closed
struct InstallingWindow<'a> {
	state: &'a AtomicU8,
	closed: bool,
}

impl<'a> InstallingWindow<'a> {
	fn open(state: &'a AtomicU8) -> Self {
		state.store(InstallState::Installing as u8, Ordering::Release);
		Self {
			state,
			closed: false,
		}
	}

	fn close(&mut self, outcome: InstallState) {
		self.state.store(outcome as u8, Ordering::Release);
		self.closed = true;
	}
}

impl Drop for InstallingWindow<'_> {
	fn drop(&mut self) {
		if !self.closed {
			self.state
				.store(InstallState::Uninstalled as u8, Ordering::Release);
			tracing::error!("sentry integration install aborted by a panic");
		}
	}
}

impl Default for Installer {
	fn default() -> Self {
		Self::new()
	}
}

fn install_steps(
	settings: &mut Settings,
	hooks: &dyn LifecycleHooks,
	transport: Option<Arc<dyn Transport>>,
) -> ConfigurationResult<ClientInitGuard> {
	let (client_options, integration_options) = ReinhardtIntegration::parse_settings(settings)?;

	let key = middleware_key(settings);
	let middleware = match settings.get(key) {
		None | Some(Value::Null) => Vec::new(),
		Some(_) => settings
			.string_list(key)
			.ok_or_else(|| ConfigurationError::InvalidSetting {
				key: key.to_string(),
				expected: "a list of strings",
			})?,
	};
	let conflicts: Vec<String> = CONFLICTING_MIDDLEWARE
		.iter()
		.filter(|name| middleware.iter().any(|entry| entry == *name))
		.map(|name| name.to_string())
		.collect();
	if !conflicts.is_empty() {
		return Err(ConfigurationError::ConflictingMiddleware(conflicts));
	}

	let mut updated = Vec::with_capacity(middleware.len() + 1);
	updated.push(MIDDLEWARE_NAME.to_string());
	updated.extend(middleware);
	settings.set_string_list(key, updated);

	hooks.connect_request_finished(REQUEST_FINISHED_UID, Box::new(pop_scope_unsafe));
	hooks.connect_got_request_exception(
		GOT_REQUEST_EXCEPTION_UID,
		Box::new(|err: &(dyn Error + 'static)| {
			capture_exception(err);
		}),
	);

	let mut client_options =
		client_options.add_integration(ReinhardtIntegration::new(integration_options));
	if let Some(transport) = transport {
		client_options = client_options.with_transport(transport);
	}
	tracing::debug!(middleware_setting = key, "sentry middleware registered");
	Ok(init(client_options))
}

/// `MIDDLEWARE` when it holds a non-empty list, `MIDDLEWARE_CLASSES` otherwise
pub fn middleware_key(settings: &Settings) -> &'static str {
	let modern = settings
		.get(MIDDLEWARE)
		.and_then(Value::as_array)
		.is_some_and(|list| !list.is_empty());
	if modern { MIDDLEWARE } else { MIDDLEWARE_CLASSES }
}

/// Application config whose `ready` hook installs the integration
#[derive(Debug, Clone, Copy, Default)]
pub struct SentryConfig;

impl SentryConfig {
	pub const NAME: &'static str = "reinhardt.contrib.sentry";
	pub const LABEL: &'static str = "reinhardt_contrib_sentry";
	pub const VERBOSE_NAME: &'static str = "Sentry";

	/// Installs through the global installer
	pub fn ready(
		&self,
		settings: &mut Settings,
		hooks: &dyn LifecycleHooks,
		transport: Option<Arc<dyn Transport>>,
	) -> ConfigurationResult<()> {
		Installer::global().install(settings, hooks, transport)
	}
}
