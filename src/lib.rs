//! # Reinhardt Sentry
//!
//! Error reporting for Reinhardt applications.
//!
//! Installing the integration registers [`SentryMiddleware`] in the
//! middleware setting, connects the `request_finished` and
//! `got_request_exception` receivers, and binds a client configured from the
//! `SENTRY_*` settings. From then on each request runs in its own scope. An
//! unhandled error is captured together with the request that raised it.
//!
//! ## Quick Start
//!
//! ```
//! use bytes::Bytes;
//! use reinhardt_sentry::{BufferedRequest, Installer, RequestSignals, SentryMiddleware, Settings};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let mut settings: Settings = [
//!     ("SENTRY_DSN", json!("https://public@sentry.example.com/1")),
//!     ("MIDDLEWARE", json!(["app.middleware.Timing"])),
//! ]
//! .into_iter()
//! .collect();
//! let signals = RequestSignals::global();
//!
//! Installer::global().install(&mut settings, signals, None).unwrap();
//! assert_eq!(
//!     settings.string_list("MIDDLEWARE").unwrap()[0],
//!     SentryMiddleware::NAME
//! );
//!
//! // Per request, from the thread or task handling it
//! let request = BufferedRequest::from(http::Request::get("/").body(Bytes::new()).unwrap());
//! SentryMiddleware::new().process_request(Arc::new(request));
//! signals.send_request_finished();
//! # Installer::global().teardown();
//! ```
//!
//! Async hosts bind a fresh hub to each request future with
//! [`HubFutureExt::bind_hub`] so scopes of concurrent requests stay apart.

pub mod error;
pub mod installer;
pub mod integration;
pub mod middleware;
pub mod settings;
pub mod signals;

pub use reinhardt_sentry_core;
pub use reinhardt_sentry_http;

pub use error::{ConfigurationError, ConfigurationResult, MiddlewareError};
pub use installer::{
	CONFLICTING_MIDDLEWARE, InstallState, Installer, MIDDLEWARE_NAME, SentryConfig,
};
pub use integration::{IntegrationOptions, ReinhardtIntegration, TransactionStyle};
pub use middleware::{
	FrameworkRequest, ReinhardtRequestExtractor, RequestProcessor, SentryMiddleware,
};
pub use settings::{RECOGNIZED_SETTINGS, Settings};
pub use signals::{LifecycleHooks, RequestSignals, Signal};

pub use reinhardt_sentry_core::{
	ClientOptions, Event, Hub, HubFutureExt, Level, Transport, capture_exception,
	capture_message,
};
pub use reinhardt_sentry_http::{BufferedRequest, RequestExtractor};
