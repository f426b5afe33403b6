//! # Reinhardt Sentry Core
//!
//! The event-capture pipeline behind Reinhardt's error reporting.
//!
//! ## Pieces
//!
//! - [`Hub`]: one per execution context, owning a stack of [`Scope`]s
//! - [`Scope`]: transaction name, tags, extra data and event processors
//! - [`EventProcessor`] / [`ProcessorFactory`]: enrich or drop events at capture time
//! - [`Client`]: prepares events and hands them to a [`Transport`]
//! - [`Integration`]: named framework bindings registered on the client
//!
//! ## Example
//!
//! ```
//! use reinhardt_sentry_core::{Client, ClientOptions, Event, Hub, Transport};
//! use std::sync::{Arc, Mutex};
//!
//! #[derive(Default)]
//! struct Recorder(Mutex<Vec<Event>>);
//!
//! impl Transport for Recorder {
//!     fn send_event(&self, event: Event) {
//!         self.0.lock().unwrap().push(event);
//!     }
//! }
//!
//! let recorder = Arc::new(Recorder::default());
//! let client = Client::with_options(ClientOptions::new().with_transport(recorder.clone()));
//! let hub = Arc::new(Hub::new(Some(Arc::new(client))));
//!
//! Hub::run(hub, || {
//!     reinhardt_sentry_core::push_scope();
//!     reinhardt_sentry_core::configure_scope(|scope| scope.set_transaction(Some("orders.create")));
//!     reinhardt_sentry_core::capture_exception(&std::io::Error::other("payment gateway timeout"));
//!     reinhardt_sentry_core::pop_scope_unsafe();
//! });
//!
//! let events = recorder.0.lock().unwrap();
//! assert_eq!(events[0].transaction.as_deref(), Some("orders.create"));
//! ```
//!
//! Internal failures (a processor erroring or panicking) never reach the
//! caller. They go to the internal-error channel: a `tracing` event on the
//! `reinhardt_sentry::internal` target plus the optional
//! [`ClientOptions::internal_error_handler`].

pub mod api;
pub mod client;
pub mod error;
pub mod event;
pub mod future;
pub mod hub;
pub mod processor;
pub mod scope;

pub use api::{
	ClientInitGuard, add_event_processor, capture_event, capture_exception,
	capture_internal_exception, capture_message, configure_scope, init, pop_scope_unsafe,
	push_scope,
};
pub use client::{
	Client, ClientOptions, Dsn, INTERNAL_ERROR_TARGET, Integration, InternalErrorHandler,
	RequestBodies, SDK_NAME, Transport, report_internal_error,
};
pub use error::{DsnError, ProcessorError};
pub use event::{Event, Exception, FormValue, Level, RequestData, RequestInfo, SdkInfo};
pub use future::{HubFuture, HubFutureExt};
pub use hub::{Hub, ScopeGuard};
pub use processor::{EventProcessor, FnProcessor, Outcome, ProcessorFactory, processor_fn};
pub use scope::Scope;
