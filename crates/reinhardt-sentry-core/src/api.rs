//! Free functions operating on the current hub

use crate::client::{Client, ClientOptions};
use crate::event::{Event, Level};
use crate::hub::Hub;
use crate::processor::ProcessorFactory;
use crate::scope::Scope;
use std::error::Error;
use std::sync::Arc;
use uuid::Uuid;

/// Keeps the global client bound; unbinds it when dropped
#[derive(Debug)]
#[must_use = "the client is unbound as soon as the guard is dropped"]
pub struct ClientInitGuard(Arc<Client>);

impl ClientInitGuard {
	pub fn client(&self) -> &Arc<Client> {
		&self.0
	}

	pub fn is_enabled(&self) -> bool {
		self.0.is_enabled()
	}
}

impl Drop for ClientInitGuard {
	fn drop(&mut self) {
		let main = Hub::main();
		let bound = main.client();
		if bound.is_some_and(|client| Arc::ptr_eq(&client, &self.0)) {
			main.bind_client(None);
			tracing::debug!("global client unbound");
		}
	}
}

/// Builds a client and binds it on the main hub
///
/// # Examples
///
/// ```
/// use reinhardt_sentry_core::{ClientOptions, Hub, init};
///
/// let guard = init(ClientOptions::new());
/// assert!(Hub::main().client().is_some());
/// assert!(!guard.is_enabled());
///
/// drop(guard);
/// assert!(Hub::main().client().is_none());
/// ```
pub fn init(options: ClientOptions) -> ClientInitGuard {
	let client = Arc::new(Client::with_options(options));
	tracing::debug!(
		dsn = ?client.options().dsn.as_ref().map(ToString::to_string),
		enabled = client.is_enabled(),
		"client initialized"
	);
	Hub::main().bind_client(Some(client.clone()));
	ClientInitGuard(client)
}

pub fn capture_event(event: Event) -> Option<Uuid> {
	Hub::current().capture_event(event)
}

pub fn capture_exception<E>(err: &E) -> Option<Uuid>
where
	E: Error + ?Sized,
{
	Hub::current().capture_exception(err)
}

pub fn capture_message(message: &str, level: Level) -> Option<Uuid> {
	Hub::current().capture_message(message, level)
}

pub fn capture_internal_exception(err: &dyn Error) {
	Hub::current().capture_internal_exception(err);
}

pub fn configure_scope<F, R>(f: F) -> R
where
	F: FnOnce(&mut Scope) -> R,
{
	Hub::current().configure_scope(f)
}

pub fn push_scope() {
	Hub::current().push_scope();
}

pub fn pop_scope_unsafe() {
	Hub::current().pop_scope_unsafe();
}

pub fn add_event_processor<P>(factory: P)
where
	P: ProcessorFactory + 'static,
{
	Hub::current().add_event_processor(factory);
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::processor::{EventProcessor, Outcome, processor_fn};
	use crate::test::{TestTransport, with_captured_events};
	use rstest::rstest;
	use serial_test::serial;

	#[rstest]
	fn free_functions_act_on_current_hub() {
		// Act
		let events = with_captured_events(|| {
			push_scope();
			configure_scope(|scope| scope.set_transaction(Some("users.detail")));
			add_event_processor(|| {
				Box::new(processor_fn(|event: &mut Event, _: &ClientOptions| {
					event.extra.insert("enriched".to_string(), true.into());
					Ok(Outcome::Keep)
				})) as Box<dyn EventProcessor>
			});
			capture_exception(&std::io::Error::other("db down"));
			pop_scope_unsafe();
		});

		// Assert
		assert_eq!(events.len(), 1);
		assert_eq!(events[0].transaction.as_deref(), Some("users.detail"));
		assert_eq!(events[0].extra["enriched"], true);
		assert_eq!(
			events[0].exception.last().unwrap().value.as_deref(),
			Some("db down")
		);
	}

	#[rstest]
	#[serial]
	fn init_binds_global_client_for_every_thread() {
		// Arrange
		let transport = TestTransport::new();
		let guard = init(ClientOptions::new().with_transport(transport.clone()));

		// Act
		std::thread::spawn(|| capture_message("from worker", Level::Info))
			.join()
			.unwrap();
		drop(guard);
		std::thread::spawn(|| capture_message("after teardown", Level::Info))
			.join()
			.unwrap();

		// Assert
		let events = transport.fetch_and_clear_events();
		assert_eq!(events.len(), 1);
		assert_eq!(events[0].message.as_deref(), Some("from worker"));
	}
}
