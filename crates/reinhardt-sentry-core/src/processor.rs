//! Event processors
//!
//! Processors are registered on a [`Scope`](crate::Scope) through a
//! [`ProcessorFactory`]. The factory runs at capture time, so a processor can
//! hold request state without forcing any read before an error happens.

use crate::client::{ClientOptions, report_internal_error};
use crate::error::{ProcessorError, panic_message};
use crate::event::Event;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// What to do with an event after a processor has seen it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
	/// Hand the (possibly mutated) event to the next stage
	Keep,
	/// Suppress the event entirely
	Drop,
}

/// Enriches or suppresses an outgoing event
pub trait EventProcessor: Send + Sync {
	/// Processes the in-flight event in place.
	///
	/// # Errors
	///
	/// Returns an error when enrichment fails. The pipeline reports it
	/// through the internal-error channel and continues with the event as
	/// it stands.
	fn process(&self, event: &mut Event, options: &ClientOptions)
	-> Result<Outcome, ProcessorError>;
}

/// Lazily produces a processor at capture time
pub trait ProcessorFactory: Send + Sync {
	fn make_processor(&self) -> Box<dyn EventProcessor>;
}

impl<F> ProcessorFactory for F
where
	F: Fn() -> Box<dyn EventProcessor> + Send + Sync,
{
	fn make_processor(&self) -> Box<dyn EventProcessor> {
		self()
	}
}

/// Adapter that turns a closure into an [`EventProcessor`]
pub struct FnProcessor<F>(F);

impl<F> EventProcessor for FnProcessor<F>
where
	F: Fn(&mut Event, &ClientOptions) -> Result<Outcome, ProcessorError> + Send + Sync,
{
	fn process(
		&self,
		event: &mut Event,
		options: &ClientOptions,
	) -> Result<Outcome, ProcessorError> {
		(self.0)(event, options)
	}
}

/// Wraps a closure as a processor
///
/// # Examples
///
/// ```
/// use reinhardt_sentry_core::{ClientOptions, Event, Outcome, EventProcessor, processor_fn};
///
/// let processor = processor_fn(|event: &mut Event, _options: &ClientOptions| {
///     event.tags.insert("team".to_string(), "payments".to_string());
///     Ok(Outcome::Keep)
/// });
///
/// let mut event = Event::new();
/// processor.process(&mut event, &ClientOptions::default()).unwrap();
/// assert_eq!(event.tags["team"], "payments");
/// ```
pub fn processor_fn<F>(f: F) -> FnProcessor<F>
where
	F: Fn(&mut Event, &ClientOptions) -> Result<Outcome, ProcessorError> + Send + Sync,
{
	FnProcessor(f)
}

/// Runs every factory's processor in registration order.
///
/// Returns `None` if a processor dropped the event. Errors and panics are
/// routed to the internal-error channel and never stop the remaining
/// processors.
pub(crate) fn run_processors(
	factories: &[Arc<dyn ProcessorFactory>],
	mut event: Event,
	options: &ClientOptions,
) -> Option<Event> {
	for factory in factories {
		let result = panic::catch_unwind(AssertUnwindSafe(|| {
			factory.make_processor().process(&mut event, options)
		}));
		match result {
			Ok(Ok(Outcome::Keep)) => {}
			Ok(Ok(Outcome::Drop)) => {
				tracing::debug!(event_id = %event.event_id, "event dropped by processor");
				return None;
			}
			Ok(Err(err)) => report_internal_error(Some(options), &err),
			Err(payload) => {
				let err = ProcessorError::Panicked(panic_message(payload.as_ref()));
				report_internal_error(Some(options), &err);
			}
		}
	}
	Some(event)
}
