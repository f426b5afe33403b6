//! Django-style request lifecycle signals
//!
//! The integration only needs two notifications from the host: the request
//! finished, and the request raised. [`LifecycleHooks`] is that capability.
//! [`RequestSignals`] is a ready-made implementation for hosts without a
//! signal system of their own.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use reinhardt_sentry_core::error::panic_message;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Receiver called when a request finished
pub type RequestFinishedReceiver = Box<dyn Fn() + Send + Sync>;

/// Receiver called with the error a request raised
pub type RequestExceptionReceiver = Box<dyn Fn(&(dyn Error + 'static)) + Send + Sync>;

/// Lifecycle notifications the host framework delivers
///
/// Receivers connected twice under the same `dispatch_uid` must replace
/// each other rather than run twice.
pub trait LifecycleHooks: Send + Sync {
	fn connect_request_finished(&self, dispatch_uid: &'static str, receiver: RequestFinishedReceiver);

	fn connect_got_request_exception(
		&self,
		dispatch_uid: &'static str,
		receiver: RequestExceptionReceiver,
	);
}

type Receiver<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct SignalReceiver<T> {
	dispatch_uid: Option<String>,
	receiver: Receiver<T>,
}

/// Synchronous signal carrying a `T` to every connected receiver
pub struct Signal<T> {
	name: &'static str,
	receivers: RwLock<Vec<SignalReceiver<T>>>,
}

impl<T> Signal<T> {
	pub fn new(name: &'static str) -> Self {
		Self {
			name,
			receivers: RwLock::new(Vec::new()),
		}
	}

	pub fn name(&self) -> &'static str {
		self.name
	}

	/// Connect a receiver to this signal
	///
	/// A receiver with the same `dispatch_uid` is replaced.
	pub fn connect<F>(&self, receiver: F, dispatch_uid: Option<&str>)
	where
		F: Fn(&T) + Send + Sync + 'static,
	{
		let mut receivers = self.receivers.write();
		if let Some(uid) = dispatch_uid {
			receivers.retain(|r| r.dispatch_uid.as_deref() != Some(uid));
		}
		receivers.push(SignalReceiver {
			dispatch_uid: dispatch_uid.map(str::to_string),
			receiver: Arc::new(receiver),
		});
	}

	/// Disconnect a receiver by dispatch_uid
	pub fn disconnect(&self, dispatch_uid: &str) -> bool {
		let mut receivers = self.receivers.write();
		let original_len = receivers.len();
		receivers.retain(|r| r.dispatch_uid.as_deref() != Some(dispatch_uid));
		receivers.len() < original_len
	}

	pub fn disconnect_all(&self) {
		self.receivers.write().clear();
	}

	/// Send signal to all connected receivers, returning how many ran
	pub fn send(&self, payload: &T) -> usize {
		let receivers = self.snapshot();
		for receiver in &receivers {
			receiver(payload);
		}
		receivers.len()
	}

	/// Send signal robustly (catching panics)
	pub fn send_robust(&self, payload: &T) -> Vec<Result<(), String>> {
		self.snapshot()
			.iter()
			.map(|receiver| {
				std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| receiver(payload)))
					.map_err(|panic| {
						let message = panic_message(panic.as_ref());
						tracing::warn!(signal = self.name, panic = %message, "signal receiver panicked");
						message
					})
			})
			.collect()
	}

	pub fn has_listeners(&self) -> bool {
		!self.receivers.read().is_empty()
	}

	pub fn receivers_count(&self) -> usize {
		self.receivers.read().len()
	}

	// Receivers run outside the lock so they may connect or disconnect
	fn snapshot(&self) -> Vec<Receiver<T>> {
		self.receivers
			.read()
			.iter()
			.map(|r| r.receiver.clone())
			.collect()
	}
}

impl<T> fmt::Debug for Signal<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Signal")
			.field("name", &self.name)
			.field("receivers", &self.receivers_count())
			.finish()
	}
}

/// Payload of `request_finished`
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestFinished;

/// Payload of `got_request_exception`
#[derive(Debug, Clone)]
pub struct GotRequestException {
	pub error: Arc<dyn Error + Send + Sync>,
}

/// The `request_finished` / `got_request_exception` signal pair
///
/// Hosts send both from the execution context that handled the request.
///
/// # Examples
///
/// ```
/// use reinhardt_sentry::signals::{LifecycleHooks, RequestSignals};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let signals = RequestSignals::new();
/// let finished = Arc::new(AtomicUsize::new(0));
/// let counter = finished.clone();
/// signals.connect_request_finished(
///     "count",
///     Box::new(move || {
///         counter.fetch_add(1, Ordering::SeqCst);
///     }),
/// );
///
/// signals.send_request_finished();
/// assert_eq!(finished.load(Ordering::SeqCst), 1);
/// ```
#[derive(Debug)]
pub struct RequestSignals {
	pub request_finished: Signal<RequestFinished>,
	pub got_request_exception: Signal<GotRequestException>,
}

static GLOBAL_SIGNALS: Lazy<RequestSignals> = Lazy::new(RequestSignals::new);

impl RequestSignals {
	pub fn new() -> Self {
		Self {
			request_finished: Signal::new("request_finished"),
			got_request_exception: Signal::new("got_request_exception"),
		}
	}

	/// The process-wide signal pair
	pub fn global() -> &'static RequestSignals {
		&GLOBAL_SIGNALS
	}

	pub fn send_request_finished(&self) {
		self.request_finished.send_robust(&RequestFinished);
	}

	pub fn send_got_request_exception(&self, error: Arc<dyn Error + Send + Sync>) {
		self.got_request_exception
			.send_robust(&GotRequestException { error });
	}
}

impl Default for RequestSignals {
	fn default() -> Self {
		Self::new()
	}
}

impl LifecycleHooks for RequestSignals {
	fn connect_request_finished(&self, dispatch_uid: &'static str, receiver: RequestFinishedReceiver) {
		self.request_finished
			.connect(move |_: &RequestFinished| receiver(), Some(dispatch_uid));
	}

	fn connect_got_request_exception(
		&self,
		dispatch_uid: &'static str,
		receiver: RequestExceptionReceiver,
	) {
		self.got_request_exception.connect(
			move |payload: &GotRequestException| receiver(&*payload.error),
			Some(dispatch_uid),
		);
	}
}
