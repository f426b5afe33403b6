//! Per-execution-context scope stacks
//!
//! Every OS thread owns a [`Hub`], created on first use. Async tasks move
//! between worker threads, so a request handled on a runtime binds its own
//! hub to its future with [`HubFutureExt::bind_hub`](crate::HubFutureExt).
//! Mutations made through one hub are never visible through another.
//!
//! The process-wide main hub holds the globally bound client. A hub without
//! a directly bound client falls back to it.

use crate::client::{Client, report_internal_error};
use crate::event::{Event, Level};
use crate::processor::ProcessorFactory;
use crate::scope::Scope;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use std::cell::RefCell;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

static MAIN_HUB: Lazy<Arc<Hub>> = Lazy::new(|| Arc::new(Hub::new(None)));

thread_local! {
	static THREAD_HUB: RefCell<Option<Arc<Hub>>> = const { RefCell::new(None) };
}

/// Root scope plus pushed layers; the root is never popped
#[derive(Default)]
struct ScopeStack {
	root: Scope,
	layers: Vec<Scope>,
}

impl ScopeStack {
	fn top(&self) -> &Scope {
		self.layers.last().unwrap_or(&self.root)
	}

	fn top_mut(&mut self) -> &mut Scope {
		self.layers.last_mut().unwrap_or(&mut self.root)
	}

	fn depth(&self) -> usize {
		self.layers.len() + 1
	}
}

/// Owner of one execution context's scope stack
pub struct Hub {
	client: RwLock<Option<Arc<Client>>>,
	stack: Mutex<ScopeStack>,
}

impl Hub {
	/// Creates a hub with only the root scope
	pub fn new(client: Option<Arc<Client>>) -> Self {
		Self {
			client: RwLock::new(client),
			stack: Mutex::new(ScopeStack::default()),
		}
	}

	/// The process-wide hub carrying the globally bound client
	pub fn main() -> Arc<Hub> {
		MAIN_HUB.clone()
	}

	/// The hub of the calling execution context
	pub fn current() -> Arc<Hub> {
		THREAD_HUB.with(|cell| {
			cell.borrow_mut()
				.get_or_insert_with(|| Arc::new(Hub::new(None)))
				.clone()
		})
	}

	/// Runs `f` with `hub` as the current hub, restoring the previous one after
	pub fn run<F, R>(hub: Arc<Hub>, f: F) -> R
	where
		F: FnOnce() -> R,
	{
		let previous = THREAD_HUB.with(|cell| cell.replace(Some(hub)));
		let _restore = RestoreOnDrop(previous);
		f()
	}

	/// The client bound to this hub, or the main hub's client
	pub fn client(&self) -> Option<Arc<Client>> {
		let own = self.client.read().clone();
		own.or_else(|| {
			if std::ptr::eq(self, &**MAIN_HUB) {
				None
			} else {
				MAIN_HUB.client.read().clone()
			}
		})
	}

	pub fn bind_client(&self, client: Option<Arc<Client>>) {
		*self.client.write() = client;
	}

	/// Pushes a fresh scope that inherits nothing from its parent
	pub fn push_scope(&self) {
		let mut stack = self.stack.lock();
		stack.layers.push(Scope::default());
		tracing::trace!(depth = stack.depth(), "pushed scope");
	}

	/// Pushes a scope that is popped when the returned guard drops
	pub fn push_scope_guarded(self: &Arc<Self>) -> ScopeGuard {
		let depth = {
			let mut stack = self.stack.lock();
			stack.layers.push(Scope::default());
			stack.depth()
		};
		ScopeGuard {
			hub: self.clone(),
			depth,
		}
	}

	/// Pops the top scope without checking it pairs with a push.
	///
	/// Callers guarantee pairing through lifecycle ordering. Popping when
	/// only the root scope is left does nothing.
	pub fn pop_scope_unsafe(&self) {
		let mut stack = self.stack.lock();
		if stack.layers.pop().is_some() {
			tracing::trace!(depth = stack.depth(), "popped scope");
		} else {
			tracing::trace!("ignored pop on empty scope stack");
		}
	}

	/// Number of scopes on the stack, root included
	pub fn depth(&self) -> usize {
		self.stack.lock().depth()
	}

	/// Mutably borrows the top scope.
	///
	/// The hub stays locked while `f` runs; `f` must not call back into the
	/// same hub.
	pub fn configure_scope<F, R>(&self, f: F) -> R
	where
		F: FnOnce(&mut Scope) -> R,
	{
		let mut stack = self.stack.lock();
		f(stack.top_mut())
	}

	/// Appends a processor factory to the top scope
	pub fn add_event_processor<P>(&self, factory: P)
	where
		P: ProcessorFactory + 'static,
	{
		self.configure_scope(|scope| scope.add_event_processor(Arc::new(factory)));
	}

	/// Captures an event through the bound client and the top scope
	///
	/// Processors run on a snapshot of the top scope, after the hub lock is
	/// released, so they may use the hub themselves.
	pub fn capture_event(&self, event: Event) -> Option<Uuid> {
		let Some(client) = self.client() else {
			tracing::trace!(event_id = %event.event_id, "no client bound, event not captured");
			return None;
		};
		let scope = self.stack.lock().top().clone();
		client.capture_event(event, Some(&scope))
	}

	pub fn capture_exception<E>(&self, err: &E) -> Option<Uuid>
	where
		E: Error + ?Sized,
	{
		self.capture_event(Event::from_error(err))
	}

	pub fn capture_message(&self, message: &str, level: Level) -> Option<Uuid> {
		self.capture_event(Event::from_message(message, level))
	}

	/// Routes an error raised by the reporting machinery itself
	pub fn capture_internal_exception(&self, err: &dyn Error) {
		let client = self.client();
		report_internal_error(client.as_deref().map(Client::options), err);
	}
}

impl fmt::Debug for Hub {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Hub")
			.field("client", &self.client.read().is_some())
			.field("depth", &self.depth())
			.finish()
	}
}

struct RestoreOnDrop(Option<Arc<Hub>>);

impl Drop for RestoreOnDrop {
	fn drop(&mut self) {
		let previous = self.0.take();
		THREAD_HUB.with(|cell| *cell.borrow_mut() = previous);
	}
}

/// Pops its scope when dropped
#[must_use = "the scope is popped as soon as the guard is dropped"]
pub struct ScopeGuard {
	hub: Arc<Hub>,
	depth: usize,
}

impl Drop for ScopeGuard {
	fn drop(&mut self) {
		let mut stack = self.hub.stack.lock();
		if stack.depth() == self.depth {
			stack.layers.pop();
		} else {
			tracing::warn!(
				expected = self.depth,
				actual = stack.depth(),
				"scope guard released out of order, stack left untouched"
			);
		}
	}
}
