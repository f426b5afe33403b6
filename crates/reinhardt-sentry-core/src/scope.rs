use crate::client::ClientOptions;
use crate::event::Event;
use crate::processor::{ProcessorFactory, run_processors};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Request-scoped contextual data applied to captured events
#[derive(Clone, Default)]
pub struct Scope {
	transaction: Option<String>,
	tags: BTreeMap<String, String>,
	extra: BTreeMap<String, Value>,
	event_processors: Vec<Arc<dyn ProcessorFactory>>,
}

impl Scope {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn transaction(&self) -> Option<&str> {
		self.transaction.as_deref()
	}

	pub fn set_transaction(&mut self, transaction: Option<&str>) {
		self.transaction = transaction.map(str::to_string);
	}

	pub fn tags(&self) -> &BTreeMap<String, String> {
		&self.tags
	}

	pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
		self.tags.insert(key.into(), value.into());
	}

	pub fn remove_tag(&mut self, key: &str) {
		self.tags.remove(key);
	}

	pub fn extra(&self) -> &BTreeMap<String, Value> {
		&self.extra
	}

	pub fn set_extra(&mut self, key: impl Into<String>, value: impl Into<Value>) {
		self.extra.insert(key.into(), value.into());
	}

	/// Appends a processor factory; it runs only when an event is captured
	pub fn add_event_processor(&mut self, factory: Arc<dyn ProcessorFactory>) {
		self.event_processors.push(factory);
	}

	pub fn event_processor_count(&self) -> usize {
		self.event_processors.len()
	}

	/// Resets the scope to its empty state
	pub fn clear(&mut self) {
		*self = Self::default();
	}

	/// Applies scope data and runs the registered processors
	///
	/// Values already present on the event win over scope values.
	pub fn apply_to_event(&self, mut event: Event, options: &ClientOptions) -> Option<Event> {
		if event.transaction.is_none() {
			event.transaction = self.transaction.clone();
		}
		for (key, value) in &self.tags {
			event
				.tags
				.entry(key.clone())
				.or_insert_with(|| value.clone());
		}
		for (key, value) in &self.extra {
			event
				.extra
				.entry(key.clone())
				.or_insert_with(|| value.clone());
		}

		run_processors(&self.event_processors, event, options)
	}
}

impl fmt::Debug for Scope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Scope")
			.field("transaction", &self.transaction)
			.field("tags", &self.tags)
			.field("extra", &self.extra)
			.field("event_processors", &self.event_processors.len())
			.finish()
	}
}
