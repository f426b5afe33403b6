//! Binding a hub to a future

use crate::hub::Hub;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// A future that makes its hub current on every poll
pub struct HubFuture<F> {
	hub: Arc<Hub>,
	future: Pin<Box<F>>,
}

impl<F> Future for HubFuture<F>
where
	F: Future,
{
	type Output = F::Output;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let this = self.get_mut();
		Hub::run(this.hub.clone(), || this.future.as_mut().poll(cx))
	}
}

/// Extension to run a future inside a specific hub
///
/// # Examples
///
/// ```
/// use reinhardt_sentry_core::{Hub, HubFutureExt};
/// use std::sync::Arc;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let hub = Arc::new(Hub::new(None));
/// let depth = async {
///     Hub::current().push_scope();
///     Hub::current().depth()
/// }
/// .bind_hub(hub.clone())
/// .await;
///
/// assert_eq!(depth, 2);
/// assert_eq!(hub.depth(), 2);
/// # });
/// ```
pub trait HubFutureExt: Future + Sized {
	fn bind_hub(self, hub: Arc<Hub>) -> HubFuture<Self> {
		HubFuture {
			hub,
			future: Box::pin(self),
		}
	}
}

impl<F> HubFutureExt for F where F: Future {}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn concurrent_tasks_never_observe_each_other() {
		// Arrange
		let tasks: Vec<_> = (0..16)
			.map(|i| {
				let hub = Arc::new(Hub::new(None));
				tokio::spawn(
					async move {
						Hub::current().push_scope();
						Hub::current()
							.configure_scope(|scope| scope.set_tag("task", i.to_string()));
						tokio::task::yield_now().await;
						let tag = Hub::current()
							.configure_scope(|scope| scope.tags().get("task").cloned());
						Hub::current().pop_scope_unsafe();
						(i, tag, Hub::current().depth())
					}
					.bind_hub(hub),
				)
			})
			.collect();

		// Act
		let mut results = Vec::new();
		for task in tasks {
			results.push(task.await.unwrap());
		}

		// Assert
		for (i, tag, depth) in results {
			assert_eq!(tag, Some(i.to_string()));
			assert_eq!(depth, 1);
		}
	}

	#[rstest]
	#[tokio::test]
	async fn bound_hub_is_released_after_poll() {
		let outer = Hub::current();
		let hub = Arc::new(Hub::new(None));

		async {}.bind_hub(hub.clone()).await;

		assert!(Arc::ptr_eq(&Hub::current(), &outer));
	}
}
