//! Per-request hook and the processor it registers

use crate::error::MiddlewareError;
use crate::installer::MIDDLEWARE_NAME;
use crate::integration::{ReinhardtIntegration, TransactionStyle};
use reinhardt_sentry_core::error::panic_message;
use reinhardt_sentry_core::{
	ClientOptions, Event, EventProcessor, Hub, Outcome, ProcessorError,
};
use reinhardt_sentry_http::{
	BufferedRequest, ExtractResult, FileMap, FormData, RequestExtractor, UploadedFile,
};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// What the integration needs from a host request object
pub trait FrameworkRequest: Send + Sync {
	fn path(&self) -> &str;

	/// Absolute URI of `path` on the host that received the request
	fn build_absolute_uri(&self, path: &str) -> String;

	/// CGI-style metadata
	fn meta(&self) -> &BTreeMap<String, String>;

	fn cookies(&self) -> &BTreeMap<String, String>;

	fn body(&self) -> &[u8];

	/// Non-file form fields
	fn post(&self) -> ExtractResult<&FormData>;

	fn files(&self) -> ExtractResult<&FileMap>;

	/// Handler name the URL resolved to, if routing already ran
	fn route_name(&self) -> Option<&str>;
}

impl FrameworkRequest for BufferedRequest {
	fn path(&self) -> &str {
		BufferedRequest::path(self)
	}

	fn build_absolute_uri(&self, path: &str) -> String {
		BufferedRequest::build_absolute_uri(self, Some(path))
	}

	fn meta(&self) -> &BTreeMap<String, String> {
		BufferedRequest::meta(self)
	}

	fn cookies(&self) -> &BTreeMap<String, String> {
		BufferedRequest::cookies(self)
	}

	fn body(&self) -> &[u8] {
		BufferedRequest::body(self)
	}

	fn post(&self) -> ExtractResult<&FormData> {
		BufferedRequest::form(self)
	}

	fn files(&self) -> ExtractResult<&FileMap> {
		BufferedRequest::files(self)
	}

	fn route_name(&self) -> Option<&str> {
		BufferedRequest::route_name(self)
	}
}

/// Reads a [`FrameworkRequest`] into an event
pub struct ReinhardtRequestExtractor<'a, R: ?Sized> {
	request: &'a R,
}

impl<'a, R> ReinhardtRequestExtractor<'a, R>
where
	R: FrameworkRequest + ?Sized,
{
	pub fn new(request: &'a R) -> Self {
		Self { request }
	}
}

impl<R> RequestExtractor for ReinhardtRequestExtractor<'_, R>
where
	R: FrameworkRequest + ?Sized,
{
	fn url(&self) -> String {
		self.request.build_absolute_uri(self.request.path())
	}

	fn env(&self) -> &BTreeMap<String, String> {
		self.request.meta()
	}

	fn cookies(&self) -> &BTreeMap<String, String> {
		self.request.cookies()
	}

	fn raw_data(&self) -> &[u8] {
		self.request.body()
	}

	fn form(&self) -> ExtractResult<&FormData> {
		self.request.post()
	}

	fn files(&self) -> ExtractResult<&FileMap> {
		self.request.files()
	}

	fn size_of_file(&self, file: &UploadedFile) -> u64 {
		file.size()
	}
}

/// Attaches one request to every event captured while its scope is active
pub struct RequestProcessor<R: ?Sized> {
	request: Arc<R>,
}

impl<R: ?Sized> RequestProcessor<R> {
	pub fn new(request: Arc<R>) -> Self {
		Self { request }
	}
}

impl<R> EventProcessor for RequestProcessor<R>
where
	R: FrameworkRequest + ?Sized,
{
	fn process(&self, event: &mut Event, options: &ClientOptions) -> Result<Outcome, ProcessorError> {
		ReinhardtRequestExtractor::new(&*self.request)
			.extract_into_event(event, options)
			.map_err(|err| ProcessorError::failed(MiddlewareError::from(err)))?;
		Ok(Outcome::Keep)
	}
}

/// The pre-request hook installed as [`MIDDLEWARE_NAME`]
///
/// Pushes a scope on the current hub for the request. The matching pop runs
/// from the `request_finished` receiver connected by the installer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SentryMiddleware;

impl SentryMiddleware {
	pub const NAME: &'static str = MIDDLEWARE_NAME;

	pub fn new() -> Self {
		Self
	}

	/// Opens the request scope
	///
	/// Never fails: any problem is reported on the internal-error channel.
	pub fn process_request<R>(&self, request: Arc<R>)
	where
		R: FrameworkRequest + 'static,
	{
		let hub = Hub::current();
		let result = panic::catch_unwind(AssertUnwindSafe(|| enter_request(&hub, request)));
		if let Err(panic) = result {
			let err = MiddlewareError::Panicked(panic_message(panic.as_ref()));
			hub.capture_internal_exception(&err);
		}
	}
}

fn enter_request<R>(hub: &Hub, request: Arc<R>)
where
	R: FrameworkRequest + 'static,
{
	hub.push_scope();

	let style = hub
		.client()
		.and_then(|client| {
			client
				.get_integration::<ReinhardtIntegration>()
				.map(|integration| integration.options().transaction_style)
		})
		.unwrap_or_default();
	let transaction = transaction_name(&*request, style);
	tracing::trace!(transaction = %transaction, "request scope opened");

	hub.add_event_processor(move || {
		Box::new(RequestProcessor::new(request.clone())) as Box<dyn EventProcessor>
	});
	hub.configure_scope(|scope| scope.set_transaction(Some(&transaction)));
}

/// Transaction name of a request under `style`
pub fn transaction_name<R>(request: &R, style: TransactionStyle) -> String
where
	R: FrameworkRequest + ?Sized,
{
	let name = match style {
		TransactionStyle::FunctionName => request.route_name().unwrap_or(request.path()),
		TransactionStyle::Url => request.path(),
	};
	name.to_string()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::integration::IntegrationOptions;
	use bytes::Bytes;
	use reinhardt_sentry_core::test::with_captured_events_options;
	use reinhardt_sentry_core::{RequestData, capture_exception, pop_scope_unsafe};
	use reinhardt_sentry_http::ExtractError;
	use rstest::rstest;

	fn request(path: &str) -> BufferedRequest {
		BufferedRequest::from(
			http::Request::get(path)
				.header("host", "shop.example.com")
				.body(Bytes::new())
				.unwrap(),
		)
	}

	fn options(style: TransactionStyle) -> ClientOptions {
		ClientOptions::default().add_integration(ReinhardtIntegration::new(IntegrationOptions {
			transaction_style: style,
		}))
	}

	#[rstest]
	#[case(TransactionStyle::FunctionName, Some("orders.views.detail"), "orders.views.detail")]
	#[case(TransactionStyle::FunctionName, None, "/orders/9")]
	#[case(TransactionStyle::Url, Some("orders.views.detail"), "/orders/9")]
	fn transaction_follows_style(
		#[case] style: TransactionStyle,
		#[case] route: Option<&str>,
		#[case] expected: &str,
	) {
		// Arrange
		let mut req = request("/orders/9");
		if let Some(route) = route {
			req = req.with_route_name(route);
		}

		// Act
		let events = with_captured_events_options(
			|| {
				SentryMiddleware::new().process_request(Arc::new(req));
				capture_exception(&std::io::Error::other("boom"));
				pop_scope_unsafe();
			},
			options(style),
		);

		// Assert
		assert_eq!(events[0].transaction.as_deref(), Some(expected));
	}

	#[rstest]
	fn captured_event_carries_request() {
		// Act
		let events = with_captured_events_options(
			|| {
				SentryMiddleware::new().process_request(Arc::new(request("/cart?coupon=X")));
				capture_exception(&std::io::Error::other("cart unavailable"));
				pop_scope_unsafe();
			},
			options(TransactionStyle::Url),
		);

		// Assert
		let info = events[0].request.as_ref().unwrap();
		assert_eq!(info.url.as_deref(), Some("http://shop.example.com/cart"));
		assert_eq!(info.query_string.as_deref(), Some("coupon=X"));
		assert_eq!(info.method.as_deref(), Some("GET"));
		assert_eq!(info.data, None);
	}

	#[rstest]
	fn scope_is_closed_by_pop() {
		let events = with_captured_events_options(
			|| {
				SentryMiddleware::new().process_request(Arc::new(request("/a")));
				pop_scope_unsafe();
				capture_exception(&std::io::Error::other("after request"));
			},
			options(TransactionStyle::Url),
		);

		assert_eq!(events[0].transaction, None);
		assert!(events[0].request.is_none());
	}

	/// Request whose body can never be parsed
	struct BrokenForm {
		meta: BTreeMap<String, String>,
		cookies: BTreeMap<String, String>,
	}

	impl FrameworkRequest for BrokenForm {
		fn path(&self) -> &str {
			"/broken"
		}

		fn build_absolute_uri(&self, path: &str) -> String {
			format!("http://testserver{}", path)
		}

		fn meta(&self) -> &BTreeMap<String, String> {
			&self.meta
		}

		fn cookies(&self) -> &BTreeMap<String, String> {
			&self.cookies
		}

		fn body(&self) -> &[u8] {
			b"%%%"
		}

		fn post(&self) -> ExtractResult<&FormData> {
			Err(ExtractError::MalformedForm("invalid percent escape".to_string()))
		}

		fn files(&self) -> ExtractResult<&FileMap> {
			Err(ExtractError::MalformedForm("invalid percent escape".to_string()))
		}

		fn route_name(&self) -> Option<&str> {
			Some("broken.view")
		}
	}

	#[rstest]
	fn extraction_failure_still_reports_error_with_partial_request() {
		// Arrange
		let reported = Arc::new(parking_lot::Mutex::new(Vec::new()));
		let sink = reported.clone();
		let options =
			options(TransactionStyle::FunctionName).with_internal_error_handler(Arc::new(move |err: &dyn std::error::Error| {
				sink.lock().push(err.to_string());
			}));
		let broken = BrokenForm {
			meta: BTreeMap::from([("REQUEST_METHOD".to_string(), "POST".to_string())]),
			cookies: BTreeMap::new(),
		};

		// Act
		let events = with_captured_events_options(
			|| {
				SentryMiddleware::new().process_request(Arc::new(broken));
				capture_exception(&std::io::Error::other("original failure"));
				pop_scope_unsafe();
			},
			options,
		);

		// Assert
		assert_eq!(events.len(), 1);
		let event = &events[0];
		assert_eq!(
			event.exception.last().unwrap().value.as_deref(),
			Some("original failure")
		);
		assert_eq!(event.transaction.as_deref(), Some("broken.view"));
		let info = event.request.as_ref().unwrap();
		assert_eq!(info.url.as_deref(), Some("http://testserver/broken"));
		assert_eq!(info.method.as_deref(), Some("POST"));
		assert!(!matches!(info.data, Some(RequestData::Form(_))));
		let reported = reported.lock();
		assert_eq!(reported.len(), 1);
		assert!(reported[0].contains("invalid percent escape"));
	}
}
