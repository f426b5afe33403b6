//! Buffered request snapshot

use crate::error::ExtractResult;
use crate::form::{FileMap, FormData, parse_multipart, parse_urlencoded};
use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, COOKIE, HOST};
use http::request::Parts;
use http::{HeaderMap, Method, Uri};
use once_cell::sync::OnceCell;
use std::collections::BTreeMap;
use std::net::SocketAddr;

/// A request whose body was read once, up front
///
/// Every accessor works from the buffered body, so the raw bytes, the
/// parsed form and the uploaded files can be read in any order and any
/// number of times. Parsing happens on first access and is cached.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use reinhardt_sentry_http::BufferedRequest;
///
/// let request = BufferedRequest::from(
///     http::Request::post("/search?page=2")
///         .header("host", "example.com")
///         .header("content-type", "application/x-www-form-urlencoded")
///         .body(Bytes::from_static(b"q=rust"))
///         .unwrap(),
/// );
///
/// assert_eq!(request.body().as_ref(), b"q=rust");
/// assert_eq!(request.form().unwrap()["q"], vec!["rust"]);
/// assert_eq!(request.body().as_ref(), b"q=rust");
/// assert_eq!(request.build_absolute_uri(None), "http://example.com/search");
/// ```
#[derive(Debug)]
pub struct BufferedRequest {
	method: Method,
	uri: Uri,
	headers: HeaderMap,
	body: Bytes,
	remote_addr: Option<SocketAddr>,
	is_secure: bool,
	route_name: Option<String>,
	env: OnceCell<BTreeMap<String, String>>,
	cookies: OnceCell<BTreeMap<String, String>>,
	parsed: OnceCell<ExtractResult<(FormData, FileMap)>>,
}

impl BufferedRequest {
	pub fn new(parts: Parts, body: impl Into<Bytes>) -> Self {
		Self {
			method: parts.method,
			uri: parts.uri,
			headers: parts.headers,
			body: body.into(),
			remote_addr: None,
			is_secure: false,
			route_name: None,
			env: OnceCell::new(),
			cookies: OnceCell::new(),
			parsed: OnceCell::new(),
		}
	}

	pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
		self.remote_addr = Some(addr);
		self.env = OnceCell::new();
		self
	}

	/// Marks the request as received over TLS
	pub fn with_secure(mut self, secure: bool) -> Self {
		self.is_secure = secure;
		self.env = OnceCell::new();
		self
	}

	/// Records the name of the handler the route resolved to
	pub fn with_route_name(mut self, name: impl Into<String>) -> Self {
		self.route_name = Some(name.into());
		self
	}

	pub fn method(&self) -> &Method {
		&self.method
	}

	pub fn uri(&self) -> &Uri {
		&self.uri
	}

	pub fn headers(&self) -> &HeaderMap {
		&self.headers
	}

	pub fn path(&self) -> &str {
		self.uri.path()
	}

	pub fn query_string(&self) -> Option<&str> {
		self.uri.query()
	}

	pub fn remote_addr(&self) -> Option<SocketAddr> {
		self.remote_addr
	}

	pub fn route_name(&self) -> Option<&str> {
		self.route_name.as_deref()
	}

	pub fn is_secure(&self) -> bool {
		self.is_secure || self.uri.scheme_str() == Some("https")
	}

	pub fn scheme(&self) -> &str {
		if self.is_secure() { "https" } else { "http" }
	}

	/// Builds an absolute URI for `path`, or for the request's own path
	pub fn build_absolute_uri(&self, path: Option<&str>) -> String {
		let scheme = self.scheme();
		let host = self.host().unwrap_or_else(|| "localhost".to_string());
		let path = path.unwrap_or_else(|| self.path());

		format!("{}://{}{}", scheme, host, path)
	}

	fn host(&self) -> Option<String> {
		self.headers
			.get(HOST)
			.and_then(|h| h.to_str().ok())
			.map(|s| s.to_string())
			.or_else(|| self.uri.authority().map(|a| a.to_string()))
	}

	pub fn content_type(&self) -> Option<&str> {
		self.headers.get(CONTENT_TYPE).and_then(|h| h.to_str().ok())
	}

	pub fn body(&self) -> &Bytes {
		&self.body
	}

	/// CGI-style metadata: request line, server address and `HTTP_*` headers
	pub fn meta(&self) -> &BTreeMap<String, String> {
		self.env.get_or_init(|| self.build_env())
	}

	fn build_env(&self) -> BTreeMap<String, String> {
		let mut env = BTreeMap::new();
		env.insert("REQUEST_METHOD".to_string(), self.method.to_string());
		env.insert("PATH_INFO".to_string(), self.path().to_string());
		env.insert(
			"QUERY_STRING".to_string(),
			self.query_string().unwrap_or_default().to_string(),
		);

		if let Some(content_type) = self.content_type() {
			env.insert("CONTENT_TYPE".to_string(), content_type.to_string());
		}
		let content_length = self
			.headers
			.get(CONTENT_LENGTH)
			.and_then(|h| h.to_str().ok())
			.map(str::to_string)
			.unwrap_or_else(|| self.body.len().to_string());
		env.insert("CONTENT_LENGTH".to_string(), content_length);

		let default_port = if self.is_secure() { 443 } else { 80 };
		let (server_name, server_port) = match self.host() {
			Some(host) => split_host(&host, default_port),
			None => ("localhost".to_string(), default_port),
		};
		env.insert("SERVER_NAME".to_string(), server_name);
		env.insert("SERVER_PORT".to_string(), server_port.to_string());

		if let Some(addr) = self.remote_addr {
			env.insert("REMOTE_ADDR".to_string(), addr.ip().to_string());
		}

		for name in self.headers.keys() {
			if name == CONTENT_TYPE || name == CONTENT_LENGTH {
				continue;
			}
			let values: Vec<&str> = self
				.headers
				.get_all(name)
				.iter()
				.filter_map(|v| v.to_str().ok())
				.collect();
			if values.is_empty() {
				continue;
			}
			let key = format!(
				"HTTP_{}",
				name.as_str().to_ascii_uppercase().replace('-', "_")
			);
			env.insert(key, values.join(","));
		}

		env
	}

	/// Cookies sent in the `Cookie` header
	pub fn cookies(&self) -> &BTreeMap<String, String> {
		self.cookies.get_or_init(|| {
			let mut cookies = BTreeMap::new();
			for header in self.headers.get_all(COOKIE) {
				let Ok(cookie_str) = header.to_str() else {
					continue;
				};
				for cookie in cookie_str.split(';') {
					let parts: Vec<&str> = cookie.trim().splitn(2, '=').collect();
					if parts.len() == 2 && !parts[0].is_empty() {
						cookies.insert(parts[0].to_string(), parts[1].to_string());
					}
				}
			}
			cookies
		})
	}

	/// Non-file form fields of an urlencoded or multipart body
	pub fn form(&self) -> ExtractResult<&FormData> {
		self.parsed()
			.as_ref()
			.map(|(form, _)| form)
			.map_err(Clone::clone)
	}

	/// Uploaded files of a multipart body
	pub fn files(&self) -> ExtractResult<&FileMap> {
		self.parsed()
			.as_ref()
			.map(|(_, files)| files)
			.map_err(Clone::clone)
	}

	fn parsed(&self) -> &ExtractResult<(FormData, FileMap)> {
		self.parsed.get_or_init(|| {
			let content_type = self.content_type().unwrap_or_default();
			let result = match media_type(content_type).as_str() {
				"application/x-www-form-urlencoded" => {
					parse_urlencoded(&self.body).map(|form| (form, FileMap::new()))
				}
				"multipart/form-data" => parse_multipart(content_type, self.body.clone()),
				_ => Ok((FormData::new(), FileMap::new())),
			};
			if let Err(err) = &result {
				tracing::debug!(path = self.path(), error = %err, "request body could not be parsed");
			}
			result
		})
	}
}

impl From<http::Request<Bytes>> for BufferedRequest {
	fn from(request: http::Request<Bytes>) -> Self {
		let (parts, body) = request.into_parts();
		Self::new(parts, body)
	}
}

/// The lower-cased media type of a `Content-Type` value, parameters stripped
pub(crate) fn media_type(content_type: &str) -> String {
	content_type
		.split(';')
		.next()
		.unwrap_or_default()
		.trim()
		.to_ascii_lowercase()
}

fn split_host(host: &str, default_port: u16) -> (String, u16) {
	// IPv6 literals keep their brackets
	if let Some((name, port)) = host.rsplit_once(':')
		&& !name.ends_with(':')
		&& let Ok(port) = port.parse()
	{
		return (name.to_string(), port);
	}
	(host.to_string(), default_port)
}
