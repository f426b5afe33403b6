//! Reading request metadata into events

use crate::error::ExtractResult;
use crate::form::{FileMap, FormData, UploadedFile};
use crate::request::{BufferedRequest, media_type};
use reinhardt_sentry_core::{ClientOptions, Event, FormValue, RequestData, RequestInfo};
use std::collections::BTreeMap;

/// Headers attached only when `send_default_pii` is enabled
pub const SENSITIVE_HEADERS: &[&str] = &[
	"Authorization",
	"Cookie",
	"Proxy-Authorization",
	"X-Forwarded-For",
	"X-Real-Ip",
];

/// A view of one request that can be recorded on an event
///
/// Implementors provide the raw accessors; [`extract_into_event`] turns them
/// into a [`RequestInfo`].
///
/// [`extract_into_event`]: RequestExtractor::extract_into_event
pub trait RequestExtractor {
	/// Absolute URL of the request, without the query string
	fn url(&self) -> String;

	/// CGI-style metadata (`REQUEST_METHOD`, `HTTP_*`, ...)
	fn env(&self) -> &BTreeMap<String, String>;

	fn cookies(&self) -> &BTreeMap<String, String>;

	fn raw_data(&self) -> &[u8];

	fn form(&self) -> ExtractResult<&FormData>;

	fn files(&self) -> ExtractResult<&FileMap>;

	fn size_of_file(&self, file: &UploadedFile) -> u64;

	/// Length of the buffered body; a declared `CONTENT_LENGTH` is not trusted
	fn content_length(&self) -> usize {
		self.raw_data().len()
	}

	fn is_json(&self) -> bool {
		let Some(content_type) = self.env().get("CONTENT_TYPE") else {
			return false;
		};
		let media_type = media_type(content_type);
		media_type == "application/json" || media_type.ends_with("+json")
	}

	/// The body as it should appear on an event, `None` when there is none
	fn parsed_body(&self) -> ExtractResult<Option<RequestData>> {
		let form = self.form()?;
		let files = self.files()?;
		if !form.is_empty() || !files.is_empty() {
			let mut data: BTreeMap<String, FormValue> = form
				.iter()
				.map(|(key, values)| (key.clone(), FormValue::from_values(values)))
				.collect();
			for (field, file) in files {
				data.insert(
					field.clone(),
					FormValue::File {
						filename: Some(file.filename.clone()),
						size: self.size_of_file(file),
					},
				);
			}
			return Ok(Some(RequestData::Form(data)));
		}

		let raw = self.raw_data();
		if raw.is_empty() {
			return Ok(None);
		}
		if self.is_json()
			&& let Ok(value) = serde_json::from_slice(raw)
		{
			return Ok(Some(RequestData::Json(value)));
		}
		Ok(Some(RequestData::Omitted { len: raw.len() }))
	}

	/// Records the request on `event`
	///
	/// An event that already carries request data is left alone. Fields are
	/// written as they are read: when a step fails, the fields set before it
	/// stay on the event and the error is returned.
	fn extract_into_event(&self, event: &mut Event, options: &ClientOptions) -> ExtractResult<()> {
		if event.request.is_some() {
			return Ok(());
		}

		let env = self.env();
		let pii = options.send_default_pii;
		let info = event.request.insert(RequestInfo {
			url: Some(self.url()),
			method: env.get("REQUEST_METHOD").cloned(),
			query_string: env.get("QUERY_STRING").filter(|q| !q.is_empty()).cloned(),
			headers: headers_from_env(env, pii),
			..Default::default()
		});

		for key in ["SERVER_NAME", "SERVER_PORT"] {
			if let Some(value) = env.get(key) {
				info.env.insert(key.to_string(), value.clone());
			}
		}
		if pii {
			if let Some(addr) = env.get("REMOTE_ADDR") {
				info.env.insert("REMOTE_ADDR".to_string(), addr.clone());
			}
			info.cookies = self.cookies().clone();
		}

		let len = self.content_length();
		if !options.request_bodies.allows(len) {
			info.data = Some(RequestData::Omitted { len });
			return Ok(());
		}
		info.data = self.parsed_body()?;
		Ok(())
	}
}

/// Rebuilds header names from `HTTP_*` and content keys of a CGI mapping
fn headers_from_env(env: &BTreeMap<String, String>, pii: bool) -> BTreeMap<String, String> {
	env.iter()
		.filter_map(|(key, value)| {
			let name = match key.strip_prefix("HTTP_") {
				Some(name) => name,
				None if key == "CONTENT_TYPE" || key == "CONTENT_LENGTH" => key.as_str(),
				None => return None,
			};
			Some((header_case(name), value.clone()))
		})
		.filter(|(name, _)| pii || !SENSITIVE_HEADERS.contains(&name.as_str()))
		.collect()
}

/// `X_FORWARDED_FOR` -> `X-Forwarded-For`
fn header_case(name: &str) -> String {
	name.split('_')
		.map(|part| {
			let lower = part.to_ascii_lowercase();
			let mut chars = lower.chars();
			match chars.next() {
				Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
				None => String::new(),
			}
		})
		.collect::<Vec<_>>()
		.join("-")
}

impl RequestExtractor for BufferedRequest {
	fn url(&self) -> String {
		self.build_absolute_uri(None)
	}

	fn env(&self) -> &BTreeMap<String, String> {
		self.meta()
	}

	fn cookies(&self) -> &BTreeMap<String, String> {
		BufferedRequest::cookies(self)
	}

	fn raw_data(&self) -> &[u8] {
		self.body()
	}

	fn form(&self) -> ExtractResult<&FormData> {
		BufferedRequest::form(self)
	}

	fn files(&self) -> ExtractResult<&FileMap> {
		BufferedRequest::files(self)
	}

	fn size_of_file(&self, file: &UploadedFile) -> u64 {
		file.size()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ExtractError;
	use crate::fixtures::{BOUNDARY, multipart_body};
	use bytes::Bytes;
	use reinhardt_sentry_core::RequestBodies;
	use rstest::{fixture, rstest};
	use serde_json::json;

	/// Extractor whose body, form and files are set independently
	struct StaticExtractor {
		env: BTreeMap<String, String>,
		cookies: BTreeMap<String, String>,
		body: Vec<u8>,
		form: ExtractResult<FormData>,
		files: FileMap,
	}

	impl RequestExtractor for StaticExtractor {
		fn url(&self) -> String {
			"http://testserver/submit".to_string()
		}

		fn env(&self) -> &BTreeMap<String, String> {
			&self.env
		}

		fn cookies(&self) -> &BTreeMap<String, String> {
			&self.cookies
		}

		fn raw_data(&self) -> &[u8] {
			&self.body
		}

		fn form(&self) -> ExtractResult<&FormData> {
			self.form.as_ref().map_err(Clone::clone)
		}

		fn files(&self) -> ExtractResult<&FileMap> {
			Ok(&self.files)
		}

		fn size_of_file(&self, file: &UploadedFile) -> u64 {
			file.size
		}
	}

	#[fixture]
	fn extractor() -> StaticExtractor {
		let env = BTreeMap::from([
			("REQUEST_METHOD".to_string(), "POST".to_string()),
			("QUERY_STRING".to_string(), "".to_string()),
			("CONTENT_TYPE".to_string(), "application/json".to_string()),
			("SERVER_NAME".to_string(), "testserver".to_string()),
			("SERVER_PORT".to_string(), "80".to_string()),
			("REMOTE_ADDR".to_string(), "192.0.2.1".to_string()),
			("HTTP_USER_AGENT".to_string(), "curl/8".to_string()),
			("HTTP_COOKIE".to_string(), "sessionid=abc".to_string()),
			("HTTP_AUTHORIZATION".to_string(), "Bearer t".to_string()),
		]);
		StaticExtractor {
			env,
			cookies: BTreeMap::from([("sessionid".to_string(), "abc".to_string())]),
			body: br#"{"a":1}"#.to_vec(),
			form: Ok(FormData::new()),
			files: FileMap::new(),
		}
	}

	fn with_form_and_file(mut extractor: StaticExtractor) -> StaticExtractor {
		extractor.form = Ok(FormData::from([("x".to_string(), vec!["1".to_string()])]));
		extractor.files = FileMap::from([(
			"f.txt".to_string(),
			UploadedFile {
				field: "f.txt".to_string(),
				filename: "f.txt".to_string(),
				content_type: Some("text/plain".to_string()),
				size: 10,
			},
		)]);
		extractor
	}

	#[rstest]
	fn accessors_are_independent_of_order(extractor: StaticExtractor) {
		// Arrange
		let extractor = with_form_and_file(extractor);

		// Act
		let size = extractor.size_of_file(&extractor.files().unwrap()["f.txt"]);
		let form = extractor.form().unwrap().clone();
		let raw = extractor.raw_data().to_vec();

		// Assert
		assert_eq!(raw, br#"{"a":1}"#);
		assert_eq!(form["x"], vec!["1"]);
		assert_eq!(size, 10);
	}

	#[rstest]
	fn form_and_files_take_precedence_over_raw_body(extractor: StaticExtractor) {
		// Arrange
		let extractor = with_form_and_file(extractor);
		let mut event = Event::new();

		// Act
		extractor
			.extract_into_event(&mut event, &ClientOptions::default())
			.unwrap();

		// Assert
		let data = event.request.unwrap().data.unwrap();
		let RequestData::Form(fields) = data else {
			panic!("expected form data, got {:?}", data);
		};
		assert_eq!(fields["x"], FormValue::Text("1".to_string()));
		assert_eq!(
			fields["f.txt"],
			FormValue::File {
				filename: Some("f.txt".to_string()),
				size: 10
			}
		);
	}

	#[rstest]
	fn json_body_is_parsed(extractor: StaticExtractor) {
		let mut event = Event::new();

		extractor
			.extract_into_event(&mut event, &ClientOptions::default())
			.unwrap();

		let request = event.request.unwrap();
		assert_eq!(request.url.as_deref(), Some("http://testserver/submit"));
		assert_eq!(request.method.as_deref(), Some("POST"));
		assert_eq!(request.query_string, None);
		assert_eq!(request.data, Some(RequestData::Json(json!({"a": 1}))));
	}

	#[rstest]
	fn invalid_json_is_omitted(mut extractor: StaticExtractor) {
		extractor.body = b"{not json".to_vec();
		let mut event = Event::new();

		extractor
			.extract_into_event(&mut event, &ClientOptions::default())
			.unwrap();

		assert_eq!(
			event.request.unwrap().data,
			Some(RequestData::Omitted { len: 9 })
		);
	}

	#[rstest]
	fn sensitive_data_requires_pii(extractor: StaticExtractor) {
		// Arrange
		let mut without = Event::new();
		let mut with = Event::new();
		let pii = ClientOptions {
			send_default_pii: true,
			..Default::default()
		};

		// Act
		extractor
			.extract_into_event(&mut without, &ClientOptions::default())
			.unwrap();
		extractor.extract_into_event(&mut with, &pii).unwrap();

		// Assert
		let without = without.request.unwrap();
		assert!(without.cookies.is_empty());
		assert!(!without.headers.contains_key("Cookie"));
		assert!(!without.headers.contains_key("Authorization"));
		assert!(!without.env.contains_key("REMOTE_ADDR"));
		assert_eq!(without.headers["User-Agent"], "curl/8");
		assert_eq!(without.headers["Content-Type"], "application/json");

		let with = with.request.unwrap();
		assert_eq!(with.cookies["sessionid"], "abc");
		assert_eq!(with.headers["Cookie"], "sessionid=abc");
		assert_eq!(with.headers["Authorization"], "Bearer t");
		assert_eq!(with.env["REMOTE_ADDR"], "192.0.2.1");
	}

	#[rstest]
	#[case(RequestBodies::Never, 10, true)]
	#[case(RequestBodies::Small, 1_000, false)]
	#[case(RequestBodies::Small, 1_001, true)]
	#[case(RequestBodies::Medium, 10_000, false)]
	#[case(RequestBodies::Medium, 10_001, true)]
	#[case(RequestBodies::Always, 1_000_000, false)]
	fn body_policy_gates_attachment(
		mut extractor: StaticExtractor,
		#[case] policy: RequestBodies,
		#[case] len: usize,
		#[case] omitted: bool,
	) {
		// Arrange
		extractor.body.resize(len, b' ');
		let options = ClientOptions {
			request_bodies: policy,
			..Default::default()
		};
		let mut event = Event::new();

		// Act
		extractor.extract_into_event(&mut event, &options).unwrap();

		// Assert
		let data = event.request.unwrap().data;
		assert_eq!(
			data == Some(RequestData::Omitted { len }),
			omitted
		);
	}

	#[rstest]
	fn understated_content_length_does_not_bypass_policy(mut extractor: StaticExtractor) {
		// Arrange
		extractor.body.resize(5_000, b' ');
		extractor
			.env
			.insert("CONTENT_LENGTH".to_string(), "10".to_string());
		let options = ClientOptions {
			request_bodies: RequestBodies::Small,
			..Default::default()
		};
		let mut event = Event::new();

		// Act
		extractor.extract_into_event(&mut event, &options).unwrap();

		// Assert
		assert_eq!(
			event.request.unwrap().data,
			Some(RequestData::Omitted { len: 5_000 })
		);
	}

	#[rstest]
	fn existing_request_is_left_alone(extractor: StaticExtractor) {
		let mut event = Event::new();
		event.request = Some(RequestInfo {
			url: Some("http://already/set".to_string()),
			..Default::default()
		});

		extractor
			.extract_into_event(&mut event, &ClientOptions::default())
			.unwrap();

		let request = event.request.unwrap();
		assert_eq!(request.url.as_deref(), Some("http://already/set"));
		assert_eq!(request.data, None);
	}

	#[rstest]
	fn failure_keeps_fields_already_extracted(mut extractor: StaticExtractor) {
		// Arrange
		extractor.form = Err(ExtractError::MalformedForm("bad escape".to_string()));
		let mut event = Event::new();

		// Act
		let result = extractor.extract_into_event(&mut event, &ClientOptions::default());

		// Assert
		assert_eq!(
			result,
			Err(ExtractError::MalformedForm("bad escape".to_string()))
		);
		let request = event.request.unwrap();
		assert_eq!(request.url.as_deref(), Some("http://testserver/submit"));
		assert_eq!(request.method.as_deref(), Some("POST"));
		assert_eq!(request.data, None);
	}

	#[rstest]
	fn buffered_multipart_request_records_form_and_file() {
		// Arrange
		let request = BufferedRequest::from(
			http::Request::post("/upload?draft=1")
				.header("host", "example.com")
				.header(
					"content-type",
					format!("multipart/form-data; boundary={}", BOUNDARY),
				)
				.body(Bytes::from(multipart_body()))
				.unwrap(),
		);
		let raw_before = request.raw_data().to_vec();
		let mut event = Event::new();

		// Act
		request
			.extract_into_event(&mut event, &ClientOptions::default())
			.unwrap();

		// Assert
		assert_eq!(request.raw_data(), raw_before.as_slice());
		let info = event.request.unwrap();
		assert_eq!(info.url.as_deref(), Some("http://example.com/upload"));
		assert_eq!(info.query_string.as_deref(), Some("draft=1"));
		assert_eq!(info.env["SERVER_NAME"], "example.com");
		let Some(RequestData::Form(fields)) = info.data else {
			panic!("expected form data");
		};
		assert_eq!(fields["x"], FormValue::Text("1".to_string()));
		assert!(matches!(fields["f.txt"], FormValue::File { size: 10, .. }));
	}

	#[rstest]
	#[case("USER_AGENT", "User-Agent")]
	#[case("X_FORWARDED_FOR", "X-Forwarded-For")]
	#[case("CONTENT_TYPE", "Content-Type")]
	#[case("DNT", "Dnt")]
	fn header_names_are_title_cased(#[case] env_name: &str, #[case] header: &str) {
		assert_eq!(header_case(env_name), header);
	}
}
