//! Parsed form bodies

use crate::error::ExtractResult;
use bytes::Bytes;
use futures::executor::block_on;
use futures::future::ready;
use futures::stream::once;
use std::collections::BTreeMap;

/// Non-file form fields, each with every submitted value
pub type FormData = BTreeMap<String, Vec<String>>;

/// Uploaded files keyed by field name
pub type FileMap = BTreeMap<String, UploadedFile>;

/// Metadata of one uploaded file
///
/// The content is dropped while parsing; only its length is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
	pub field: String,
	pub filename: String,
	pub content_type: Option<String>,
	pub size: u64,
}

impl UploadedFile {
	pub fn size(&self) -> u64 {
		self.size
	}
}

/// Parses an `application/x-www-form-urlencoded` body
///
/// # Examples
///
/// ```
/// use reinhardt_sentry_http::form::parse_urlencoded;
///
/// let form = parse_urlencoded(b"tag=a&tag=b&q=rust").unwrap();
/// assert_eq!(form["tag"], vec!["a", "b"]);
/// assert_eq!(form["q"], vec!["rust"]);
/// ```
pub fn parse_urlencoded(body: &[u8]) -> ExtractResult<FormData> {
	let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body)?;
	let mut form = FormData::new();
	for (key, value) in pairs {
		form.entry(key).or_default().push(value);
	}
	Ok(form)
}

/// Parses a `multipart/form-data` body held in memory
///
/// Parts carrying a filename become files, every other part a text field.
pub fn parse_multipart(content_type: &str, body: Bytes) -> ExtractResult<(FormData, FileMap)> {
	let boundary = multer::parse_boundary(content_type)
		.map_err(|e| crate::ExtractError::MissingBoundary(e.to_string()))?;

	// multer reads from a stream; the body is already buffered
	let stream = once(ready(Ok::<_, std::io::Error>(body)));
	let mut multipart = multer::Multipart::new(stream, boundary);

	block_on(async move {
		let mut form = FormData::new();
		let mut files = FileMap::new();

		while let Some(field) = multipart.next_field().await? {
			let name = field.name().unwrap_or_default().to_string();
			match field.file_name().map(str::to_string) {
				Some(filename) => {
					let content_type = field.content_type().map(ToString::to_string);
					let data = field.bytes().await?;
					files.insert(
						name.clone(),
						UploadedFile {
							field: name,
							filename,
							content_type,
							size: data.len() as u64,
						},
					);
				}
				None => {
					let text = field.text().await?;
					form.entry(name).or_default().push(text);
				}
			}
		}

		Ok((form, files))
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ExtractError;
	use crate::fixtures::{BOUNDARY, multipart_body};
	use rstest::rstest;

	#[rstest]
	fn multipart_splits_fields_and_files() {
		// Arrange
		let content_type = format!("multipart/form-data; boundary={}", BOUNDARY);

		// Act
		let (form, files) = parse_multipart(&content_type, Bytes::from(multipart_body())).unwrap();

		// Assert
		assert_eq!(form["x"], vec!["1"]);
		assert!(!form.contains_key("f.txt"));
		let file = &files["f.txt"];
		assert_eq!(file.filename, "f.txt");
		assert_eq!(file.size(), 10);
		assert_eq!(file.content_type.as_deref(), Some("text/plain"));
	}

	#[rstest]
	fn multipart_without_boundary_is_rejected() {
		let result = parse_multipart("multipart/form-data", Bytes::new());

		assert!(matches!(result, Err(ExtractError::MissingBoundary(_))));
	}

	#[rstest]
	fn truncated_multipart_is_rejected() {
		// Arrange
		let content_type = format!("multipart/form-data; boundary={}", BOUNDARY);
		let body = format!(
			"--{}\r\nContent-Disposition: form-data; name=\"x\"\r\n\r\n1",
			BOUNDARY
		);

		// Act
		let result = parse_multipart(&content_type, Bytes::from(body));

		// Assert
		assert!(matches!(result, Err(ExtractError::MalformedMultipart(_))));
	}

	#[rstest]
	#[case(b"".as_slice(), 0)]
	#[case(b"a=1".as_slice(), 1)]
	#[case(b"a=1&b=2&a=3".as_slice(), 2)]
	fn urlencoded_groups_repeated_keys(#[case] body: &[u8], #[case] keys: usize) {
		let form = parse_urlencoded(body).unwrap();

		assert_eq!(form.len(), keys);
	}
}
