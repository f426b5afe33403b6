//! # Reinhardt Sentry HTTP
//!
//! Turns an incoming request into the `request` section of an error event.
//!
//! [`BufferedRequest`] holds the body read once, with form fields and
//! uploaded files parsed lazily from that buffer. [`RequestExtractor`] is
//! the seam between a request type and the event: implement its accessors
//! and [`RequestExtractor::extract_into_event`] does the rest, honouring
//! `send_default_pii` and the `request_bodies` policy of the client.

pub mod error;
pub mod extractor;
pub mod form;
pub mod request;

pub use error::{ExtractError, ExtractResult};
pub use extractor::{RequestExtractor, SENSITIVE_HEADERS};
pub use form::{FileMap, FormData, UploadedFile};
pub use request::BufferedRequest;
