//! Problem-detail mapping: one envelope for every failure.
//!
//! [`map`] is total over [`Error`]: each variant lands on exactly one [`ProblemCode`]. Only
//! codes the caller can act on carry a specific detail; `server_error` always carries the
//! same generic text so nothing internal leaks. [`ProblemResponse`] renders the envelope as
//! `application/problem+json` with the correlation id echoed in a header.

// crates.io
use axum::{
	Json,
	http::{HeaderValue, StatusCode, header::CONTENT_TYPE},
	response::{IntoResponse, Response},
};
// self
use crate::{
	_prelude::*,
	correlation::{CORRELATION_ID_HEADER, CorrelationId},
	exchange::ExchangeError,
	locator::LocatorError,
};

/// Media type of problem responses.
pub const PROBLEM_CONTENT_TYPE: &str = "application/problem+json";

const SERVER_ERROR_DETAIL: &str =
	"An unexpected error occurred. Quote the correlation id when reporting this issue.";

/// Closed set of problem codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemCode {
	/// Caller credential missing or malformed.
	Unauthorized,
	/// Logical resource identifier malformed.
	InvalidId,
	/// Logical resource has no storage mapping.
	NotFound,
	/// Resource is mapped but has no drive.
	MappingMissingDrive,
	/// Drive identifier malformed.
	InvalidDriveId,
	/// Resource is mapped but has no item.
	MappingMissingItem,
	/// Item identifier malformed.
	InvalidItemId,
	/// On-behalf-of exchange failed.
	OboFailed,
	/// Downstream API refused the call.
	DownstreamError,
	/// Anything unanticipated.
	ServerError,
}
impl ProblemCode {
	/// Wire label.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Unauthorized => "unauthorized",
			Self::InvalidId => "invalid_id",
			Self::NotFound => "not_found",
			Self::MappingMissingDrive => "mapping_missing_drive",
			Self::InvalidDriveId => "invalid_drive_id",
			Self::MappingMissingItem => "mapping_missing_item",
			Self::InvalidItemId => "invalid_item_id",
			Self::OboFailed => "obo_failed",
			Self::DownstreamError => "downstream_error",
			Self::ServerError => "server_error",
		}
	}

	/// Short human-readable summary.
	pub const fn title(self) -> &'static str {
		match self {
			Self::Unauthorized => "Unauthorized",
			Self::InvalidId => "Invalid resource identifier",
			Self::NotFound => "Resource not found",
			Self::MappingMissingDrive => "Drive mapping missing",
			Self::InvalidDriveId => "Invalid drive identifier",
			Self::MappingMissingItem => "Item mapping missing",
			Self::InvalidItemId => "Invalid item identifier",
			Self::OboFailed => "Delegated access failed",
			Self::DownstreamError => "Downstream request failed",
			Self::ServerError => "Internal server error",
		}
	}
}
impl Display for ProblemCode {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Log level a problem is reported at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
	/// Unanticipated failure.
	Error,
	/// Rejected request.
	Warn,
	/// Expected downstream refusal, such as a permission check.
	Info,
}

/// Structured failure built once per failed request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProblemDetail {
	/// Problem code.
	pub code: ProblemCode,
	/// Summary for the code.
	pub title: &'static str,
	/// Request-specific explanation.
	pub detail: String,
	/// HTTP status.
	pub status: u16,
	/// Correlation id of the failed request.
	pub correlation_id: CorrelationId,
}
impl ProblemDetail {
	fn new(
		code: ProblemCode,
		status: u16,
		detail: impl Into<String>,
		correlation_id: &CorrelationId,
	) -> Self {
		Self {
			code,
			title: code.title(),
			detail: detail.into(),
			status,
			correlation_id: correlation_id.clone(),
		}
	}

	/// Level the problem is logged at.
	pub fn severity(&self) -> Severity {
		match self.code {
			ProblemCode::ServerError => Severity::Error,
			ProblemCode::DownstreamError if self.status < 500 => Severity::Info,
			ProblemCode::DownstreamError => Severity::Error,
			_ => Severity::Warn,
		}
	}

	/// Serializable RFC 7807 body; `domain` forms the `type` URI.
	pub fn body(&self, domain: &str) -> ProblemBody {
		ProblemBody {
			r#type: format!("https://{domain}/errors/{}", self.code.as_str()),
			title: self.title.to_owned(),
			detail: self.detail.clone(),
			status: self.status,
			extensions: ProblemExtensions {
				code: self.code,
				correlation_id: self.correlation_id.clone(),
			},
		}
	}
}

/// RFC 7807 problem body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemBody {
	/// URI identifying the problem type.
	#[serde(rename = "type")]
	pub r#type: String,
	/// Summary for the code.
	pub title: String,
	/// Request-specific explanation.
	pub detail: String,
	/// HTTP status.
	pub status: u16,
	/// Gateway-specific members.
	pub extensions: ProblemExtensions,
}

/// Extension members of [`ProblemBody`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemExtensions {
	/// Problem code.
	pub code: ProblemCode,
	/// Correlation id of the failed request.
	pub correlation_id: CorrelationId,
}

/// [`IntoResponse`] wrapper rendering a [`ProblemDetail`].
#[derive(Clone, Debug)]
pub struct ProblemResponse {
	/// Problem to render.
	pub problem: ProblemDetail,
	/// Domain used in the `type` URI.
	pub domain: Arc<str>,
}
impl IntoResponse for ProblemResponse {
	fn into_response(self) -> Response {
		let status =
			StatusCode::from_u16(self.problem.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		let mut response = (status, Json(self.problem.body(&self.domain))).into_response();
		let headers = response.headers_mut();

		headers.insert(CONTENT_TYPE, HeaderValue::from_static(PROBLEM_CONTENT_TYPE));
		headers.insert(CORRELATION_ID_HEADER, self.problem.correlation_id.header_value());

		response
	}
}

/// Maps any gateway error onto its problem detail.
pub fn map(error: &Error, correlation_id: &CorrelationId) -> ProblemDetail {
	let problem =
		|code, status, detail: String| ProblemDetail::new(code, status, detail, correlation_id);
	let server_error =
		|| ProblemDetail::new(ProblemCode::ServerError, 500, SERVER_ERROR_DETAIL, correlation_id);

	match error {
		Error::Unauthorized(err) => problem(ProblemCode::Unauthorized, 401, err.to_string()),
		Error::InvalidId(err) => problem(ProblemCode::InvalidId, 400, err.to_string()),
		Error::NotFound { .. } => problem(ProblemCode::NotFound, 404, error.to_string()),
		Error::Locator(err) => {
			let (code, status) = match err {
				LocatorError::MissingDrive => (ProblemCode::MappingMissingDrive, 409),
				LocatorError::InvalidDrive => (ProblemCode::InvalidDriveId, 400),
				LocatorError::MissingItem => (ProblemCode::MappingMissingItem, 409),
				LocatorError::InvalidItem { .. } => (ProblemCode::InvalidItemId, 400),
			};

			problem(code, status, err.to_string())
		},
		Error::Exchange(err) => match err {
			ExchangeError::Local { .. } => server_error(),
			ExchangeError::Rejected { message, .. } | ExchangeError::Unavailable { message, .. } =>
				problem(
					ProblemCode::OboFailed,
					401,
					format!("The caller's credential could not be exchanged: {message}"),
				),
		},
		Error::Downstream { status, message } => {
			let status = if (400..500).contains(status) { *status } else { 500 };

			problem(ProblemCode::DownstreamError, status, message.clone())
		},
		Error::Application(_)
		| Error::Config(_)
		| Error::Transient(_)
		| Error::Transport(_)
		| Error::DeadlineExceeded { .. } => server_error(),
	}
}
