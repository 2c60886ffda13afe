// self
use crate::_prelude::*;

/// Grant types the gateway requests from the identity provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
	/// RFC 7523 JWT bearer assertion, used for on-behalf-of exchanges.
	JwtBearer,
	/// Client Credentials grant for application-only tokens.
	ClientCredentials,
}
impl GrantType {
	/// Returns the `grant_type` form value.
	pub fn as_str(self) -> &'static str {
		match self {
			GrantType::JwtBearer => "urn:ietf:params:oauth:grant-type:jwt-bearer",
			GrantType::ClientCredentials => "client_credentials",
		}
	}

	/// Short label for logs, metrics, and error messages.
	pub fn label(self) -> &'static str {
		match self {
			GrantType::JwtBearer => "jwt_bearer",
			GrantType::ClientCredentials => "client_credentials",
		}
	}
}
impl Display for GrantType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.label())
	}
}

/// Grant flags wired into the descriptor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedGrants {
	/// Indicates whether on-behalf-of (JWT bearer) exchanges are enabled.
	pub jwt_bearer: bool,
	/// Indicates whether the Client Credentials grant is enabled.
	pub client_credentials: bool,
}
impl SupportedGrants {
	/// Returns true if the provided grant is supported.
	pub fn supports(self, grant: GrantType) -> bool {
		match grant {
			GrantType::JwtBearer => self.jwt_bearer,
			GrantType::ClientCredentials => self.client_credentials,
		}
	}

	/// Marks a grant as supported.
	pub fn enable(mut self, grant: GrantType) -> Self {
		match grant {
			GrantType::JwtBearer => self.jwt_bearer = true,
			GrantType::ClientCredentials => self.client_credentials = true,
		}

		self
	}

	/// Returns true when no grants are enabled.
	pub fn is_empty(self) -> bool {
		!self.jwt_bearer && !self.client_credentials
	}
}
