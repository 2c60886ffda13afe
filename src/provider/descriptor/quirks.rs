// self
use crate::_prelude::*;

/// Provider-specific quirks that influence how token requests are built.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderQuirks {
	/// Character used to join scopes when constructing `scope` parameters.
	pub scope_delimiter: char,
	/// Sends `requested_token_use=on_behalf_of` with JWT bearer exchanges.
	pub on_behalf_of_marker: bool,
}
impl Default for ProviderQuirks {
	fn default() -> Self {
		Self { scope_delimiter: ' ', on_behalf_of_marker: true }
	}
}
