//! Strongly typed identifiers for logical resources and identity providers.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

macro_rules! def_id {
	($name:ident, $doc:literal, $kind:literal, $validate:ident) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Creates a new identifier after validation.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let view = value.as_ref();

				$validate($kind, view)?;

				Ok(Self(view.to_owned()))
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				$validate($kind, &value)?;

				Ok(Self(value))
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
	};
}

const IDENTIFIER_MAX_LEN: usize = 128;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (resource, provider).
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier (resource, provider).
		kind: &'static str,
	},
	/// The identifier contains a character outside the permitted alphabet.
	#[error("{kind} identifier contains the unsupported character {character:?}.")]
	UnsupportedCharacter {
		/// Kind of identifier (resource, provider).
		kind: &'static str,
		/// First offending character.
		character: char,
	},
	/// The raw path segment did not percent-decode to UTF-8.
	#[error("{kind} identifier is not valid percent-encoded UTF-8.")]
	Undecodable {
		/// Kind of identifier (resource, provider).
		kind: &'static str,
	},
	/// The identifier exceeded the allowed character count.
	#[error("{kind} identifier exceeds {max} characters.")]
	TooLong {
		/// Kind of identifier (resource, provider).
		kind: &'static str,
		/// Maximum permitted character count.
		max: usize,
	},
}

def_id! { ResourceId, "Logical identifier of a document managed by the gateway.", "Resource", validate_resource }
def_id! { ProviderId, "Identifier for an identity-provider descriptor.", "Provider", validate_view }

fn validate_view(kind: &'static str, view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}

fn validate_resource(kind: &'static str, view: &str) -> Result<(), IdentifierError> {
	validate_view(kind, view)?;

	if let Some(character) =
		view.chars().find(|ch| !(ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.')))
	{
		return Err(IdentifierError::UnsupportedCharacter { kind, character });
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn resource_ids_accept_guid_shapes() {
		let id = ResourceId::new("5f0c9d2a-8d8e-4c7b-9a55-0f3b2f1e6a10")
			.expect("GUID-shaped resource identifiers should be accepted.");

		assert_eq!(id.as_ref(), "5f0c9d2a-8d8e-4c7b-9a55-0f3b2f1e6a10");
	}

	#[test]
	fn resource_ids_reject_whitespace_and_path_characters() {
		assert_eq!(
			ResourceId::new(""),
			Err(IdentifierError::Empty { kind: "Resource" }),
		);
		assert_eq!(
			ResourceId::new("doc 1"),
			Err(IdentifierError::ContainsWhitespace { kind: "Resource" }),
		);
		assert_eq!(
			ResourceId::new("doc/../1"),
			Err(IdentifierError::UnsupportedCharacter { kind: "Resource", character: '/' }),
		);
	}

	#[test]
	fn provider_ids_only_reject_whitespace_and_length() {
		ProviderId::new("entra:contoso").expect("Provider identifiers may contain punctuation.");

		assert!(ProviderId::new("a".repeat(IDENTIFIER_MAX_LEN + 1)).is_err());
	}

	#[test]
	fn serde_round_trip_enforces_validation() {
		let id: ResourceId =
			serde_json::from_str("\"doc-42\"").expect("Resource id should deserialize.");

		assert_eq!(id.as_ref(), "doc-42");
		assert!(serde_json::from_str::<ResourceId>("\"doc 42\"").is_err());
	}

	#[test]
	fn borrow_supports_fast_lookup() {
		let map: HashMap<ResourceId, u8> = HashMap::from_iter([(
			ResourceId::new("doc-123").expect("Resource used for lookup should be valid."),
			7_u8,
		)]);

		assert_eq!(map.get("doc-123"), Some(&7));
	}
}
