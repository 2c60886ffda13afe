//! Storage locators and the resolver contract that maps logical resources onto them.
//!
//! A [`ResourceLocator`] names a file inside the downstream storage API by drive and item
//! identifiers. [`ResourceLocator::validate`] checks it before any downstream call and stops
//! at the first failure, drive before item, so callers always see one deterministic reason.
//! Missing identifiers mean the logical resource was never fully provisioned (a state
//! conflict); malformed identifiers mean the value itself is wrong.

// self
use crate::{_prelude::*, id::ResourceId};

/// Prefix every drive identifier issued by the storage API carries.
pub const DRIVE_ID_PREFIX: &str = "b!";
/// Minimum length (in characters) of an item identifier.
pub const ITEM_ID_MIN_LEN: usize = 20;

/// First rule a [`ResourceLocator`] violated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum LocatorError {
	/// Drive identifier is empty or whitespace.
	#[error("Resource has no drive mapping.")]
	MissingDrive,
	/// Drive identifier lacks the `b!` prefix.
	#[error("Drive identifier must start with `b!`.")]
	InvalidDrive,
	/// Item identifier is empty or whitespace.
	#[error("Resource has no item mapping.")]
	MissingItem,
	/// Item identifier is too short.
	#[error("Item identifier must be at least 20 characters, got {length}.")]
	InvalidItem {
		/// Observed character count.
		length: usize,
	},
}
impl LocatorError {
	/// Returns true for missing mappings (state conflicts) as opposed to malformed values.
	pub fn is_missing(&self) -> bool {
		matches!(self, Self::MissingDrive | Self::MissingItem)
	}
}

/// Drive + item pair addressing one file in the downstream API.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLocator {
	/// Drive (container) identifier.
	pub drive_id: String,
	/// Item identifier within the drive.
	pub item_id: String,
}
impl ResourceLocator {
	/// Creates an unvalidated locator.
	pub fn new(drive_id: impl Into<String>, item_id: impl Into<String>) -> Self {
		Self { drive_id: drive_id.into(), item_id: item_id.into() }
	}

	/// Checks the locator, reporting the first violated rule.
	pub fn validate(&self) -> Result<(), LocatorError> {
		if self.drive_id.trim().is_empty() {
			return Err(LocatorError::MissingDrive);
		}
		if !self.drive_id.starts_with(DRIVE_ID_PREFIX) {
			return Err(LocatorError::InvalidDrive);
		}
		if self.item_id.trim().is_empty() {
			return Err(LocatorError::MissingItem);
		}

		let length = self.item_id.chars().count();

		if length < ITEM_ID_MIN_LEN {
			return Err(LocatorError::InvalidItem { length });
		}

		Ok(())
	}
}

/// Boxed future returned by [`LocatorResolver`] implementations.
pub type ResolveFuture<'a> =
	Pin<Box<dyn Future<Output = Result<Option<ResourceLocator>>> + 'a + Send>>;

/// Resource-lookup collaborator mapping logical documents to storage locators.
///
/// Implementations return `Ok(None)` when the logical resource is unknown; locators are
/// handed back as stored and validated by the caller.
pub trait LocatorResolver
where
	Self: Send + Sync,
{
	/// Looks up the locator for `id`.
	fn resolve<'a>(&'a self, id: &'a ResourceId) -> ResolveFuture<'a>;
}

/// Thread-safe in-process resolver for tests and single-node deployments.
#[derive(Clone, Debug, Default)]
pub struct MemoryLocatorResolver(Arc<RwLock<HashMap<ResourceId, ResourceLocator>>>);
impl MemoryLocatorResolver {
	/// Registers or replaces the locator for `id`.
	pub fn insert(&self, id: ResourceId, locator: ResourceLocator) -> Option<ResourceLocator> {
		self.0.write().insert(id, locator)
	}

	/// Removes the mapping for `id`.
	pub fn remove(&self, id: &ResourceId) -> Option<ResourceLocator> {
		self.0.write().remove(id)
	}
}
impl LocatorResolver for MemoryLocatorResolver {
	fn resolve<'a>(&'a self, id: &'a ResourceId) -> ResolveFuture<'a> {
		let found = self.0.read().get(id).cloned();

		Box::pin(async move { Ok(found) })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	const ITEM: &str = "01ABCDEFGHIJKLMNOPQR";

	#[test]
	fn valid_locator_passes() {
		ResourceLocator::new("b!drive-42", ITEM).validate().expect("Locator should be valid.");
	}

	#[test]
	fn missing_drive_is_a_conflict() {
		let err = ResourceLocator::new("", ITEM).validate().expect_err("Empty drive must fail.");

		assert_eq!(err, LocatorError::MissingDrive);
		assert!(err.is_missing());
		assert_eq!(
			ResourceLocator::new("  \t", ITEM).validate(),
			Err(LocatorError::MissingDrive),
		);
	}

	#[test]
	fn drive_without_prefix_is_malformed() {
		let err = ResourceLocator::new("x!abc", ITEM).validate().expect_err("Prefix is required.");

		assert_eq!(err, LocatorError::InvalidDrive);
		assert!(!err.is_missing());
	}

	#[test]
	fn item_rules_follow_drive_rules() {
		assert_eq!(ResourceLocator::new("b!d", " ").validate(), Err(LocatorError::MissingItem));
		assert_eq!(
			ResourceLocator::new("b!d", "01SHORT").validate(),
			Err(LocatorError::InvalidItem { length: 7 }),
		);
		assert_eq!(
			ResourceLocator::new("b!d", &ITEM[..19]).validate(),
			Err(LocatorError::InvalidItem { length: 19 }),
		);
	}

	#[test]
	fn drive_failure_takes_precedence_over_item_failure() {
		assert_eq!(ResourceLocator::new("", "").validate(), Err(LocatorError::MissingDrive));
		assert_eq!(ResourceLocator::new("nope", "short").validate(), Err(LocatorError::InvalidDrive));
	}

	#[test]
	fn validation_is_idempotent() {
		let locators = [
			ResourceLocator::new("", ITEM),
			ResourceLocator::new("x!abc", ITEM),
			ResourceLocator::new("b!abc", ""),
			ResourceLocator::new("b!abc", "short"),
			ResourceLocator::new("b!abc", ITEM),
		];

		for locator in locators {
			let snapshot = locator.clone();

			assert_eq!(locator.validate(), locator.validate());
			assert_eq!(locator, snapshot, "Validation must not mutate the locator.");
		}
	}

	#[test]
	fn locator_serializes_with_camel_case_fields() {
		let json = serde_json::to_value(ResourceLocator::new("b!d", ITEM))
			.expect("Locator should serialize.");

		assert_eq!(json["driveId"], "b!d");
		assert_eq!(json["itemId"], ITEM);
	}

	#[tokio::test]
	async fn memory_resolver_returns_registered_locators() {
		let resolver = MemoryLocatorResolver::default();
		let id = ResourceId::new("doc-1").expect("Resource id should be valid.");
		let locator = ResourceLocator::new("b!d", ITEM);

		assert_eq!(resolver.resolve(&id).await.expect("Lookup should succeed."), None);

		resolver.insert(id.clone(), locator.clone());

		assert_eq!(resolver.resolve(&id).await.expect("Lookup should succeed."), Some(locator));
	}
}
