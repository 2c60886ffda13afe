//! Exchanged-credential cache with TTL and per-key single-flight.
//!
//! [`ExchangeCache::get_or_exchange`] serves fresh entries without I/O. On a miss it starts
//! at most one exchange per key; concurrent callers for the same key join that exchange and
//! observe its outcome, while callers for other keys proceed independently. Successful
//! outcomes are stored for [`CachePolicy::ttl_for`]; failures leave nothing behind.
//!
//! Exchanges are shared futures driven by their waiters. A waiter that stops waiting abandons
//! only its own wait. Once the last waiter is gone the exchange itself is dropped, cancelling
//! its I/O, and the next caller starts a fresh one.

mod metrics;

pub use metrics::CacheMetrics;

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use futures::{
	FutureExt,
	future::{BoxFuture, Shared, WeakShared},
};
// self
use crate::{
	_prelude::*,
	auth::{CacheKey, ExchangedCredential},
	exchange::ExchangeError,
	obs::{self, CacheEvent},
};

type ExchangeOutcome = Result<ExchangedCredential, ExchangeError>;
type SharedExchange = Shared<BoxFuture<'static, ExchangeOutcome>>;

/// Time source used for freshness decisions.
pub trait Clock
where
	Self: Send + Sync,
{
	/// Current wall-clock time.
	fn now(&self) -> OffsetDateTime;
}

/// [`Clock`] backed by the system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}
}

/// Manually advanced [`Clock`] for deterministic expiry tests.
#[derive(Debug)]
pub struct ManualClock(Mutex<OffsetDateTime>);
impl ManualClock {
	/// Creates a clock frozen at `start`.
	pub fn new(start: OffsetDateTime) -> Self {
		Self(Mutex::new(start))
	}

	/// Moves the clock forward by `by`.
	pub fn advance(&self, by: Duration) {
		*self.0.lock() += by;
	}
}
impl Clock for ManualClock {
	fn now(&self) -> OffsetDateTime {
		*self.0.lock()
	}
}

/// Lifetime rules for cached credentials.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
	/// Entries stop being served this long before the credential expires.
	pub safety_margin: Duration,
	/// Upper bound for any entry's lifetime.
	pub max_ttl: Duration,
}
impl CachePolicy {
	/// Default safety margin.
	pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::minutes(5);
	/// Default lifetime cap.
	pub const DEFAULT_MAX_TTL: Duration = Duration::minutes(55);

	/// TTL for a credential stored at `now`: `min(expires_at - safety_margin - now, max_ttl)`.
	///
	/// Returns `None` when the credential is already inside its safety margin, or when the margin
	/// reaches outside the representable time range; such credentials are handed to the caller
	/// but never stored.
	pub fn ttl_for(&self, credential: &ExchangedCredential, now: OffsetDateTime) -> Option<Duration> {
		let usable_until = credential.expires_at.checked_sub(self.safety_margin)?;
		let ttl = (usable_until - now).min(self.max_ttl);

		ttl.is_positive().then_some(ttl)
	}
}
impl Default for CachePolicy {
	fn default() -> Self {
		Self { safety_margin: Self::DEFAULT_SAFETY_MARGIN, max_ttl: Self::DEFAULT_MAX_TTL }
	}
}

/// Stored credential plus its freshness window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry {
	/// Key the entry is stored under.
	pub key: CacheKey,
	/// Cached credential.
	pub value: ExchangedCredential,
	/// When the entry was stored.
	pub inserted_at: OffsetDateTime,
	/// How long the entry stays fresh.
	pub ttl: Duration,
}
impl CacheEntry {
	/// Returns true while `now` is inside the entry's TTL.
	pub fn is_fresh_at(&self, now: OffsetDateTime) -> bool {
		self.inserted_at.checked_add(self.ttl).is_some_and(|stale_at| now < stale_at)
	}
}

struct InFlight {
	generation: u64,
	exchange: WeakShared<BoxFuture<'static, ExchangeOutcome>>,
}

#[derive(Default)]
struct CacheState {
	entries: RwLock<HashMap<CacheKey, CacheEntry>>,
	// Lock order: `in_flight` before `entries`.
	in_flight: Mutex<HashMap<CacheKey, InFlight>>,
	next_generation: AtomicU64,
	metrics: CacheMetrics,
}

/// In-process exchanged-credential cache.
///
/// Clones share state. Each instance is one namespace; delegated and application
/// credentials live in separate instances.
#[derive(Clone)]
pub struct ExchangeCache {
	namespace: &'static str,
	policy: CachePolicy,
	clock: Arc<dyn Clock>,
	state: Arc<CacheState>,
}
impl ExchangeCache {
	/// Creates a cache for `namespace` backed by the system clock.
	pub fn new(namespace: &'static str, policy: CachePolicy) -> Self {
		Self::with_clock(namespace, policy, Arc::new(SystemClock))
	}

	/// Creates a cache with a custom clock.
	pub fn with_clock(namespace: &'static str, policy: CachePolicy, clock: Arc<dyn Clock>) -> Self {
		Self { namespace, policy, clock, state: Default::default() }
	}

	/// Namespace label used in metrics.
	pub fn namespace(&self) -> &'static str {
		self.namespace
	}

	/// Lifetime rules applied to new entries.
	pub fn policy(&self) -> CachePolicy {
		self.policy
	}

	/// Counters describing cache activity.
	pub fn metrics(&self) -> &CacheMetrics {
		&self.state.metrics
	}

	/// Number of stored entries, fresh or not. Stale entries are swept whenever a new
	/// exchange completes.
	pub fn len(&self) -> usize {
		self.state.entries.read().len()
	}

	/// Returns true when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Evicts the entry for `key`; returns true when one was present.
	///
	/// An exchange already in flight for `key` is left alone.
	pub fn invalidate(&self, key: &CacheKey) -> bool {
		let removed = self.state.entries.write().remove(key).is_some();

		if removed {
			self.record(CacheEvent::Invalidate);
		}

		removed
	}

	/// Returns the fresh credential for `key`, running `exchange` at most once across
	/// concurrent callers when there is none.
	///
	/// `exchange` is only invoked by the caller that starts a new exchange.
	pub async fn get_or_exchange<F, Fut>(&self, key: &CacheKey, exchange: F) -> ExchangeOutcome
	where
		F: Send + FnOnce() -> Fut,
		Fut: 'static + Send + Future<Output = ExchangeOutcome>,
	{
		if let Some(value) = self.fresh(key, self.clock.now()) {
			self.record(CacheEvent::Hit);

			return Ok(value);
		}

		let shared = {
			let mut in_flight = self.state.in_flight.lock();

			// Another exchange may have landed between the first check and taking the lock.
			if let Some(value) = self.fresh(key, self.clock.now()) {
				self.record(CacheEvent::Hit);

				return Ok(value);
			}

			match in_flight.get(key).and_then(|pending| pending.exchange.upgrade()) {
				Some(shared) => {
					self.record(CacheEvent::Join);

					shared
				},
				None => {
					self.record(CacheEvent::Miss);
					// Slots of abandoned exchanges.
					in_flight.retain(|_, pending| pending.exchange.upgrade().is_some());

					let generation = self.state.next_generation.fetch_add(1, Ordering::Relaxed);
					let shared = self.settle(key.clone(), generation, exchange()).shared();

					if let Some(weak) = shared.downgrade() {
						in_flight.insert(key.clone(), InFlight { generation, exchange: weak });
					}

					shared
				},
			}
		};

		shared.await
	}

	/// Wraps an exchange so its outcome is stored and its in-flight slot released on completion.
	fn settle<Fut>(
		&self,
		key: CacheKey,
		generation: u64,
		exchange: Fut,
	) -> BoxFuture<'static, ExchangeOutcome>
	where
		Fut: 'static + Send + Future<Output = ExchangeOutcome>,
	{
		let cache = self.clone();

		self.state.metrics.record_exchange();

		async move {
			let outcome = exchange.await;

			cache.complete(&key, generation, &outcome);

			outcome
		}
		.boxed()
	}

	fn complete(&self, key: &CacheKey, generation: u64, outcome: &ExchangeOutcome) {
		let mut in_flight = self.state.in_flight.lock();

		match outcome {
			Ok(value) => {
				let now = self.clock.now();

				let mut entries = self.state.entries.write();

				// Sweep stale entries on every store.
				entries.retain(|_, entry| entry.is_fresh_at(now));

				if let Some(ttl) = self.policy.ttl_for(value, now) {
					entries.insert(
						key.clone(),
						CacheEntry { key: key.clone(), value: value.clone(), inserted_at: now, ttl },
					);
				}
			},
			Err(_) => self.record(CacheEvent::Failure),
		}

		if in_flight.get(key).is_some_and(|pending| pending.generation == generation) {
			in_flight.remove(key);
		}
	}

	fn fresh(&self, key: &CacheKey, now: OffsetDateTime) -> Option<ExchangedCredential> {
		self.state
			.entries
			.read()
			.get(key)
			.filter(|entry| entry.is_fresh_at(now))
			.map(|entry| entry.value.clone())
	}

	fn record(&self, event: CacheEvent) {
		let metrics = &self.state.metrics;

		match event {
			CacheEvent::Hit => metrics.record_hit(),
			CacheEvent::Miss => metrics.record_miss(),
			CacheEvent::Join => metrics.record_join(),
			CacheEvent::Failure => metrics.record_failure(),
			CacheEvent::Invalidate => metrics.record_invalidation(),
		}

		obs::record_cache_event(self.namespace, event);
	}
}
impl Debug for ExchangeCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ExchangeCache")
			.field("namespace", &self.namespace)
			.field("policy", &self.policy)
			.field("entries", &self.len())
			.finish()
	}
}
