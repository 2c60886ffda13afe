// std
use std::sync::{
	Arc,
	atomic::{AtomicBool, AtomicUsize, Ordering},
};
// crates.io
use time::{Duration, OffsetDateTime, macros::datetime};
use tokio::time::sleep;
// self
use obo_gateway::{
	auth::{BearerCredential, CacheKey, ExchangedCredential},
	cache::{CachePolicy, ExchangeCache, ManualClock},
	exchange::ExchangeError,
};

const EXCHANGE_DELAY: std::time::Duration = std::time::Duration::from_millis(200);

fn key(token: &str) -> CacheKey {
	BearerCredential::parse(&format!("Bearer {token}"))
		.expect("Caller credential should parse.")
		.cache_key()
}

fn credential(expires_at: OffsetDateTime) -> ExchangedCredential {
	ExchangedCredential::new("downstream-token", expires_at)
}

/// Exchange that counts its invocations and takes [`EXCHANGE_DELAY`] to finish.
fn slow_exchange(
	calls: Arc<AtomicUsize>,
	finished: Arc<AtomicBool>,
) -> impl Future<Output = Result<ExchangedCredential, ExchangeError>> {
	calls.fetch_add(1, Ordering::SeqCst);

	async move {
		sleep(EXCHANGE_DELAY).await;
		finished.store(true, Ordering::SeqCst);

		Ok(credential(OffsetDateTime::now_utc() + Duration::hours(1)))
	}
}

#[tokio::test]
async fn concurrent_cold_lookups_share_one_exchange() {
	let cache = ExchangeCache::new("obo", CachePolicy::default());
	let calls = Arc::new(AtomicUsize::new(0));
	let finished = Arc::new(AtomicBool::new(false));
	let key = key("caller-a");
	let tasks = (0..10)
		.map(|_| {
			let cache = cache.clone();
			let key = key.clone();
			let calls = calls.clone();
			let finished = finished.clone();

			tokio::spawn(async move {
				cache.get_or_exchange(&key, move || slow_exchange(calls, finished)).await
			})
		})
		.collect::<Vec<_>>();

	for task in tasks {
		let exchanged = task
			.await
			.expect("Lookup task should not panic.")
			.expect("Every waiter should observe the shared success.");

		assert_eq!(exchanged.token.expose(), "downstream-token");
	}

	assert_eq!(calls.load(Ordering::SeqCst), 1);

	let metrics = cache.metrics();

	assert_eq!(metrics.exchanges(), 1);
	assert_eq!(metrics.misses(), 1);
	assert_eq!(metrics.joins() + metrics.hits(), 9);
	assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn distinct_keys_exchange_independently() {
	let cache = ExchangeCache::new("obo", CachePolicy::default());
	let calls = Arc::new(AtomicUsize::new(0));
	let finished = Arc::new(AtomicBool::new(false));
	let (a, b) = (key("caller-a"), key("caller-b"));
	let (first, second) = tokio::join!(
		cache.get_or_exchange(&a, {
			let (calls, finished) = (calls.clone(), finished.clone());

			move || slow_exchange(calls, finished)
		}),
		cache.get_or_exchange(&b, {
			let (calls, finished) = (calls.clone(), finished.clone());

			move || slow_exchange(calls, finished)
		}),
	);

	first.expect("First key should exchange.");
	second.expect("Second key should exchange.");

	assert_eq!(calls.load(Ordering::SeqCst), 2);
	assert_eq!(cache.metrics().joins(), 0);
}

#[tokio::test]
async fn shared_failures_reach_every_waiter_and_are_not_cached() {
	let cache = ExchangeCache::new("obo", CachePolicy::default());
	let calls = Arc::new(AtomicUsize::new(0));
	let key = key("caller-a");
	let failing = || {
		let calls = calls.clone();

		move || {
			calls.fetch_add(1, Ordering::SeqCst);

			async move {
				sleep(EXCHANGE_DELAY).await;

				Err(ExchangeError::unavailable("token endpoint offline", Some(503)))
			}
		}
	};
	let (first, second) = tokio::join!(
		cache.get_or_exchange(&key, failing()),
		cache.get_or_exchange(&key, failing()),
	);
	let expected = ExchangeError::unavailable("token endpoint offline", Some(503));

	assert_eq!(first, Err(expected.clone()));
	assert_eq!(second, Err(expected));
	assert_eq!(calls.load(Ordering::SeqCst), 1);
	assert!(cache.is_empty());

	let _ = cache.get_or_exchange(&key, failing()).await;

	assert_eq!(calls.load(Ordering::SeqCst), 2, "Failures must not be cached.");
	assert_eq!(cache.metrics().failures(), 2);
}

#[tokio::test]
async fn expiry_triggers_exactly_one_fresh_exchange() {
	let start = datetime!(2026-03-01 09:00 UTC);
	let clock = Arc::new(ManualClock::new(start));
	let cache = ExchangeCache::with_clock("obo", CachePolicy::default(), clock.clone());
	let calls = Arc::new(AtomicUsize::new(0));
	let key = key("caller-a");
	let exchange = |expires_at: OffsetDateTime| {
		let calls = calls.clone();

		move || {
			calls.fetch_add(1, Ordering::SeqCst);

			async move { Ok(credential(expires_at)) }
		}
	};

	cache
		.get_or_exchange(&key, exchange(start + Duration::hours(1)))
		.await
		.expect("Cold lookup should exchange.");

	// One-hour credential: served for 55 minutes.
	clock.advance(Duration::minutes(54));
	cache
		.get_or_exchange(&key, exchange(start + Duration::hours(2)))
		.await
		.expect("Fresh entry should be served.");

	assert_eq!(calls.load(Ordering::SeqCst), 1);

	clock.advance(Duration::minutes(2));

	let renewed = cache
		.get_or_exchange(&key, exchange(start + Duration::hours(2)))
		.await
		.expect("Expired entry should be replaced.");

	cache
		.get_or_exchange(&key, exchange(start + Duration::hours(3)))
		.await
		.expect("Renewed entry should be served.");

	assert_eq!(calls.load(Ordering::SeqCst), 2);
	assert_eq!(renewed.expires_at, start + Duration::hours(2));
}

#[tokio::test]
async fn dropping_the_only_waiter_cancels_the_exchange() {
	let cache = ExchangeCache::new("obo", CachePolicy::default());
	let calls = Arc::new(AtomicUsize::new(0));
	let finished = Arc::new(AtomicBool::new(false));
	let key = key("caller-a");
	let abandoned = tokio::time::timeout(
		std::time::Duration::from_millis(50),
		cache.get_or_exchange(&key, {
			let (calls, finished) = (calls.clone(), finished.clone());

			move || slow_exchange(calls, finished)
		}),
	)
	.await;

	assert!(abandoned.is_err(), "The waiter should have timed out.");

	sleep(EXCHANGE_DELAY * 2).await;

	assert!(!finished.load(Ordering::SeqCst), "The exchange must stop with its last waiter.");
	assert!(cache.is_empty());

	cache
		.get_or_exchange(&key, {
			let (calls, finished) = (calls.clone(), finished.clone());

			move || slow_exchange(calls, finished)
		})
		.await
		.expect("The next caller should start a fresh exchange.");

	assert_eq!(calls.load(Ordering::SeqCst), 2);
	assert!(finished.load(Ordering::SeqCst));
}

#[tokio::test]
async fn remaining_waiters_keep_a_shared_exchange_alive() {
	let cache = ExchangeCache::new("obo", CachePolicy::default());
	let calls = Arc::new(AtomicUsize::new(0));
	let finished = Arc::new(AtomicBool::new(false));
	let key = key("caller-a");
	let impatient = tokio::time::timeout(
		std::time::Duration::from_millis(50),
		cache.get_or_exchange(&key, {
			let (calls, finished) = (calls.clone(), finished.clone());

			move || slow_exchange(calls, finished)
		}),
	);
	let patient = cache.get_or_exchange(&key, {
		let (calls, finished) = (calls.clone(), finished.clone());

		move || slow_exchange(calls, finished)
	});
	let (impatient, patient) = tokio::join!(impatient, patient);

	assert!(impatient.is_err(), "The impatient waiter should have timed out.");
	patient.expect("The remaining waiter should receive the result.");

	assert_eq!(calls.load(Ordering::SeqCst), 1);
	assert!(finished.load(Ordering::SeqCst));
	assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn invalidation_forces_a_new_exchange() {
	let cache = ExchangeCache::new("obo", CachePolicy::default());
	let calls = Arc::new(AtomicUsize::new(0));
	let finished = Arc::new(AtomicBool::new(false));
	let key = key("caller-a");
	let lookup = || {
		let (calls, finished) = (calls.clone(), finished.clone());

		move || slow_exchange(calls, finished)
	};

	cache.get_or_exchange(&key, lookup()).await.expect("Cold lookup should exchange.");

	assert!(cache.invalidate(&key));
	assert!(!cache.invalidate(&key), "A second invalidation has nothing to evict.");

	cache.get_or_exchange(&key, lookup()).await.expect("Lookup after invalidation should exchange.");

	assert_eq!(calls.load(Ordering::SeqCst), 2);
	assert_eq!(cache.metrics().invalidations(), 1);
}
