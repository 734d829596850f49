pub mod refiller;

use std::sync::atomic::{AtomicI32, Ordering};

/// Per-client token bucket.
///
/// Both operations are CAS loops over the same word, which keeps the counter
/// inside `[0, capacity]` without a lock: a decrement only succeeds after
/// observing at least one token, and two concurrent `allow` calls can never
/// spend the same token because the loser of the exchange retries against
/// the new value.
#[derive(Debug)]
pub struct TokenBucket {
	capacity: i32,
	rate_per_second: i32,
	tokens: AtomicI32,
}

impl TokenBucket {
	/// A fresh bucket starts full.
	pub fn new(capacity: i32, rate_per_second: i32) -> Self {
		Self::with_tokens(capacity, rate_per_second, capacity)
	}

	/// Restores a bucket at an explicit level, clamped into `[0, capacity]`.
	pub fn with_tokens(capacity: i32, rate_per_second: i32, tokens: i32) -> Self {
		let capacity = capacity.max(0);
		TokenBucket {
			capacity,
			rate_per_second: rate_per_second.max(0),
			tokens: AtomicI32::new(tokens.clamp(0, capacity)),
		}
	}

	pub fn tokens(&self) -> i32 {
		self.tokens.load(Ordering::Acquire)
	}

	/// Takes one token. Returns false without mutating when the bucket is
	/// empty.
	pub fn allow(&self) -> bool {
		let mut current = self.tokens.load(Ordering::Acquire);
		loop {
			if current <= 0 {
				return false;
			}
			match self.tokens.compare_exchange_weak(
				current,
				current - 1,
				Ordering::AcqRel,
				Ordering::Acquire,
			) {
				Ok(_) => return true,
				Err(observed) => current = observed,
			}
		}
	}

	/// Adds one second's worth of tokens, saturating at capacity. Called by
	/// the refiller once per second per cached client.
	pub fn refill(&self) {
		let mut current = self.tokens.load(Ordering::Acquire);
		loop {
			let next = current
				.saturating_add(self.rate_per_second)
				.min(self.capacity);
			if next == current {
				return;
			}
			match self
				.tokens
				.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
			{
				Ok(_) => return,
				Err(observed) => current = observed,
			}
		}
	}
}
