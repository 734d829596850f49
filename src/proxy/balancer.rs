use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::backend::Backend;

/// Round-robin selection over the backend fleet.
///
/// The cursor only ever moves forward; each call scans at most N slots from
/// the post-increment position, so concurrent callers spread over healthy
/// backends without coordination and the fallback scan order stays
/// deterministic.
#[derive(Debug)]
pub struct RoundRobin {
	backends: Arc<[Arc<Backend>]>,
	cursor: AtomicUsize,
}

impl RoundRobin {
	pub fn new(backends: Vec<Arc<Backend>>) -> Self {
		RoundRobin {
			backends: backends.into(),
			cursor: AtomicUsize::new(0),
		}
	}

	/// Returns the next available backend, or `None` when every backend is
	/// currently unavailable. Wait-free.
	pub fn next(&self) -> Option<Arc<Backend>> {
		let n = self.backends.len();
		for _ in 0..n {
			let current = self.cursor.fetch_add(1, Ordering::Relaxed);
			let backend = &self.backends[current % n];
			if backend.is_available() {
				return Some(backend.clone());
			}
		}
		None
	}
}
