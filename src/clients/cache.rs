use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::CachedClient;

const NIL: usize = usize::MAX;

/// Bounded client cache with least-recently-used eviction.
///
/// The classic map-plus-recency-list layout: nodes live in a slab and link to
/// each other by index, the map points keys at slots. One mutex covers both
/// structures, so no caller can observe them out of step. The refiller walks
/// every entry under the same lock, which is why `for_each` callbacks must
/// stay short and lock-free (the bucket operations are).
///
/// A `max_elements` of zero disables the cache: writes become no-ops and
/// reads miss cleanly.
#[derive(Debug)]
pub struct ClientCache {
	max_elements: usize,
	inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
	index: HashMap<String, usize>,
	nodes: Vec<Node>,
	free: Vec<usize>,
	head: usize,
	tail: usize,
}

#[derive(Debug)]
struct Node {
	prev: usize,
	next: usize,
	entry: Arc<CachedClient>,
}

impl ClientCache {
	pub fn new(max_elements: usize) -> Self {
		ClientCache {
			max_elements,
			inner: Mutex::new(Inner {
				index: HashMap::new(),
				nodes: Vec::new(),
				free: Vec::new(),
				head: NIL,
				tail: NIL,
			}),
		}
	}

	pub fn len(&self) -> usize {
		self.inner.lock().expect("cache lock poisoned").index.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Looks up a client and promotes it to most recently used.
	pub fn get(&self, ip_address: &str) -> Option<Arc<CachedClient>> {
		let mut inner = self.inner.lock().expect("cache lock poisoned");
		let slot = *inner.index.get(ip_address)?;
		inner.promote(slot);
		Some(inner.nodes[slot].entry.clone())
	}

	/// Inserts or replaces a client, promoting it to most recently used.
	/// When the cache is full the least-recently-used entry is evicted first.
	pub fn upsert(&self, entry: Arc<CachedClient>) {
		if self.max_elements == 0 {
			return;
		}
		let mut inner = self.inner.lock().expect("cache lock poisoned");
		if let Some(&slot) = inner.index.get(entry.ip_address()) {
			inner.nodes[slot].entry = entry;
			inner.promote(slot);
			return;
		}
		if inner.index.len() >= self.max_elements {
			inner.evict_tail();
		}
		inner.insert_front(entry);
	}

	pub fn remove(&self, ip_address: &str) {
		let mut inner = self.inner.lock().expect("cache lock poisoned");
		if let Some(slot) = inner.index.remove(ip_address) {
			inner.unlink(slot);
			inner.free.push(slot);
		}
	}

	/// Runs `f` over every entry while holding the cache lock.
	pub fn for_each<F: FnMut(&Arc<CachedClient>)>(&self, mut f: F) {
		let inner = self.inner.lock().expect("cache lock poisoned");
		let mut slot = inner.head;
		while slot != NIL {
			let node = &inner.nodes[slot];
			f(&node.entry);
			slot = node.next;
		}
	}
}

impl Inner {
	fn insert_front(&mut self, entry: Arc<CachedClient>) {
		let node = Node {
			prev: NIL,
			next: self.head,
			entry,
		};
		let slot = match self.free.pop() {
			Some(slot) => {
				self.nodes[slot] = node;
				slot
			},
			None => {
				self.nodes.push(node);
				self.nodes.len() - 1
			},
		};
		if self.head != NIL {
			self.nodes[self.head].prev = slot;
		}
		self.head = slot;
		if self.tail == NIL {
			self.tail = slot;
		}
		let key = self.nodes[slot].entry.ip_address().to_string();
		self.index.insert(key, slot);
	}

	/// Detaches a node from the recency list without touching the index.
	fn unlink(&mut self, slot: usize) {
		let (prev, next) = (self.nodes[slot].prev, self.nodes[slot].next);
		if prev != NIL {
			self.nodes[prev].next = next;
		} else {
			self.head = next;
		}
		if next != NIL {
			self.nodes[next].prev = prev;
		} else {
			self.tail = prev;
		}
		self.nodes[slot].prev = NIL;
		self.nodes[slot].next = NIL;
	}

	fn promote(&mut self, slot: usize) {
		if self.head == slot {
			return;
		}
		self.unlink(slot);
		self.nodes[slot].next = self.head;
		if self.head != NIL {
			self.nodes[self.head].prev = slot;
		}
		self.head = slot;
		if self.tail == NIL {
			self.tail = slot;
		}
	}

	fn evict_tail(&mut self) {
		let slot = self.tail;
		if slot == NIL {
			return;
		}
		let key = self.nodes[slot].entry.ip_address().to_string();
		self.unlink(slot);
		self.index.remove(&key);
		self.free.push(slot);
	}
}
