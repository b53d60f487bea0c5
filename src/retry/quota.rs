//! Bounded retry capacity shared by every call of one retry strategy.

// self
use crate::_prelude::*;

/// Counter confined to `[0, capacity]`.
#[derive(Debug)]
pub struct RetryQuota {
	capacity: u32,
	available: Mutex<u32>,
}
impl RetryQuota {
	/// Creates a full quota.
	pub fn new(capacity: u32) -> Self {
		Self { capacity, available: Mutex::new(capacity) }
	}

	/// Maximum capacity.
	pub fn capacity(&self) -> u32 {
		self.capacity
	}

	/// Capacity currently available.
	pub fn available(&self) -> u32 {
		*self.available.lock()
	}

	/// Withdraws `cost` if available; returns whether the withdrawal happened.
	pub fn try_withdraw(&self, cost: u32) -> bool {
		let mut available = self.available.lock();

		if *available < cost {
			return false;
		}

		*available -= cost;

		true
	}

	/// Returns `amount` to the quota without exceeding capacity.
	pub fn release(&self, amount: u32) {
		let mut available = self.available.lock();

		*available = available.saturating_add(amount).min(self.capacity);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn quota_stays_within_bounds() {
		let quota = RetryQuota::new(12);

		assert!(quota.try_withdraw(10));
		assert!(!quota.try_withdraw(5));
		assert_eq!(quota.available(), 2);

		quota.release(u32::MAX);

		assert_eq!(quota.available(), quota.capacity());
	}
}
