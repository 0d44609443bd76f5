use std::sync::Arc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::DiskUtilizationNotifier;

/// Current usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub total_size_bytes: u64,
    pub peak_size_bytes: u64,
    pub resets: u64,
}

impl UsageStats {
    /// Create new usage statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Add object size
    pub fn add_size(&mut self, size_bytes: u64) {
        self.total_size_bytes = self.total_size_bytes.saturating_add(size_bytes);
        self.peak_size_bytes = self.peak_size_bytes.max(self.total_size_bytes);
    }

    /// Remove object size
    pub fn remove_size(&mut self, size_bytes: u64) {
        self.total_size_bytes = self.total_size_bytes.saturating_sub(size_bytes);
    }

    /// Fold one disk-utilization notification in
    pub fn apply(&mut self, delta: i64) {
        match delta {
            0 => {
                self.total_size_bytes = 0;
                self.resets += 1;
            }
            d if d > 0 => self.add_size(d.unsigned_abs()),
            d => self.remove_size(d.unsigned_abs()),
        }
    }
}

/// Service-side accounting of the bytes a backend reports
#[derive(Debug, Clone)]
pub struct QuotaManager {
    quota_bytes: u64,
    usage: Arc<Mutex<UsageStats>>,
}

impl QuotaManager {
    /// Create a new quota manager
    pub fn new(quota_bytes: u64) -> Self {
        Self {
            quota_bytes,
            usage: Arc::new(Mutex::new(UsageStats::new())),
        }
    }

    /// Notifier to hand to a backend; every call updates this manager
    pub fn notifier(&self) -> DiskUtilizationNotifier {
        let usage = Arc::clone(&self.usage);
        Box::new(move |delta: i64| {
            let total = {
                let mut stats = usage.lock();
                stats.apply(delta);
                stats.total_size_bytes
            };
            debug!(delta, total, "Disk utilization changed");
        })
    }

    /// Get usage statistics
    pub fn usage(&self) -> UsageStats {
        *self.usage.lock()
    }

    /// Fraction of the quota in use
    pub fn utilization(&self) -> f64 {
        self.usage().total_size_bytes as f64 / self.quota_bytes as f64
    }

    /// Bytes left before the quota is reached
    pub fn remaining(&self) -> u64 {
        self.quota_bytes.saturating_sub(self.usage().total_size_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_stats_apply() {
        let mut stats = UsageStats::new();
        stats.apply(500);
        stats.apply(250);
        stats.apply(-600);
        assert_eq!(stats.total_size_bytes, 150);
        assert_eq!(stats.peak_size_bytes, 750);

        stats.apply(-1_000);
        assert_eq!(stats.total_size_bytes, 0);

        stats.apply(10);
        stats.apply(0);
        assert_eq!(stats.total_size_bytes, 0);
        assert_eq!(stats.resets, 1);
    }

    #[test]
    fn test_quota_management() {
        let quota_manager = QuotaManager::new(1000);
        let mut notify = quota_manager.notifier();

        notify(500);
        assert_eq!(quota_manager.usage().total_size_bytes, 500);
        assert_eq!(quota_manager.remaining(), 500);
        assert!((quota_manager.utilization() - 0.5).abs() < f64::EPSILON);

        notify(-200);
        assert_eq!(quota_manager.usage().total_size_bytes, 300);
        assert_eq!(quota_manager.usage().peak_size_bytes, 500);

        notify(0);
        assert_eq!(quota_manager.usage().total_size_bytes, 0);
        assert_eq!(quota_manager.remaining(), 1000);
    }

    #[test]
    fn test_usage_reads_are_consistent_while_notifying() {
        let quota_manager = QuotaManager::new(u64::MAX);
        let mut notify = quota_manager.notifier();
        let reader = quota_manager.clone();

        let handle = std::thread::spawn(move || {
            for _ in 0..100_000 {
                let stats = reader.usage();
                assert!(stats.total_size_bytes <= stats.peak_size_bytes);
                assert!(stats.resets <= 1);
            }
        });
        for i in 0..100_000 {
            notify(1);
            if i == 50_000 {
                notify(0);
            }
        }
        handle.join().unwrap();

        let stats = quota_manager.usage();
        assert_eq!(stats.total_size_bytes, 49_999);
        assert_eq!(stats.peak_size_bytes, 50_001);
        assert_eq!(stats.resets, 1);
    }
}
