//! Expiration enforcement for a partition.
//!
//! Two independent checks, applied in order when the policy sets them:
//!
//! - **Age**: entries captured more than `max_age_seconds` before `now` are
//!   deleted.
//! - **Count**: if the partition holds `max_entries` or more entries, the
//!   oldest `count - max_entries + 1` are deleted. The check runs before the
//!   pending write, so a steady-state partition keeps at most `max_entries`
//!   entries once the incoming one lands.

use super::connection::CacheDb;
use crate::Error;
use crate::rules::ExpirationPolicy;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;

/// Number of entries removed by each check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ExpirationReport {
    /// Removed by the age check.
    pub expired: u64,
    /// Removed by the count check.
    pub evicted: u64,
}

impl ExpirationReport {
    pub fn total(&self) -> u64 {
        self.expired + self.evicted
    }
}

impl CacheDb {
    /// Apply an expiration policy to a partition as of `now_ms` (epoch ms).
    ///
    /// Runs in one transaction. Enforcing twice with no writes in between
    /// removes nothing the second time.
    pub async fn enforce_expiration(
        &self, partition: &str, policy: &ExpirationPolicy, now_ms: i64,
    ) -> Result<ExpirationReport, Error> {
        let partition = partition.to_string();
        let policy = *policy;
        let report = self
            .conn
            .call(move |conn| -> Result<ExpirationReport, Error> {
                let tx = conn.transaction()?;
                let mut report = ExpirationReport::default();

                if let Some(max_age_seconds) = policy.max_age_seconds {
                    let max_age_ms = i64::try_from(max_age_seconds).unwrap_or(i64::MAX).saturating_mul(1000);
                    let deleted = tx.execute(
                        "DELETE FROM entries WHERE partition = ?1 AND (?2 - cached_at) > ?3",
                        params![partition, now_ms, max_age_ms],
                    )?;
                    report.expired = deleted as u64;
                }

                if let Some(max_entries) = policy.max_entries {
                    let max_entries = i64::from(max_entries);
                    let count: i64 = tx.query_row(
                        "SELECT COUNT(*) FROM entries WHERE partition = ?1",
                        params![partition],
                        |row| row.get(0),
                    )?;

                    if count >= max_entries {
                        let to_delete = count - max_entries + 1;
                        let deleted = tx.execute(
                            "DELETE FROM entries WHERE rowid IN (
                                SELECT rowid FROM entries WHERE partition = ?1
                                ORDER BY cached_at ASC, rowid ASC LIMIT ?2
                            )",
                            params![partition, to_delete],
                        )?;
                        report.evicted = deleted as u64;
                    }
                }

                tx.commit()?;
                Ok(report)
            })
            .await
            .map_err(Error::from)?;

        if report.total() > 0 {
            tracing::debug!(expired = report.expired, evicted = report.evicted, "enforced expiration");
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheEntry;

    const NOW: i64 = 1_700_000_000_000;

    fn entry(url: &str, cached_at: i64) -> CacheEntry {
        CacheEntry::new("GET", url, 200, "OK", Vec::new(), url.as_bytes().to_vec(), cached_at)
    }

    async fn seed(db: &CacheDb, partition: &str, count: i64) {
        for i in 0..count {
            db.put_entry(partition, &entry(&format!("https://example.com/{i}.png"), NOW - 1000 * (count - i)))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_age_based_expiration() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_entry("p", &entry("https://example.com/old", NOW - 11_000)).await.unwrap();
        db.put_entry("p", &entry("https://example.com/young", NOW - 9_000)).await.unwrap();

        let policy = ExpirationPolicy { max_entries: None, max_age_seconds: Some(10) };
        let report = db.enforce_expiration("p", &policy, NOW).await.unwrap();

        assert_eq!(report, ExpirationReport { expired: 1, evicted: 0 });
        assert!(db.get_entry("p", "GET", "https://example.com/old").await.unwrap().is_none());
        assert!(db.get_entry("p", "GET", "https://example.com/young").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_age_boundary_is_exclusive() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_entry("p", &entry("https://example.com/exact", NOW - 10_000)).await.unwrap();

        let policy = ExpirationPolicy { max_entries: None, max_age_seconds: Some(10) };
        let report = db.enforce_expiration("p", &policy, NOW).await.unwrap();

        assert_eq!(report.expired, 0);
        assert_eq!(db.count_entries("p").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_count_based_makes_room_for_one() {
        let db = CacheDb::open_in_memory().await.unwrap();
        seed(&db, "images-cache", 5).await;

        let policy = ExpirationPolicy { max_entries: Some(5), max_age_seconds: None };
        let report = db.enforce_expiration("images-cache", &policy, NOW).await.unwrap();
        assert_eq!(report.evicted, 1);
        assert!(db.get_entry("images-cache", "GET", "https://example.com/0.png").await.unwrap().is_none());

        db.put_entry("images-cache", &entry("https://example.com/new.png", NOW)).await.unwrap();
        assert_eq!(db.count_entries("images-cache").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_count_below_threshold_untouched() {
        let db = CacheDb::open_in_memory().await.unwrap();
        seed(&db, "p", 4).await;

        let policy = ExpirationPolicy { max_entries: Some(5), max_age_seconds: None };
        let report = db.enforce_expiration("p", &policy, NOW).await.unwrap();
        assert_eq!(report.total(), 0);
        assert_eq!(db.count_entries("p").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_count_over_limit_trims_oldest() {
        let db = CacheDb::open_in_memory().await.unwrap();
        seed(&db, "p", 8).await;

        let policy = ExpirationPolicy { max_entries: Some(5), max_age_seconds: None };
        let report = db.enforce_expiration("p", &policy, NOW).await.unwrap();
        assert_eq!(report.evicted, 4);

        let urls: Vec<String> = db.entry_keys("p").await.unwrap().into_iter().map(|k| k.url).collect();
        assert_eq!(urls.first().map(String::as_str), Some("https://example.com/4.png"));
        assert_eq!(urls.len(), 4);
    }

    #[tokio::test]
    async fn test_enforcement_is_idempotent() {
        let db = CacheDb::open_in_memory().await.unwrap();
        seed(&db, "p", 7).await;
        db.put_entry("p", &entry("https://example.com/ancient", NOW - 60_000)).await.unwrap();

        let policy = ExpirationPolicy { max_entries: Some(5), max_age_seconds: Some(5) };
        db.enforce_expiration("p", &policy, NOW).await.unwrap();
        let once = db.entry_keys("p").await.unwrap();

        let second = db.enforce_expiration("p", &policy, NOW).await.unwrap();
        let twice = db.entry_keys("p").await.unwrap();

        assert_eq!(second.total(), 0);
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_other_partitions_untouched() {
        let db = CacheDb::open_in_memory().await.unwrap();
        seed(&db, "a", 3).await;
        seed(&db, "b", 3).await;

        let policy = ExpirationPolicy { max_entries: Some(1), max_age_seconds: None };
        db.enforce_expiration("a", &policy, NOW).await.unwrap();

        assert_eq!(db.count_entries("a").await.unwrap(), 0);
        assert_eq!(db.count_entries("b").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_empty_policy_is_noop() {
        let db = CacheDb::open_in_memory().await.unwrap();
        seed(&db, "p", 3).await;

        let report = db.enforce_expiration("p", &ExpirationPolicy::default(), NOW).await.unwrap();
        assert_eq!(report.total(), 0);
    }
}
