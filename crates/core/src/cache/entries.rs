//! Entry CRUD operations.
//!
//! An entry is one stored response keyed by request identity inside a
//! partition. Writing an entry creates its partition if needed; writing an
//! existing key overwrites it (last write wins).

use super::connection::CacheDb;
use super::hash::compute_cache_key;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension, Transaction};

/// Header added to every stored response, holding the capture time in epoch ms.
pub const CACHED_AT_HEADER: &str = "sw-cached-at";

/// A stored response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request identity hash, see [`compute_cache_key`].
    pub key: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub status_text: String,
    /// Original response headers plus [`CACHED_AT_HEADER`].
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Capture time, epoch milliseconds.
    pub cached_at: i64,
}

impl CacheEntry {
    /// Build an entry for a captured response.
    ///
    /// Any existing capture header is replaced with `cached_at`.
    pub fn new(
        method: &str, url: &str, status: u16, status_text: &str, headers: Vec<(String, String)>, body: Vec<u8>,
        cached_at: i64,
    ) -> Self {
        let mut headers: Vec<(String, String)> = headers
            .into_iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case(CACHED_AT_HEADER))
            .collect();
        headers.push((CACHED_AT_HEADER.to_string(), cached_at.to_string()));

        Self {
            key: compute_cache_key(method, url),
            method: method.to_ascii_uppercase(),
            url: url.to_string(),
            status,
            status_text: status_text.to_string(),
            headers,
            body,
            cached_at,
        }
    }

    /// First header value with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Only successful responses may be stored.
    pub fn is_storable(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Identity of a stored entry, as returned by key enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct EntryKey {
    pub method: String,
    pub url: String,
    pub cached_at: i64,
}

fn ensure_partition(tx: &Transaction<'_>, partition: &str) -> Result<(), Error> {
    tx.execute(
        "INSERT OR IGNORE INTO partitions (name, created_at) VALUES (?1, ?2)",
        params![partition, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

fn write_entry(tx: &Transaction<'_>, partition: &str, entry: &CacheEntry) -> Result<(), Error> {
    if !entry.is_storable() {
        return Err(Error::InvalidInput(format!("refusing to store status {} for {}", entry.status, entry.url)));
    }

    let headers_json = serde_json::to_string(&entry.headers)?;
    tx.execute(
        "INSERT INTO entries (
            partition, key_hash, method, url, status, status_text, headers_json, body, cached_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(partition, key_hash) DO UPDATE SET
            method = excluded.method,
            url = excluded.url,
            status = excluded.status,
            status_text = excluded.status_text,
            headers_json = excluded.headers_json,
            body = excluded.body,
            cached_at = excluded.cached_at",
        params![
            partition,
            &entry.key,
            &entry.method,
            &entry.url,
            entry.status,
            &entry.status_text,
            headers_json,
            &entry.body,
            entry.cached_at,
        ],
    )?;
    Ok(())
}

impl CacheDb {
    /// Store an entry, creating the partition if needed.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for non-2xx entries.
    pub async fn put_entry(&self, partition: &str, entry: &CacheEntry) -> Result<(), Error> {
        let partition = partition.to_string();
        let entry = entry.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                ensure_partition(&tx, &partition)?;
                write_entry(&tx, &partition, &entry)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Store a batch of entries atomically.
    ///
    /// Either every entry is written (and the partition exists afterwards)
    /// or nothing is.
    pub async fn put_entries(&self, partition: &str, entries: Vec<CacheEntry>) -> Result<(), Error> {
        let partition = partition.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                ensure_partition(&tx, &partition)?;
                for entry in &entries {
                    write_entry(&tx, &partition, entry)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Look up the entry for a request.
    ///
    /// Returns None if the partition or the entry doesn't exist.
    pub async fn get_entry(&self, partition: &str, method: &str, url: &str) -> Result<Option<CacheEntry>, Error> {
        let partition = partition.to_string();
        let key = compute_cache_key(method, url);
        self.conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                let row = conn
                    .query_row(
                        "SELECT key_hash, method, url, status, status_text, headers_json, body, cached_at
                        FROM entries WHERE partition = ?1 AND key_hash = ?2",
                        params![partition, key],
                        |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, String>(1)?,
                                row.get::<_, String>(2)?,
                                row.get::<_, u16>(3)?,
                                row.get::<_, String>(4)?,
                                row.get::<_, String>(5)?,
                                row.get::<_, Vec<u8>>(6)?,
                                row.get::<_, i64>(7)?,
                            ))
                        },
                    )
                    .optional()?;

                let Some((key, method, url, status, status_text, headers_json, body, cached_at)) = row else {
                    return Ok(None);
                };

                let headers = serde_json::from_str(&headers_json)?;
                Ok(Some(CacheEntry { key, method, url, status, status_text, headers, body, cached_at }))
            })
            .await
            .map_err(Error::from)
    }

    /// Delete the entry for a request.
    ///
    /// Returns true if an entry was removed.
    pub async fn delete_entry(&self, partition: &str, method: &str, url: &str) -> Result<bool, Error> {
        let partition = partition.to_string();
        let key = compute_cache_key(method, url);
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count =
                    conn.execute("DELETE FROM entries WHERE partition = ?1 AND key_hash = ?2", params![partition, key])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Enumerate entry keys of a partition, oldest capture first.
    pub async fn entry_keys(&self, partition: &str) -> Result<Vec<EntryKey>, Error> {
        let partition = partition.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<EntryKey>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT method, url, cached_at FROM entries
                    WHERE partition = ?1 ORDER BY cached_at ASC, rowid ASC",
                )?;
                let rows = stmt.query_map(params![partition], |row| {
                    Ok(EntryKey { method: row.get(0)?, url: row.get(1)?, cached_at: row.get(2)? })
                })?;
                let keys = rows.collect::<Result<Vec<_>, rusqlite::Error>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in a partition (0 if it doesn't exist).
    pub async fn count_entries(&self, partition: &str) -> Result<u64, Error> {
        let partition = partition.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE partition = ?1", params![partition], |row| {
                        row.get(0)
                    })?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
