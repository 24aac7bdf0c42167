//! Partition enumeration and deletion.

use super::connection::CacheDb;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// Partition summary for inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct PartitionInfo {
    pub name: String,
    pub entries: u64,
    pub created_at: String,
}

impl CacheDb {
    /// Names of all existing partitions, in creation order.
    pub async fn partitions(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM partitions ORDER BY created_at ASC, name ASC")?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                let names = rows.collect::<Result<Vec<String>, rusqlite::Error>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Every partition with its entry count.
    pub async fn partition_stats(&self) -> Result<Vec<PartitionInfo>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<PartitionInfo>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT p.name, p.created_at, COUNT(e.key_hash)
                    FROM partitions p LEFT JOIN entries e ON e.partition = p.name
                    GROUP BY p.name, p.created_at
                    ORDER BY p.created_at ASC, p.name ASC",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(PartitionInfo {
                        name: row.get(0)?,
                        created_at: row.get(1)?,
                        entries: row.get::<_, i64>(2)? as u64,
                    })
                })?;
                let stats = rows.collect::<Result<Vec<_>, rusqlite::Error>>()?;
                Ok(stats)
            })
            .await
            .map_err(Error::from)
    }

    /// Whether a partition exists.
    pub async fn has_partition(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM partitions WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a partition and all of its entries.
    ///
    /// Returns false if no partition with that name existed.
    pub async fn delete_partition(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM partitions WHERE name = ?1", params![name])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }
}
