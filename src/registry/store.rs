//! Durable storage seam for registry tables.
//!
//! The registry is loaded whole at startup and flushed whole on commit, so
//! the store contract is two operations over a [`RegistrySnapshot`].

use async_trait::async_trait;
use sqlx::Row;
use tracing::{debug, instrument};

use super::error::RegistryError;
use super::record::{DatasetRecord, DownloadStatus, PublicationRecord, SourceRecord};
use crate::db::Database;

/// Full contents of the three registry tables, rows in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub datasets: Vec<DatasetRecord>,
    pub publications: Vec<PublicationRecord>,
    pub sources: Vec<SourceRecord>,
}

/// Persistence contract for registry tables.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Reads every table. Missing tables read as empty.
    async fn load(&self) -> Result<RegistrySnapshot, RegistryError>;

    /// Replaces every table with `snapshot` atomically.
    async fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), RegistryError>;
}

/// `SQLite`-backed registry store.
#[derive(Debug, Clone)]
pub struct SqliteRegistryStore {
    db: Database,
}

impl SqliteRegistryStore {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Returns the underlying database handle.
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl RegistryStore for SqliteRegistryStore {
    #[instrument(skip(self))]
    async fn load(&self) -> Result<RegistrySnapshot, RegistryError> {
        let pool = self.db.pool();

        let datasets = sqlx::query("SELECT dataset_id, doi FROM dataset ORDER BY rowid")
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(|row| DatasetRecord {
                dataset_id: row.get("dataset_id"),
                doi: row.get("doi"),
            })
            .collect::<Vec<_>>();

        let publication_rows = sqlx::query(
            "SELECT doi, external_id, is_open_access, title, abstract, download_status \
             FROM publication ORDER BY rowid",
        )
        .fetch_all(pool)
        .await?;

        let mut publications = Vec::with_capacity(publication_rows.len());
        for row in publication_rows {
            let status_str: String = row.get("download_status");
            let download_status = status_str
                .parse::<DownloadStatus>()
                .map_err(|reason| RegistryError::invalid_row("publication", reason))?;
            let is_open_access: i64 = row.get("is_open_access");
            publications.push(PublicationRecord {
                doi: row.get("doi"),
                external_id: row.get("external_id"),
                is_open_access: is_open_access != 0,
                title: row.get("title"),
                abstract_text: row.get("abstract"),
                download_status,
            });
        }

        let sources = sqlx::query("SELECT doi, hosting_domain, link FROM source ORDER BY position")
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(|row| SourceRecord {
                doi: row.get("doi"),
                hosting_domain: row.get("hosting_domain"),
                link: row.get("link"),
            })
            .collect::<Vec<_>>();

        debug!(
            datasets = datasets.len(),
            publications = publications.len(),
            sources = sources.len(),
            "Loaded registry tables"
        );

        Ok(RegistrySnapshot {
            datasets,
            publications,
            sources,
        })
    }

    #[instrument(skip(self, snapshot), fields(
        datasets = snapshot.datasets.len(),
        publications = snapshot.publications.len(),
        sources = snapshot.sources.len()
    ))]
    async fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), RegistryError> {
        let mut tx = self.db.pool().begin().await?;

        sqlx::query("DELETE FROM source").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM publication")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM dataset").execute(&mut *tx).await?;

        for dataset in &snapshot.datasets {
            sqlx::query("INSERT INTO dataset (dataset_id, doi) VALUES (?, ?)")
                .bind(&dataset.dataset_id)
                .bind(dataset.doi.as_deref())
                .execute(&mut *tx)
                .await?;
        }

        for publication in &snapshot.publications {
            sqlx::query(
                "INSERT INTO publication \
                 (doi, external_id, is_open_access, title, abstract, download_status) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&publication.doi)
            .bind(&publication.external_id)
            .bind(i64::from(publication.is_open_access))
            .bind(&publication.title)
            .bind(&publication.abstract_text)
            .bind(publication.download_status.as_str())
            .execute(&mut *tx)
            .await?;
        }

        for (position, source) in (0_i64..).zip(&snapshot.sources) {
            sqlx::query(
                "INSERT INTO source (position, doi, hosting_domain, link) VALUES (?, ?, ?, ?)",
            )
            .bind(position)
            .bind(&source.doi)
            .bind(&source.hosting_domain)
            .bind(&source.link)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Flushed registry tables");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample_snapshot() -> RegistrySnapshot {
        let mut publication = PublicationRecord::new("10.1093/hmg/ddt076", "23390130", true, "T", "A");
        publication.download_status = DownloadStatus::Success;
        RegistrySnapshot {
            datasets: vec![
                DatasetRecord::linked("200011474", "10.1093/hmg/ddt076"),
                DatasetRecord {
                    dataset_id: "200099999".to_string(),
                    doi: None,
                },
            ],
            publications: vec![publication],
            sources: vec![
                SourceRecord::new("10.1093/hmg/ddt076", "academic.oup.com", "/hmg/article/1"),
                SourceRecord::new(
                    "10.1093/hmg/ddt076",
                    "www.ncbi.nlm.nih.gov",
                    "https://www.ncbi.nlm.nih.gov/pmc/articles/PMC1/",
                ),
            ],
        }
    }

    #[tokio::test]
    async fn test_store_load_empty_database() {
        let store = SqliteRegistryStore::new(Database::new_in_memory().await.unwrap());
        let snapshot = store.load().await.unwrap();
        assert_eq!(snapshot, RegistrySnapshot::default());
    }

    #[tokio::test]
    async fn test_store_save_then_load_preserves_rows_and_order() {
        let store = SqliteRegistryStore::new(Database::new_in_memory().await.unwrap());
        let snapshot = sample_snapshot();
        store.save(&snapshot).await.unwrap();
        assert_eq!(store.load().await.unwrap(), snapshot);
    }

    #[tokio::test]
    async fn test_store_save_overwrites_previous_contents() {
        let store = SqliteRegistryStore::new(Database::new_in_memory().await.unwrap());
        store.save(&sample_snapshot()).await.unwrap();

        let smaller = RegistrySnapshot {
            datasets: vec![DatasetRecord::linked("1", "10.1/x")],
            ..RegistrySnapshot::default()
        };
        store.save(&smaller).await.unwrap();
        store.save(&smaller).await.unwrap();

        assert_eq!(store.load().await.unwrap(), smaller);
    }

    #[tokio::test]
    async fn test_store_load_rejects_corrupt_status() {
        let db = Database::new_in_memory().await.unwrap();
        // Bypass the CHECK constraint by recreating the table without it.
        sqlx::query("DROP TABLE publication")
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE publication (doi TEXT PRIMARY KEY, external_id TEXT, \
             is_open_access INTEGER, title TEXT, abstract TEXT, download_status TEXT)",
        )
        .execute(db.pool())
        .await
        .unwrap();
        sqlx::query("INSERT INTO publication VALUES ('10.1/x', '1', 0, '', '', 'maybe')")
            .execute(db.pool())
            .await
            .unwrap();

        let err = SqliteRegistryStore::new(db).load().await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidRow { table: "publication", .. }));
    }
}
