//! Turso Embedded / libSQL article store.
//!
//! The pipeline only sees the [`ArticleStore`] trait: list pending originals,
//! create, update. [`Storage`] is the libSQL-backed implementation used by the
//! CLI; tests substitute in-memory fakes.

mod migrations;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use refresh_shared::{Article, ArticleId, ArticleUpdate, NewArticle, RefreshError, Result};

/// Article persistence contract consumed by the refresh pipeline.
///
/// No transactional guarantee spans calls.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Originals that have not been rewritten yet, oldest first.
    async fn list_pending(&self) -> Result<Vec<Article>>;

    /// Every stored article, newest first.
    async fn list_all(&self) -> Result<Vec<Article>>;

    async fn get(&self, id: &ArticleId) -> Result<Option<Article>>;

    /// Insert a record and return its freshly assigned id.
    async fn create(&self, article: NewArticle) -> Result<ArticleId>;

    /// Overwrite content, flag, and reference links of an existing record.
    async fn update(&self, id: &ArticleId, update: ArticleUpdate) -> Result<()>;

    async fn delete(&self, id: &ArticleId) -> Result<()>;
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

const ARTICLE_COLUMNS: &str =
    "id, title, slug, content, source_url, is_updated, reference_links, created_at, updated_at";

impl Storage {
    /// Open or create a database at `path` and apply migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RefreshError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| RefreshError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| RefreshError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        RefreshError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    async fn query_articles(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<Article>> {
        let mut rows = self
            .conn
            .query(sql, params)
            .await
            .map_err(|e| RefreshError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| RefreshError::Storage(e.to_string()))?
        {
            results.push(row_to_article(&row)?);
        }
        Ok(results)
    }
}

#[async_trait]
impl ArticleStore for Storage {
    async fn list_pending(&self) -> Result<Vec<Article>> {
        self.query_articles(
            &format!(
                "SELECT {ARTICLE_COLUMNS} FROM articles
                 WHERE is_updated = 0 ORDER BY created_at, id"
            ),
            params![],
        )
        .await
    }

    async fn list_all(&self) -> Result<Vec<Article>> {
        self.query_articles(
            &format!("SELECT {ARTICLE_COLUMNS} FROM articles ORDER BY created_at DESC, id DESC"),
            params![],
        )
        .await
    }

    async fn get(&self, id: &ArticleId) -> Result<Option<Article>> {
        let mut found = self
            .query_articles(
                &format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ?1"),
                params![id.to_string()],
            )
            .await?;
        Ok(found.pop())
    }

    async fn create(&self, article: NewArticle) -> Result<ArticleId> {
        if article.title.trim().is_empty() {
            return Err(RefreshError::validation("article title must not be empty"));
        }

        let id = ArticleId::new();
        let now = Utc::now().to_rfc3339();
        let links = encode_links(&article.reference_links)?;
        self.conn
            .execute(
                "INSERT INTO articles (id, title, slug, content, source_url, is_updated, reference_links, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id.to_string(),
                    article.title.as_str(),
                    article.slug(),
                    article.content.as_str(),
                    article.source_url.as_deref(),
                    i64::from(article.is_updated),
                    links.as_deref(),
                    now.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| RefreshError::Storage(e.to_string()))?;

        tracing::debug!(%id, title = %article.title, "article created");
        Ok(id)
    }

    async fn update(&self, id: &ArticleId, update: ArticleUpdate) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let links = encode_links(&update.reference_links)?;
        let changed = self
            .conn
            .execute(
                "UPDATE articles
                 SET content = ?1, is_updated = ?2, reference_links = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![
                    update.content.as_str(),
                    i64::from(update.is_updated),
                    links.as_deref(),
                    now.as_str(),
                    id.to_string(),
                ],
            )
            .await
            .map_err(|e| RefreshError::Storage(e.to_string()))?;

        if changed == 0 {
            return Err(RefreshError::validation(format!("article {id} not found")));
        }
        Ok(())
    }

    async fn delete(&self, id: &ArticleId) -> Result<()> {
        self.conn
            .execute("DELETE FROM articles WHERE id = ?1", params![id.to_string()])
            .await
            .map_err(|e| RefreshError::Storage(e.to_string()))?;
        Ok(())
    }
}

/// `reference_links` is a JSON array, NULL when there are none.
fn encode_links(links: &[String]) -> Result<Option<String>> {
    if links.is_empty() {
        return Ok(None);
    }
    serde_json::to_string(links)
        .map(Some)
        .map_err(|e| RefreshError::Storage(format!("encode reference_links: {e}")))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RefreshError::Storage(format!("invalid date: {e}")))
}

/// Convert a database row to an [`Article`].
fn row_to_article(row: &libsql::Row) -> Result<Article> {
    let storage_err = |e: libsql::Error| RefreshError::Storage(e.to_string());

    let id: String = row.get(0).map_err(storage_err)?;
    let links: Vec<String> = match row.get::<String>(6).ok() {
        Some(json) => serde_json::from_str(&json)
            .map_err(|e| RefreshError::Storage(format!("invalid reference_links: {e}")))?,
        None => Vec::new(),
    };

    Ok(Article {
        id: id
            .parse()
            .map_err(|e| RefreshError::Storage(format!("invalid article id '{id}': {e}")))?,
        title: row.get(1).map_err(storage_err)?,
        slug: row.get(2).map_err(storage_err)?,
        content: row.get(3).map_err(storage_err)?,
        source_url: row.get::<String>(4).ok(),
        is_updated: row.get::<i64>(5).map_err(storage_err)? != 0,
        reference_links: links,
        created_at: parse_timestamp(&row.get::<String>(7).map_err(storage_err)?)?,
        updated_at: parse_timestamp(&row.get::<String>(8).map_err(storage_err)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("ar_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("ar_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn create_and_get() {
        let storage = test_storage().await;
        let id = storage
            .create(NewArticle::original(
                "Choosing a Chatbot",
                "Original body",
                Some("https://blog.example.com/choosing".into()),
            ))
            .await
            .expect("create");

        let article = storage.get(&id).await.expect("get").expect("present");
        assert_eq!(article.title, "Choosing a Chatbot");
        assert_eq!(article.slug, "choosing-a-chatbot");
        assert_eq!(article.source_url.as_deref(), Some("https://blog.example.com/choosing"));
        assert!(!article.is_updated);
        assert!(article.reference_links.is_empty());
    }

    #[tokio::test]
    async fn empty_title_is_rejected() {
        let storage = test_storage().await;
        let result = storage.create(NewArticle::original("  ", "body", None)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn list_pending_excludes_updated() {
        let storage = test_storage().await;
        let first = storage
            .create(NewArticle::original("First", "a", None))
            .await
            .unwrap();
        let second = storage
            .create(NewArticle::original("Second", "b", None))
            .await
            .unwrap();

        storage
            .update(
                &first,
                ArticleUpdate::rewritten("rewritten", vec!["https://r.example/blog/1".into()]),
            )
            .await
            .expect("update");

        let pending = storage.list_pending().await.expect("list pending");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second);

        let all = storage.list_all().await.expect("list all");
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn update_in_place_keeps_title_and_stores_links() {
        let storage = test_storage().await;
        let id = storage
            .create(NewArticle::original("Support Automation", "old", None))
            .await
            .unwrap();

        let links = vec![
            "https://a.example/blog/x".to_string(),
            "https://b.example/article/y".to_string(),
        ];
        storage
            .update(&id, ArticleUpdate::rewritten("## New\n\nbody", links.clone()))
            .await
            .unwrap();

        let article = storage.get(&id).await.unwrap().unwrap();
        assert_eq!(article.title, "Support Automation");
        assert_eq!(article.content, "## New\n\nbody");
        assert!(article.is_updated);
        assert_eq!(article.reference_links, links);
        assert!(article.updated_at >= article.created_at);
    }

    #[tokio::test]
    async fn update_unknown_id_fails() {
        let storage = test_storage().await;
        let result = storage
            .update(&ArticleId::new(), ArticleUpdate::rewritten("x", vec![]))
            .await;
        assert!(result.unwrap_err().to_string().contains("not found"));
    }

    #[tokio::test]
    async fn delete_removes_article() {
        let storage = test_storage().await;
        let id = storage
            .create(NewArticle::original("Gone Soon", "x", None))
            .await
            .unwrap();
        storage.delete(&id).await.expect("delete");
        assert!(storage.get(&id).await.unwrap().is_none());
    }
}
