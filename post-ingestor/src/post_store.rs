use crate::traits::PostStore;
use crate::types::{EnrichedRecord, IngestError, Result, Source};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Table names used by [`PgPostStore`].
#[derive(Debug, Clone)]
pub struct StoreTables {
    pub sources: String,
    pub posts: String,
}

impl Default for StoreTables {
    fn default() -> Self {
        Self {
            sources: "links".to_string(),
            posts: "posts".to_string(),
        }
    }
}

impl StoreTables {
    pub fn validate(&self) -> Result<()> {
        for name in [&self.sources, &self.posts] {
            let mut chars = name.chars();
            let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid {
                return Err(IngestError::Config(format!("Invalid table name: {:?}", name)));
            }
        }
        Ok(())
    }
}

/// PostgreSQL-backed store. Link uniqueness is enforced by the posts table.
pub struct PgPostStore {
    db: PgPool,
    tables: StoreTables,
}

impl PgPostStore {
    pub async fn connect(database_url: &str, tables: StoreTables) -> Result<Self> {
        tables.validate()?;
        let db = PgPool::connect(database_url).await?;
        Ok(Self { db, tables })
    }

    /// Creates the sources and posts tables if they do not exist yet.
    pub async fn setup_schema(&self) -> Result<()> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                company TEXT NOT NULL,
                link TEXT NOT NULL UNIQUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            self.tables.sources
        ))
        .execute(&self.db)
        .await?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                published_at DATE NOT NULL,
                company TEXT NOT NULL,
                title TEXT NOT NULL,
                link TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL DEFAULT '',
                summary TEXT NOT NULL,
                full_text TEXT NOT NULL DEFAULT '',
                tags JSONB NOT NULL DEFAULT '[]'::jsonb,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            self.tables.posts
        ))
        .execute(&self.db)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{0}_published ON {0} (published_at)",
            self.tables.posts
        ))
        .execute(&self.db)
        .await?;

        info!(
            "Schema ready (sources: {}, posts: {})",
            self.tables.sources, self.tables.posts
        );
        Ok(())
    }

    /// Registers a feed to poll. Returns `false` if the feed URL is already known.
    pub async fn add_source(&self, source: &Source) -> Result<bool> {
        let result = sqlx::query(&format!(
            "INSERT INTO {} (company, link) VALUES ($1, $2) ON CONFLICT (link) DO NOTHING",
            self.tables.sources
        ))
        .bind(&source.company)
        .bind(&source.feed_url)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn post_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.tables.posts))
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }

    pub async fn close(&self) {
        self.db.close().await;
    }
}

#[async_trait]
impl PostStore for PgPostStore {
    async fn list_sources(&self) -> Result<Vec<Source>> {
        let rows = sqlx::query(&format!(
            "SELECT company, link FROM {} ORDER BY id",
            self.tables.sources
        ))
        .fetch_all(&self.db)
        .await?;

        let mut sources = Vec::with_capacity(rows.len());
        for row in rows {
            sources.push(Source {
                company: row.try_get("company")?,
                feed_url: row.try_get("link")?,
            });
        }

        debug!("Loaded {} sources from {}", sources.len(), self.tables.sources);
        Ok(sources)
    }

    async fn exists(&self, link: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(&format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE link = $1)",
            self.tables.posts
        ))
        .bind(link)
        .fetch_one(&self.db)
        .await?;

        Ok(exists)
    }

    async fn insert(&self, record: &EnrichedRecord) -> Result<bool> {
        let result = sqlx::query(&format!(
            r#"
            INSERT INTO {} (published_at, company, title, link, description, summary, full_text, tags)
            VALUES ($1::date, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (link) DO NOTHING
            "#,
            self.tables.posts
        ))
        .bind(&record.published_at)
        .bind(&record.company)
        .bind(&record.title)
        .bind(&record.link)
        .bind(&record.description)
        .bind(&record.summary)
        .bind(&record.full_text)
        .bind(serde_json::to_value(&record.tags)?)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// In-process store for dry runs and tests. Nothing outlives the process.
#[derive(Default)]
pub struct MemoryPostStore {
    sources: RwLock<Vec<Source>>,
    records: RwLock<Vec<EnrichedRecord>>,
}

impl MemoryPostStore {
    pub fn new(sources: Vec<Source>) -> Self {
        Self {
            sources: RwLock::new(sources),
            records: RwLock::new(Vec::new()),
        }
    }

    pub async fn records(&self) -> Vec<EnrichedRecord> {
        self.records.read().await.clone()
    }

    pub async fn record_for(&self, link: &str) -> Option<EnrichedRecord> {
        self.records
            .read()
            .await
            .iter()
            .find(|record| record.link == link)
            .cloned()
    }
}

#[async_trait]
impl PostStore for MemoryPostStore {
    async fn list_sources(&self) -> Result<Vec<Source>> {
        Ok(self.sources.read().await.clone())
    }

    async fn exists(&self, link: &str) -> Result<bool> {
        Ok(self.records.read().await.iter().any(|record| record.link == link))
    }

    async fn insert(&self, record: &EnrichedRecord) -> Result<bool> {
        // Check and push under one write lock so a link can only land once.
        let mut records = self.records.write().await;
        if records.iter().any(|existing| existing.link == record.link) {
            return Ok(false);
        }
        records.push(record.clone());
        Ok(true)
    }
}
