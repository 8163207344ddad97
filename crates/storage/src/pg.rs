//! PostgreSQL storage backend using sqlx.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use threadsight_core::{Insight, NewInsight, NormalizedMessage};
use uuid::Uuid;

use crate::error::StorageError;
use crate::traits::{
    CacheStore, ConversationStore, InsightFilter, InsightPage, InsightStore, Thread, TrendSample,
};

#[derive(Clone, Debug)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    /// Connect to PostgreSQL and run embedded migrations.
    pub async fn new(database_url: &str) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new().max_connections(8).connect(database_url).await?;
        sqlx::migrate!("./migrations").run(&pool).await.map_err(sqlx::Error::from)?;
        tracing::info!("PgStorage initialized");
        Ok(Self { pool })
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const INSIGHT_COLUMNS: &str = "id, conversation_id, grok_output, sentiment, topics, gaps,
     prompt_tokens, completion_tokens, cost_estimate, created_at, skipped_reason";

fn parse_string_list(val: Option<serde_json::Value>) -> Option<Vec<String>> {
    val.and_then(|v| serde_json::from_value(v).ok())
}

fn row_to_insight(row: &sqlx::postgres::PgRow) -> Result<Insight, StorageError> {
    Ok(Insight {
        id: row.try_get("id")?,
        conversation_id: row.try_get("conversation_id")?,
        grok_output: row.try_get("grok_output")?,
        sentiment: row.try_get("sentiment")?,
        topics: parse_string_list(row.try_get("topics")?),
        gaps: parse_string_list(row.try_get("gaps")?),
        prompt_tokens: row.try_get("prompt_tokens")?,
        completion_tokens: row.try_get("completion_tokens")?,
        cost_estimate: row.try_get("cost_estimate")?,
        created_at: row.try_get("created_at")?,
        skipped_reason: row.try_get("skipped_reason")?,
    })
}

/// Build the WHERE clause for an insight filter. Returns the clause (always
/// non-empty: skipped rows are excluded unconditionally) and the string binds,
/// in order. Values are bound as text and cast server-side.
fn filter_conditions(filter: &InsightFilter) -> (String, Vec<String>) {
    let mut conditions = vec!["skipped_reason IS NULL".to_owned()];
    let mut binds: Vec<String> = Vec::new();
    let mut param_idx: usize = 1;

    if let Some(cid) = filter.conversation_id {
        conditions.push(format!("conversation_id = ${param_idx}::uuid"));
        param_idx += 1;
        binds.push(cid.to_string());
    }
    if let Some(from) = filter.date_from {
        conditions.push(format!("created_at >= ${param_idx}::timestamptz"));
        param_idx += 1;
        binds.push(from.to_rfc3339());
    }
    if let Some(to) = filter.date_to {
        conditions.push(format!("created_at < ${param_idx}::timestamptz"));
        param_idx += 1;
        binds.push(to.to_rfc3339());
    }
    if let Some(ref s) = filter.sentiment {
        conditions.push(format!("sentiment = ${param_idx}"));
        param_idx += 1;
        binds.push(s.clone());
    }
    if let Some(ref topic) = filter.topic {
        conditions.push(format!("topics @> ${param_idx}::jsonb"));
        binds.push(serde_json::json!([topic]).to_string());
    }

    (conditions.join(" AND "), binds)
}

#[async_trait]
impl ConversationStore for PgStorage {
    async fn upsert_conversation(
        &self,
        messages: &[NormalizedMessage],
        root_tweet_id: &str,
    ) -> Result<Uuid, StorageError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let existing: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM conversations WHERE root_tweet_id = $1")
                .bind(root_tweet_id)
                .fetch_optional(&mut *tx)
                .await?;

        let conversation_id = if let Some(id) = existing {
            id
        } else {
            let inserted: Option<Uuid> = sqlx::query_scalar(
                "INSERT INTO conversations (id, root_tweet_id, created_at, updated_at)
                 VALUES ($1, $2, $3, $3)
                 ON CONFLICT (root_tweet_id) DO NOTHING
                 RETURNING id",
            )
            .bind(Uuid::new_v4())
            .bind(root_tweet_id)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;
            match inserted {
                Some(id) => id,
                // Lost the insert race to a concurrent writer; read its row.
                None => sqlx::query_scalar("SELECT id FROM conversations WHERE root_tweet_id = $1")
                    .bind(root_tweet_id)
                    .fetch_one(&mut *tx)
                    .await?,
            }
        };

        let mut added = 0_u64;
        for m in messages {
            let result = sqlx::query(
                "INSERT INTO tweets
                   (id, conversation_id, author_id, text, in_reply_to_id, quoted_id,
                    inbound, created_at, created_at_raw)
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
                 ON CONFLICT (id) DO NOTHING",
            )
            .bind(&m.tweet_id)
            .bind(conversation_id)
            .bind(&m.author_id)
            .bind(&m.text)
            .bind(&m.in_reply_to_id)
            .bind(&m.quoted_id)
            .bind(m.inbound)
            .bind(m.created_at.unwrap_or(now))
            .bind(&m.created_at_raw)
            .execute(&mut *tx)
            .await?;
            added += result.rows_affected();
        }

        if added > 0 {
            sqlx::query("UPDATE conversations SET updated_at = $1 WHERE id = $2")
                .bind(now)
                .bind(conversation_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(conversation_id)
    }

    async fn load_thread(&self, conversation_id: Uuid) -> Result<Option<Thread>, StorageError> {
        let root: Option<String> =
            sqlx::query_scalar("SELECT root_tweet_id FROM conversations WHERE id = $1")
                .bind(conversation_id)
                .fetch_optional(&self.pool)
                .await?;
        let Some(root_tweet_id) = root else {
            return Ok(None);
        };
        let texts: Vec<String> = sqlx::query_scalar(
            "SELECT text FROM tweets WHERE conversation_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(Some(Thread { texts, root_tweet_id }))
    }
}

#[async_trait]
impl InsightStore for PgStorage {
    async fn insert_insight(
        &self,
        conversation_id: Uuid,
        insight: NewInsight,
    ) -> Result<Uuid, StorageError> {
        let id = Uuid::new_v4();
        let topics = insight.topics.as_ref().map(serde_json::to_value).transpose()?;
        let gaps = insight.gaps.as_ref().map(serde_json::to_value).transpose()?;
        let result = sqlx::query(
            "INSERT INTO insights
               (id, conversation_id, grok_output, sentiment, topics, gaps,
                prompt_tokens, completion_tokens, cost_estimate, created_at, skipped_reason)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)
             ON CONFLICT (conversation_id) DO NOTHING",
        )
        .bind(id)
        .bind(conversation_id)
        .bind(&insight.grok_output)
        .bind(&insight.sentiment)
        .bind(topics)
        .bind(gaps)
        .bind(insight.prompt_tokens)
        .bind(insight.completion_tokens)
        .bind(insight.cost_estimate)
        .bind(Utc::now())
        .bind(&insight.skipped_reason)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::InsightExists(conversation_id));
        }
        Ok(id)
    }

    async fn get_insight(&self, conversation_id: Uuid) -> Result<Option<Insight>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {INSIGHT_COLUMNS} FROM insights WHERE conversation_id = $1"
        ))
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_insight).transpose()
    }

    async fn list_insights(
        &self,
        filter: &InsightFilter,
        limit: i64,
        offset: i64,
    ) -> Result<InsightPage, StorageError> {
        let (where_clause, binds) = filter_conditions(filter);

        let count_sql = format!("SELECT COUNT(*) FROM insights WHERE {where_clause}");
        let mut count_query = sqlx::query_scalar(&count_sql);
        for val in &binds {
            count_query = count_query.bind(val);
        }
        let total: i64 = count_query.fetch_one(&self.pool).await?;

        let next_param = binds.len() + 1;
        let list_sql = format!(
            "SELECT {INSIGHT_COLUMNS} FROM insights WHERE {where_clause}
             ORDER BY created_at DESC LIMIT ${next_param} OFFSET ${}",
            next_param + 1
        );
        let mut list_query = sqlx::query(&list_sql);
        for val in &binds {
            list_query = list_query.bind(val);
        }
        let rows = list_query.bind(limit).bind(offset).fetch_all(&self.pool).await?;
        let items = rows.iter().map(row_to_insight).collect::<Result<Vec<_>, _>>()?;
        Ok(InsightPage { items, total })
    }

    async fn insights_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<TrendSample>, StorageError> {
        let rows = sqlx::query(
            "SELECT created_at, sentiment, topics, gaps FROM insights
             WHERE skipped_reason IS NULL AND created_at >= $1",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(TrendSample {
                    created_at: row.try_get("created_at")?,
                    sentiment: row.try_get("sentiment")?,
                    topics: parse_string_list(row.try_get("topics")?),
                    gaps: parse_string_list(row.try_get("gaps")?),
                })
            })
            .collect()
    }
}

#[async_trait]
impl CacheStore for PgStorage {
    async fn get_cached(&self, thread_hash: &str) -> Result<Option<Uuid>, StorageError> {
        let id: Option<Uuid> =
            sqlx::query_scalar("SELECT conversation_id FROM analysis_cache WHERE thread_hash = $1")
                .bind(thread_hash)
                .fetch_optional(&self.pool)
                .await?;
        Ok(id)
    }

    async fn set_cached(
        &self,
        thread_hash: &str,
        conversation_id: Uuid,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO analysis_cache (id, thread_hash, conversation_id, created_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (thread_hash) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(thread_hash)
        .bind(conversation_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
