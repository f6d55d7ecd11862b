//! Postgres-backed job store over the `conversion_jobs` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use omnidocs_core::job::{ArtifactRef, Job};
use omnidocs_core::progress::ConversionProgress;
use omnidocs_core::request::JobInput;
use omnidocs_core::types::JobId;
use sqlx::types::Json;
use sqlx::FromRow;

use crate::store::{JobStore, StoreError};
use crate::DbPool;

/// Columns selected for a full job record.
const COLUMNS: &str = "id, url, output_format, paths_to_include, paths_to_exclude, status, \
     message, progress, error, converter_task_id, artifact, expires_at, created_at, updated_at";

/// Upsert guarded so that terminal rows never change, status never moves
/// backwards and `updated_at` never goes back in time.
const UPSERT: &str = r#"
INSERT INTO conversion_jobs
    (id, url, output_format, paths_to_include, paths_to_exclude, status,
     message, progress, error, converter_task_id, artifact, expires_at,
     created_at, updated_at)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
ON CONFLICT (id) DO UPDATE SET
    status = EXCLUDED.status,
    message = EXCLUDED.message,
    progress = EXCLUDED.progress,
    error = EXCLUDED.error,
    converter_task_id = EXCLUDED.converter_task_id,
    artifact = EXCLUDED.artifact,
    expires_at = EXCLUDED.expires_at,
    updated_at = EXCLUDED.updated_at
WHERE conversion_jobs.status IN ('pending', 'processing')
  AND (CASE EXCLUDED.status WHEN 'pending' THEN 0 WHEN 'processing' THEN 1 ELSE 2 END)
      >= (CASE conversion_jobs.status WHEN 'pending' THEN 0 ELSE 1 END)
  AND EXCLUDED.updated_at >= conversion_jobs.updated_at
"#;

#[derive(Debug, FromRow)]
struct JobRow {
    id: JobId,
    url: String,
    output_format: String,
    paths_to_include: Vec<String>,
    paths_to_exclude: Vec<String>,
    status: String,
    message: Option<String>,
    progress: Option<Json<ConversionProgress>>,
    error: Option<String>,
    converter_task_id: Option<String>,
    artifact: Option<Json<ArtifactRef>>,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let output_format = row
            .output_format
            .parse()
            .map_err(|e| StoreError::InvalidRecord(format!("{}: {e}", row.id)))?;
        let status = row
            .status
            .parse()
            .map_err(|e| StoreError::InvalidRecord(format!("{}: {e}", row.id)))?;

        Ok(Job {
            id: row.id,
            input: JobInput {
                url: row.url,
                output_format,
                paths_to_include: row.paths_to_include,
                paths_to_exclude: row.paths_to_exclude,
            },
            status,
            message: row.message,
            progress: row.progress.map(|p| p.0),
            error: row.error,
            converter_task_id: row.converter_task_id,
            artifact: row.artifact.map(|a| a.0),
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// [`JobStore`] over a Postgres pool.
#[derive(Clone)]
pub struct PgJobStore {
    pool: DbPool,
}

impl PgJobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn put(&self, job: &Job) -> Result<(), StoreError> {
        let result = sqlx::query(UPSERT)
            .bind(job.id)
            .bind(&job.input.url)
            .bind(job.input.output_format.as_str())
            .bind(&job.input.paths_to_include)
            .bind(&job.input.paths_to_exclude)
            .bind(job.status.as_str())
            .bind(&job.message)
            .bind(job.progress.as_ref().map(Json))
            .bind(&job.error)
            .bind(&job.converter_task_id)
            .bind(job.artifact.as_ref().map(Json))
            .bind(job.expires_at)
            .bind(job.created_at)
            .bind(job.updated_at)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict {
                id: job.id,
                reason: format!("stored record does not accept a {} write", job.status),
            });
        }
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM conversion_jobs WHERE id = $1");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Job::try_from)
            .transpose()
    }

    async fn list(&self) -> Result<Vec<Job>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM conversion_jobs ORDER BY created_at DESC");
        sqlx::query_as::<_, JobRow>(&query)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Job::try_from)
            .collect()
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        crate::health_check(&self.pool).await?;
        Ok(())
    }
}
