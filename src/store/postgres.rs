//! Postgres-backed state store.
//!
//! Schema bootstrap is idempotent (`CREATE TABLE IF NOT EXISTS`) so an
//! embedded deployment can call [`PgStateStore::migrate`] on startup.

use super::{ExecutionFilter, StateStore, StoreError};
use crate::models::{Deliverable, EventRecord, Execution, Step};
use crate::state_machine::{ExecutionState, StepState};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

pub struct PgStateStore {
    pool: PgPool,
}

impl PgStateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the engine's task-tracking tables if they do not exist.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS maestro_executions (
                id UUID PRIMARY KEY,
                user_id TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                content_type TEXT NOT NULL,
                template_id UUID,
                brand_context JSONB NOT NULL,
                status TEXT NOT NULL,
                priority SMALLINT NOT NULL,
                estimated_completion TIMESTAMPTZ,
                rework_count INTEGER NOT NULL,
                error TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                started_at TIMESTAMPTZ,
                completed_at TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS maestro_steps (
                id UUID PRIMARY KEY,
                execution_id UUID NOT NULL,
                step_type TEXT NOT NULL,
                status TEXT NOT NULL,
                progress SMALLINT NOT NULL,
                requires JSONB NOT NULL,
                produces TEXT NOT NULL,
                skippable BOOLEAN NOT NULL,
                retry_count INTEGER NOT NULL,
                max_retries INTEGER NOT NULL,
                template_order INTEGER NOT NULL,
                estimated_duration_secs BIGINT NOT NULL,
                started_at TIMESTAMPTZ,
                finished_at TIMESTAMPTZ,
                result JSONB,
                error TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS maestro_context (
                execution_id UUID NOT NULL,
                tag TEXT NOT NULL,
                value JSONB NOT NULL,
                PRIMARY KEY (execution_id, tag)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS maestro_deliverables (
                id UUID PRIMARY KEY,
                execution_id UUID NOT NULL,
                step_id UUID NOT NULL UNIQUE,
                kind TEXT NOT NULL,
                location TEXT NOT NULL,
                preview TEXT,
                status TEXT NOT NULL,
                metadata JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS maestro_events (
                id UUID PRIMARY KEY,
                execution_id UUID NOT NULL,
                event_type TEXT NOT NULL,
                payload JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("🗄️  Postgres state store schema ready");
        Ok(())
    }
}

fn row_to_execution(row: &PgRow) -> Result<Execution, StoreError> {
    let status: String = row.try_get("status")?;
    Ok(Execution {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        tenant_id: row.try_get("tenant_id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        content_type: row.try_get("content_type")?,
        template_id: row.try_get("template_id")?,
        brand_context: row.try_get("brand_context")?,
        status: status.parse::<ExecutionState>().map_err(StoreError::Backend)?,
        priority: row.try_get::<i16, _>("priority")? as u8,
        estimated_completion: row.try_get("estimated_completion")?,
        rework_count: row.try_get::<i32, _>("rework_count")? as u32,
        error: row.try_get("error")?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

fn row_to_step(row: &PgRow) -> Result<Step, StoreError> {
    let status: String = row.try_get("status")?;
    let requires: Value = row.try_get("requires")?;
    Ok(Step {
        id: row.try_get("id")?,
        execution_id: row.try_get("execution_id")?,
        step_type: row.try_get("step_type")?,
        status: status.parse::<StepState>().map_err(StoreError::Backend)?,
        progress: row.try_get::<i16, _>("progress")? as u8,
        requires: serde_json::from_value(requires)?,
        produces: row.try_get("produces")?,
        skippable: row.try_get("skippable")?,
        retry_count: row.try_get::<i32, _>("retry_count")? as u32,
        max_retries: row.try_get::<i32, _>("max_retries")? as u32,
        template_order: row.try_get::<i32, _>("template_order")? as u32,
        estimated_duration_secs: row.try_get::<i64, _>("estimated_duration_secs")? as u64,
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get("finished_at")?,
        result: row.try_get("result")?,
        error: row.try_get("error")?,
    })
}

fn row_to_deliverable(row: &PgRow) -> Result<Deliverable, StoreError> {
    let status: String = row.try_get("status")?;
    Ok(Deliverable {
        id: row.try_get("id")?,
        execution_id: row.try_get("execution_id")?,
        step_id: row.try_get("step_id")?,
        kind: row.try_get("kind")?,
        location: row.try_get("location")?,
        preview: row.try_get("preview")?,
        status: status.parse().map_err(StoreError::Backend)?,
        metadata: row.try_get("metadata")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_event(row: &PgRow) -> Result<EventRecord, StoreError> {
    Ok(EventRecord {
        id: row.try_get("id")?,
        execution_id: row.try_get("execution_id")?,
        event_type: row.try_get("event_type")?,
        payload: row.try_get("payload")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait::async_trait]
impl StateStore for PgStateStore {
    async fn insert_execution(&self, execution: &Execution) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO maestro_executions
                (id, user_id, tenant_id, title, content, content_type, template_id,
                 brand_context, status, priority, estimated_completion, rework_count,
                 error, created_at, started_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(execution.id)
        .bind(&execution.user_id)
        .bind(&execution.tenant_id)
        .bind(&execution.title)
        .bind(&execution.content)
        .bind(&execution.content_type)
        .bind(execution.template_id)
        .bind(&execution.brand_context)
        .bind(execution.status.to_string())
        .bind(execution.priority as i16)
        .bind(execution.estimated_completion)
        .bind(execution.rework_count as i32)
        .bind(&execution.error)
        .bind(execution.created_at)
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_execution(&self, execution: &Execution) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE maestro_executions SET
                status = $2, priority = $3, estimated_completion = $4,
                rework_count = $5, error = $6, started_at = $7, completed_at = $8
            WHERE id = $1
            "#,
        )
        .bind(execution.id)
        .bind(execution.status.to_string())
        .bind(execution.priority as i16)
        .bind(execution.estimated_completion)
        .bind(execution.rework_count as i32)
        .bind(&execution.error)
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "execution",
                id: execution.id,
            });
        }
        Ok(())
    }

    async fn get_execution(&self, id: Uuid) -> Result<Option<Execution>, StoreError> {
        let row = sqlx::query("SELECT * FROM maestro_executions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_execution).transpose()
    }

    async fn list_executions(
        &self,
        filter: &ExecutionFilter,
    ) -> Result<Vec<Execution>, StoreError> {
        let limit = filter.limit.map(|l| l as i64).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            r#"
            SELECT * FROM maestro_executions
            WHERE ($1::TEXT IS NULL OR user_id = $1)
              AND ($2::TEXT IS NULL OR tenant_id = $2)
              AND ($3::TEXT IS NULL OR status = $3)
            ORDER BY created_at ASC
            LIMIT $4
            "#,
        )
        .bind(&filter.user_id)
        .bind(&filter.tenant_id)
        .bind(filter.status.map(|status| status.to_string()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_execution).collect()
    }

    async fn active_executions(&self) -> Result<Vec<Execution>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM maestro_executions
            WHERE status NOT IN ('delivered', 'failed', 'cancelled')
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_execution).collect()
    }

    async fn insert_steps(&self, steps: &[Step]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for step in steps {
            sqlx::query(
                r#"
                INSERT INTO maestro_steps
                    (id, execution_id, step_type, status, progress, requires, produces,
                     skippable, retry_count, max_retries, template_order,
                     estimated_duration_secs, started_at, finished_at, result, error)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                "#,
            )
            .bind(step.id)
            .bind(step.execution_id)
            .bind(&step.step_type)
            .bind(step.status.to_string())
            .bind(step.progress as i16)
            .bind(serde_json::to_value(&step.requires)?)
            .bind(&step.produces)
            .bind(step.skippable)
            .bind(step.retry_count as i32)
            .bind(step.max_retries as i32)
            .bind(step.template_order as i32)
            .bind(step.estimated_duration_secs as i64)
            .bind(step.started_at)
            .bind(step.finished_at)
            .bind(&step.result)
            .bind(&step.error)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn update_step(&self, step: &Step) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE maestro_steps SET
                status = $2, progress = $3, retry_count = $4,
                started_at = $5, finished_at = $6, result = $7, error = $8
            WHERE id = $1
            "#,
        )
        .bind(step.id)
        .bind(step.status.to_string())
        .bind(step.progress as i16)
        .bind(step.retry_count as i32)
        .bind(step.started_at)
        .bind(step.finished_at)
        .bind(&step.result)
        .bind(&step.error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "step",
                id: step.id,
            });
        }
        Ok(())
    }

    async fn get_step(&self, id: Uuid) -> Result<Option<Step>, StoreError> {
        let row = sqlx::query("SELECT * FROM maestro_steps WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_step).transpose()
    }

    async fn steps_for_execution(&self, execution_id: Uuid) -> Result<Vec<Step>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM maestro_steps WHERE execution_id = $1 ORDER BY template_order ASC",
        )
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_step).collect()
    }

    async fn running_steps(&self) -> Result<Vec<Step>, StoreError> {
        let rows = sqlx::query("SELECT * FROM maestro_steps WHERE status = 'running'")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_step).collect()
    }

    async fn append_context(
        &self,
        execution_id: Uuid,
        tag: &str,
        value: &Value,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO maestro_context (execution_id, tag, value)
            VALUES ($1, $2, $3)
            ON CONFLICT (execution_id, tag) DO NOTHING
            "#,
        )
        .bind(execution_id)
        .bind(tag)
        .bind(value)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "context tag '{tag}' already written for execution {execution_id}"
            )));
        }
        Ok(())
    }

    async fn load_context(
        &self,
        execution_id: Uuid,
    ) -> Result<HashMap<String, Value>, StoreError> {
        let rows = sqlx::query("SELECT tag, value FROM maestro_context WHERE execution_id = $1")
            .bind(execution_id)
            .fetch_all(&self.pool)
            .await?;

        let mut context = HashMap::with_capacity(rows.len());
        for row in &rows {
            let tag: String = row.try_get("tag")?;
            let value: Value = row.try_get("value")?;
            context.insert(tag, value);
        }
        Ok(context)
    }

    async fn clear_context(&self, execution_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM maestro_context WHERE execution_id = $1")
            .bind(execution_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_deliverable(&self, deliverable: &Deliverable) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO maestro_deliverables
                (id, execution_id, step_id, kind, location, preview, status, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (step_id) DO NOTHING
            "#,
        )
        .bind(deliverable.id)
        .bind(deliverable.execution_id)
        .bind(deliverable.step_id)
        .bind(&deliverable.kind)
        .bind(&deliverable.location)
        .bind(&deliverable.preview)
        .bind(deliverable.status.to_string())
        .bind(&deliverable.metadata)
        .bind(deliverable.created_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "step {} already has a deliverable",
                deliverable.step_id
            )));
        }
        Ok(())
    }

    async fn deliverables_for_execution(
        &self,
        execution_id: Uuid,
    ) -> Result<Vec<Deliverable>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM maestro_deliverables WHERE execution_id = $1 ORDER BY created_at ASC",
        )
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_deliverable).collect()
    }

    async fn deliverable_for_step(
        &self,
        step_id: Uuid,
    ) -> Result<Option<Deliverable>, StoreError> {
        let row = sqlx::query("SELECT * FROM maestro_deliverables WHERE step_id = $1")
            .bind(step_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_deliverable).transpose()
    }

    async fn append_event(&self, event: &EventRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO maestro_events (id, execution_id, event_type, payload, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(event.id)
        .bind(event.execution_id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn events_for_execution(
        &self,
        execution_id: Uuid,
    ) -> Result<Vec<EventRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM maestro_events WHERE execution_id = $1 ORDER BY created_at ASC",
        )
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_event).collect()
    }
}
