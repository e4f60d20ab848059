use crate::models::{Action, Actor, NewAction, Role, UpdateActionRequest};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{FromRow, PgPool};
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// ActionRepository
///
/// Abstract contract for persistence used by the auth extractor and the action
/// handlers. `patient_scope` is `Some(patient_id)` when the caller is a patient:
/// implementations must then only see or touch actions of that patient.
///
/// **Send + Sync + async_trait** make `Arc<dyn ActionRepository>` shareable across
/// Axum's task boundaries.
#[async_trait]
pub trait ActionRepository: Send + Sync {
    // --- Actors ---
    async fn get_actor(&self, id: &str) -> RepositoryResult<Option<Actor>>;

    // --- Action Retrieval ---
    // Newest `performed_at` first.
    async fn list_actions(&self, patient_scope: Option<&str>) -> RepositoryResult<Vec<Action>>;
    async fn list_actions_for_patient(&self, patient_id: &str) -> RepositoryResult<Vec<Action>>;
    async fn get_action(
        &self,
        id: &str,
        patient_scope: Option<&str>,
    ) -> RepositoryResult<Option<Action>>;

    // --- Action Mutation ---
    async fn create_action(&self, action: NewAction) -> RepositoryResult<Action>;
    // Partial update; `None` when the action is missing or outside the scope.
    async fn update_action(
        &self,
        id: &str,
        patient_scope: Option<&str>,
        changes: UpdateActionRequest,
    ) -> RepositoryResult<Option<Action>>;
    // Returns true if a row was removed.
    async fn delete_action(&self, id: &str, patient_scope: Option<&str>)
    -> RepositoryResult<bool>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn ActionRepository>;

const ACTION_COLUMNS: &str = "id, patient_id, performed_by, kind, description, performed_at, created_by, created_at, updated_at";

/// PostgresRepository
///
/// The `ActionRepository` backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

#[derive(FromRow)]
struct ActorRow {
    id: String,
    name: String,
    role: String,
}

impl TryFrom<ActorRow> for Actor {
    type Error = RepositoryError;

    fn try_from(row: ActorRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|e| RepositoryError::Corrupt(format!("actor {}: {}", row.id, e)))?;
        Ok(Actor {
            id: row.id,
            name: row.name,
            role,
        })
    }
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// ensure_schema
    ///
    /// Creates the `actors` and `actions` tables when they are missing. Used at
    /// startup in local environments; production schemas are provisioned out of band.
    pub async fn ensure_schema(&self) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS actors (
                id   TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                role TEXT NOT NULL CHECK (role IN ('patient', 'doctor', 'receptionist'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS actions (
                id           TEXT PRIMARY KEY,
                patient_id   TEXT NOT NULL,
                performed_by TEXT,
                kind         TEXT NOT NULL,
                description  TEXT NOT NULL DEFAULT '',
                performed_at TIMESTAMPTZ NOT NULL,
                created_by   TEXT NOT NULL,
                created_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at   TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS actions_patient_id_idx ON actions (patient_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl ActionRepository for PostgresRepository {
    async fn get_actor(&self, id: &str) -> RepositoryResult<Option<Actor>> {
        let row = sqlx::query_as::<_, ActorRow>("SELECT id, name, role FROM actors WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Actor::try_from).transpose()
    }

    /// list_actions
    ///
    /// `$1 IS NULL` disables the patient filter for doctors and receptionists.
    async fn list_actions(&self, patient_scope: Option<&str>) -> RepositoryResult<Vec<Action>> {
        let sql = format!(
            "SELECT {ACTION_COLUMNS} FROM actions \
             WHERE ($1::text IS NULL OR patient_id = $1) \
             ORDER BY performed_at DESC"
        );
        let actions = sqlx::query_as::<_, Action>(&sql)
            .bind(patient_scope)
            .fetch_all(&self.pool)
            .await?;
        Ok(actions)
    }

    async fn list_actions_for_patient(&self, patient_id: &str) -> RepositoryResult<Vec<Action>> {
        let sql = format!(
            "SELECT {ACTION_COLUMNS} FROM actions WHERE patient_id = $1 ORDER BY performed_at DESC"
        );
        let actions = sqlx::query_as::<_, Action>(&sql)
            .bind(patient_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(actions)
    }

    async fn get_action(
        &self,
        id: &str,
        patient_scope: Option<&str>,
    ) -> RepositoryResult<Option<Action>> {
        let sql = format!(
            "SELECT {ACTION_COLUMNS} FROM actions \
             WHERE id = $1 AND ($2::text IS NULL OR patient_id = $2)"
        );
        let action = sqlx::query_as::<_, Action>(&sql)
            .bind(id)
            .bind(patient_scope)
            .fetch_optional(&self.pool)
            .await?;
        Ok(action)
    }

    async fn create_action(&self, action: NewAction) -> RepositoryResult<Action> {
        let sql = format!(
            "INSERT INTO actions (id, patient_id, performed_by, kind, description, performed_at, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {ACTION_COLUMNS}"
        );
        let created = sqlx::query_as::<_, Action>(&sql)
            .bind(Uuid::new_v4().to_string())
            .bind(&action.patient_id)
            .bind(&action.performed_by)
            .bind(&action.kind)
            .bind(&action.description)
            .bind(action.performed_at)
            .bind(&action.created_by)
            .fetch_one(&self.pool)
            .await?;
        Ok(created)
    }

    /// update_action
    ///
    /// Uses COALESCE so absent fields keep their stored value.
    async fn update_action(
        &self,
        id: &str,
        patient_scope: Option<&str>,
        changes: UpdateActionRequest,
    ) -> RepositoryResult<Option<Action>> {
        let sql = format!(
            "UPDATE actions SET \
                kind = COALESCE($3, kind), \
                description = COALESCE($4, description), \
                performed_at = COALESCE($5, performed_at), \
                performed_by = COALESCE($6, performed_by), \
                updated_at = now() \
             WHERE id = $1 AND ($2::text IS NULL OR patient_id = $2) \
             RETURNING {ACTION_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Action>(&sql)
            .bind(id)
            .bind(patient_scope)
            .bind(changes.kind)
            .bind(changes.description)
            .bind(changes.performed_at)
            .bind(changes.performed_by)
            .fetch_optional(&self.pool)
            .await?;
        Ok(updated)
    }

    async fn delete_action(
        &self,
        id: &str,
        patient_scope: Option<&str>,
    ) -> RepositoryResult<bool> {
        let result =
            sqlx::query("DELETE FROM actions WHERE id = $1 AND ($2::text IS NULL OR patient_id = $2)")
                .bind(id)
                .bind(patient_scope)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// InMemoryRepository
///
/// An `ActionRepository` held entirely in process memory. Backs local development when
/// no `DATABASE_URL` is configured, and the integration tests.
#[derive(Default)]
pub struct InMemoryRepository {
    actors: RwLock<HashMap<String, Actor>>,
    actions: RwLock<HashMap<String, Action>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_actors(actors: impl IntoIterator<Item = Actor>) -> Self {
        let actors = actors
            .into_iter()
            .map(|actor| (actor.id.clone(), actor))
            .collect();
        Self {
            actors: RwLock::new(actors),
            actions: RwLock::default(),
        }
    }

    pub async fn insert_actor(&self, actor: Actor) {
        self.actors.write().await.insert(actor.id.clone(), actor);
    }
}

fn in_scope(action: &Action, patient_scope: Option<&str>) -> bool {
    patient_scope.is_none_or(|patient_id| action.patient_id == patient_id)
}

fn newest_first(mut actions: Vec<Action>) -> Vec<Action> {
    actions.sort_by(|a, b| b.performed_at.cmp(&a.performed_at));
    actions
}

#[async_trait]
impl ActionRepository for InMemoryRepository {
    async fn get_actor(&self, id: &str) -> RepositoryResult<Option<Actor>> {
        Ok(self.actors.read().await.get(id).cloned())
    }

    async fn list_actions(&self, patient_scope: Option<&str>) -> RepositoryResult<Vec<Action>> {
        let actions = self.actions.read().await;
        Ok(newest_first(
            actions
                .values()
                .filter(|action| in_scope(action, patient_scope))
                .cloned()
                .collect(),
        ))
    }

    async fn list_actions_for_patient(&self, patient_id: &str) -> RepositoryResult<Vec<Action>> {
        self.list_actions(Some(patient_id)).await
    }

    async fn get_action(
        &self,
        id: &str,
        patient_scope: Option<&str>,
    ) -> RepositoryResult<Option<Action>> {
        let actions = self.actions.read().await;
        Ok(actions
            .get(id)
            .filter(|action| in_scope(action, patient_scope))
            .cloned())
    }

    async fn create_action(&self, action: NewAction) -> RepositoryResult<Action> {
        let now = Utc::now();
        let created = Action {
            id: Uuid::new_v4().to_string(),
            patient_id: action.patient_id,
            performed_by: action.performed_by,
            kind: action.kind,
            description: action.description,
            performed_at: action.performed_at,
            created_by: action.created_by,
            created_at: now,
            updated_at: now,
        };
        self.actions
            .write()
            .await
            .insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn update_action(
        &self,
        id: &str,
        patient_scope: Option<&str>,
        changes: UpdateActionRequest,
    ) -> RepositoryResult<Option<Action>> {
        let mut actions = self.actions.write().await;
        let Some(action) = actions
            .get_mut(id)
            .filter(|action| in_scope(action, patient_scope))
        else {
            return Ok(None);
        };

        if let Some(kind) = changes.kind {
            action.kind = kind;
        }
        if let Some(description) = changes.description {
            action.description = description;
        }
        if let Some(performed_at) = changes.performed_at {
            action.performed_at = performed_at;
        }
        if let Some(performed_by) = changes.performed_by {
            action.performed_by = Some(performed_by);
        }
        action.updated_at = Utc::now();

        Ok(Some(action.clone()))
    }

    async fn delete_action(
        &self,
        id: &str,
        patient_scope: Option<&str>,
    ) -> RepositoryResult<bool> {
        let mut actions = self.actions.write().await;
        let owned = actions
            .get(id)
            .is_some_and(|action| in_scope(action, patient_scope));
        if owned {
            actions.remove(id);
        }
        Ok(owned)
    }
}
