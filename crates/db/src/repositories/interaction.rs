//! Interaction repository.

use std::sync::Arc;

use crate::entities::{
    Interaction,
    interaction::{self, InteractionKind, SubjectType},
};
use chrono::{DateTime, Utc};
use quill_common::{AppError, AppResult};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QuerySelect, TransactionTrait, sea_query::OnConflict,
};

use super::write_err;

/// Interaction repository for database operations.
#[derive(Clone)]
pub struct InteractionRepository {
    db: Arc<DatabaseConnection>,
}

impl InteractionRepository {
    /// Create a new interaction repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Start a transaction on the underlying pool.
    pub async fn begin(&self) -> AppResult<DatabaseTransaction> {
        self.db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find the record for a (subject, actor, kind) triple.
    pub async fn find(
        &self,
        subject_id: &str,
        actor_id: &str,
        kind: InteractionKind,
    ) -> AppResult<Option<interaction::Model>> {
        Interaction::find()
            .filter(interaction::Column::SubjectId.eq(subject_id))
            .filter(interaction::Column::ActorId.eq(actor_id))
            .filter(interaction::Column::Kind.eq(kind))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find the record for a triple, locking the row until the transaction ends.
    pub async fn find_for_update_in<C: ConnectionTrait>(
        conn: &C,
        subject_id: &str,
        actor_id: &str,
        kind: InteractionKind,
    ) -> AppResult<Option<interaction::Model>> {
        Interaction::find()
            .filter(interaction::Column::SubjectId.eq(subject_id))
            .filter(interaction::Column::ActorId.eq(actor_id))
            .filter(interaction::Column::Kind.eq(kind))
            .lock_exclusive()
            .one(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Insert a record unless one already exists for its triple.
    ///
    /// Returns `false` when a concurrent writer got there first.
    pub async fn insert_if_absent_in<C: ConnectionTrait>(
        conn: &C,
        model: interaction::ActiveModel,
    ) -> AppResult<bool> {
        let inserted = Interaction::insert(model)
            .on_conflict(
                OnConflict::columns([
                    interaction::Column::SubjectId,
                    interaction::Column::ActorId,
                    interaction::Column::Kind,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(conn)
            .await
            .map_err(write_err)?;
        Ok(inserted > 0)
    }

    /// Set `is_active` on a record. Returns the number of rows changed.
    pub async fn set_active_in<C: ConnectionTrait>(
        conn: &C,
        id: &str,
        is_active: bool,
    ) -> AppResult<u64> {
        let now: DateTime<Utc> = Utc::now();
        let result = Interaction::update_many()
            .col_expr(interaction::Column::IsActive, is_active.into())
            .col_expr(interaction::Column::UpdatedAt, now.fixed_offset().into())
            .filter(interaction::Column::Id.eq(id))
            .exec(conn)
            .await
            .map_err(write_err)?;
        Ok(result.rows_affected)
    }

    /// Count active records of a kind on a subject.
    pub async fn count_active_in<C: ConnectionTrait>(
        conn: &C,
        subject_id: &str,
        kind: InteractionKind,
    ) -> AppResult<u64> {
        Interaction::find()
            .filter(interaction::Column::SubjectId.eq(subject_id))
            .filter(interaction::Column::Kind.eq(kind))
            .filter(interaction::Column::IsActive.eq(true))
            .count(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count active records of a kind on a subject.
    pub async fn count_active(&self, subject_id: &str, kind: InteractionKind) -> AppResult<u64> {
        Self::count_active_in(self.db.as_ref(), subject_id, kind).await
    }

    /// Count every record (active or not) for a triple. Used to check uniqueness.
    pub async fn count_records(
        &self,
        subject_id: &str,
        actor_id: &str,
        kind: InteractionKind,
    ) -> AppResult<u64> {
        Interaction::find()
            .filter(interaction::Column::SubjectId.eq(subject_id))
            .filter(interaction::Column::ActorId.eq(actor_id))
            .filter(interaction::Column::Kind.eq(kind))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count an actor's active records of a kind on one subject type.
    pub async fn count_active_by_actor(
        &self,
        actor_id: &str,
        subject_type: SubjectType,
        kind: InteractionKind,
    ) -> AppResult<u64> {
        Interaction::find()
            .filter(interaction::Column::ActorId.eq(actor_id))
            .filter(interaction::Column::SubjectType.eq(subject_type))
            .filter(interaction::Column::Kind.eq(kind))
            .filter(interaction::Column::IsActive.eq(true))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Of the given subjects, return those the actor has an active record on.
    pub async fn find_active_subject_ids(
        &self,
        actor_id: &str,
        subject_ids: &[String],
        kind: InteractionKind,
    ) -> AppResult<Vec<String>> {
        if subject_ids.is_empty() {
            return Ok(Vec::new());
        }

        Interaction::find()
            .select_only()
            .column(interaction::Column::SubjectId)
            .filter(interaction::Column::ActorId.eq(actor_id))
            .filter(interaction::Column::SubjectId.is_in(subject_ids.iter().cloned()))
            .filter(interaction::Column::Kind.eq(kind))
            .filter(interaction::Column::IsActive.eq(true))
            .into_tuple::<String>()
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count records on a subject that are active and were last activated in `[start, end]`.
    pub async fn count_activated_between(
        &self,
        subject_id: &str,
        kind: InteractionKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<u64> {
        Interaction::find()
            .filter(interaction::Column::SubjectId.eq(subject_id))
            .filter(interaction::Column::Kind.eq(kind))
            .filter(interaction::Column::IsActive.eq(true))
            .filter(interaction::Column::UpdatedAt.gte(start.fixed_offset()))
            .filter(interaction::Column::UpdatedAt.lte(end.fixed_offset()))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Activation times of active records on a subject since `since`.
    pub async fn activation_times_since(
        &self,
        subject_id: &str,
        kind: InteractionKind,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<DateTime<Utc>>> {
        let rows = Interaction::find()
            .select_only()
            .column(interaction::Column::UpdatedAt)
            .filter(interaction::Column::SubjectId.eq(subject_id))
            .filter(interaction::Column::Kind.eq(kind))
            .filter(interaction::Column::IsActive.eq(true))
            .filter(interaction::Column::UpdatedAt.gte(since.fixed_offset()))
            .into_tuple::<chrono::DateTime<chrono::FixedOffset>>()
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(rows.into_iter().map(|t| t.with_timezone(&Utc)).collect())
    }

    /// Delete every record pointing at the given subjects.
    pub async fn delete_by_subjects_in<C: ConnectionTrait>(
        conn: &C,
        subject_type: SubjectType,
        subject_ids: &[String],
    ) -> AppResult<u64> {
        if subject_ids.is_empty() {
            return Ok(0);
        }

        let result = Interaction::delete_many()
            .filter(interaction::Column::SubjectType.eq(subject_type))
            .filter(interaction::Column::SubjectId.is_in(subject_ids.iter().cloned()))
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected)
    }
}
