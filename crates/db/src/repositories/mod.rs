//! Repositories for database access.
//!
//! Methods named `*_in` take any [`sea_orm::ConnectionTrait`] so services can
//! run them inside a transaction. The rest run on the pooled connection.

mod comment;
mod following;
mod interaction;
mod notification;
mod notification_preference;
mod post;
mod post_view;
mod user;
mod user_activity;

pub use comment::CommentRepository;
pub use following::FollowingRepository;
pub use interaction::InteractionRepository;
pub use notification::NotificationRepository;
pub use notification_preference::NotificationPreferenceRepository;
pub use post::{PostCounters, PostRepository};
pub use post_view::PostViewRepository;
pub use user::UserRepository;
pub use user_activity::{ActionCount, UserActivityRepository};

use quill_common::AppError;
use sea_orm::{ColumnTrait, DbErr, IdenStatic, SqlErr, sea_query::Expr, sea_query::SimpleExpr};

/// Map a write error, turning unique violations into a retryable conflict.
pub(crate) fn write_err(err: DbErr) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(msg)) => AppError::Conflict(msg),
        _ => AppError::Database(err.to_string()),
    }
}

/// `column + 1`, or `column - 1` floored at zero.
///
/// Written as a `CASE` so the same statement runs on `PostgreSQL` and `SQLite`.
pub(crate) fn step_counter<C: ColumnTrait>(column: C, up: bool) -> SimpleExpr {
    if up {
        Expr::col(column).add(1)
    } else {
        let name = column.as_str();
        Expr::cust(format!("CASE WHEN {name} > 0 THEN {name} - 1 ELSE 0 END"))
    }
}
