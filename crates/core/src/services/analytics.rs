//! Read-side rollups over the interaction store.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use quill_common::{AppError, AppResult};
use quill_db::{
    entities::interaction::InteractionKind,
    repositories::{
        ActionCount, InteractionRepository, PostRepository, PostViewRepository,
        UserActivityRepository, UserRepository,
    },
};
use serde::Serialize;
use tracing::info;

/// Longest range any rollup covers.
pub const MAX_RANGE_DAYS: i64 = 365;

/// Range used when the caller gives no start.
pub const DEFAULT_RANGE_DAYS: i64 = 30;

/// Cleanup refuses to touch anything younger than this.
pub const MIN_CLEANUP_AGE_DAYS: i64 = 30;

/// Totals for one post over a time range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostAnalytics {
    pub post_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub views: u64,
    pub likes: u64,
    pub bookmarks: u64,
    pub shares: u64,
}

/// Count for one UTC calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: u64,
}

/// Per-day series for one post, oldest day first, zero-filled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAnalytics {
    pub post_id: String,
    pub days: i64,
    pub views: Vec<DailyCount>,
    pub likes: Vec<DailyCount>,
    pub bookmarks: Vec<DailyCount>,
}

/// Audit actions of one user over a time range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySummary {
    pub user_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub total: i64,
    pub actions: Vec<ActionCount>,
}

/// Resolve an optional range, rejecting inverted ranges and capping the span.
fn resolve_range(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> AppResult<(DateTime<Utc>, DateTime<Utc>)> {
    let end = end.unwrap_or_else(Utc::now);
    let start = match start {
        Some(start) => start,
        None => days_before(end, DEFAULT_RANGE_DAYS)?,
    };
    if start > end {
        return Err(AppError::Validation(
            "start must not be after end".to_string(),
        ));
    }
    let earliest = days_before(end, MAX_RANGE_DAYS)?;
    Ok((start.max(earliest), end))
}

/// `at` minus `days` days, or a validation error when that leaves chrono's range.
fn days_before(at: DateTime<Utc>, days: i64) -> AppResult<DateTime<Utc>> {
    Duration::try_days(days)
        .and_then(|span| at.checked_sub_signed(span))
        .ok_or_else(|| AppError::Validation(format!("date out of range: {at}")))
}

fn bucket(first: NaiveDate, days: i64, times: &[DateTime<Utc>]) -> Vec<DailyCount> {
    let mut counts = vec![0u64; days as usize];
    for t in times {
        let offset = (t.date_naive() - first).num_days();
        if (0..days).contains(&offset) {
            counts[offset as usize] += 1;
        }
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| DailyCount {
            date: first + Duration::days(i as i64),
            count,
        })
        .collect()
}

/// Analytics service.
#[derive(Clone)]
pub struct AnalyticsService {
    post_repo: PostRepository,
    post_view_repo: PostViewRepository,
    interaction_repo: InteractionRepository,
    user_activity_repo: UserActivityRepository,
    user_repo: UserRepository,
}

impl AnalyticsService {
    /// Create a new analytics service.
    #[must_use]
    pub const fn new(
        post_repo: PostRepository,
        post_view_repo: PostViewRepository,
        interaction_repo: InteractionRepository,
        user_activity_repo: UserActivityRepository,
        user_repo: UserRepository,
    ) -> Self {
        Self {
            post_repo,
            post_view_repo,
            interaction_repo,
            user_activity_repo,
            user_repo,
        }
    }

    /// Views and activations of a post in `[start, end]`.
    ///
    /// Likes, bookmarks and shares count records that are active now and
    /// were last activated inside the range.
    pub async fn post_analytics(
        &self,
        post_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> AppResult<PostAnalytics> {
        let (start, end) = resolve_range(start, end)?;
        self.post_repo.get_by_id(post_id).await?;

        let views = self.post_view_repo.count_between(post_id, start, end).await?;
        let likes = self
            .interaction_repo
            .count_activated_between(post_id, InteractionKind::Like, start, end)
            .await?;
        let bookmarks = self
            .interaction_repo
            .count_activated_between(post_id, InteractionKind::Bookmark, start, end)
            .await?;
        let shares = self
            .interaction_repo
            .count_activated_between(post_id, InteractionKind::Share, start, end)
            .await?;

        Ok(PostAnalytics {
            post_id: post_id.to_string(),
            start,
            end,
            views,
            likes,
            bookmarks,
            shares,
        })
    }

    /// Per-day counts for the last `days` UTC days, today included.
    ///
    /// `days` is clamped to `[1, 365]`.
    pub async fn daily_analytics(&self, post_id: &str, days: i64) -> AppResult<DailyAnalytics> {
        let days = days.clamp(1, MAX_RANGE_DAYS);
        self.post_repo.get_by_id(post_id).await?;

        let today = Utc::now().date_naive();
        let first = today - Duration::days(days - 1);
        let since = first.and_time(chrono::NaiveTime::MIN).and_utc();

        let views = self.post_view_repo.times_since(post_id, since).await?;
        let likes = self
            .interaction_repo
            .activation_times_since(post_id, InteractionKind::Like, since)
            .await?;
        let bookmarks = self
            .interaction_repo
            .activation_times_since(post_id, InteractionKind::Bookmark, since)
            .await?;

        Ok(DailyAnalytics {
            post_id: post_id.to_string(),
            days,
            views: bucket(first, days, &views),
            likes: bucket(first, days, &likes),
            bookmarks: bucket(first, days, &bookmarks),
        })
    }

    /// Whether `actor_id` currently likes each subject.
    pub async fn like_status(
        &self,
        actor_id: &str,
        subject_ids: &[String],
    ) -> AppResult<HashMap<String, bool>> {
        self.status(actor_id, subject_ids, InteractionKind::Like).await
    }

    /// Whether `actor_id` currently bookmarks each subject.
    pub async fn bookmark_status(
        &self,
        actor_id: &str,
        subject_ids: &[String],
    ) -> AppResult<HashMap<String, bool>> {
        self.status(actor_id, subject_ids, InteractionKind::Bookmark)
            .await
    }

    async fn status(
        &self,
        actor_id: &str,
        subject_ids: &[String],
        kind: InteractionKind,
    ) -> AppResult<HashMap<String, bool>> {
        let active: HashSet<String> = self
            .interaction_repo
            .find_active_subject_ids(actor_id, subject_ids, kind)
            .await?
            .into_iter()
            .collect();

        Ok(subject_ids
            .iter()
            .map(|id| (id.clone(), active.contains(id)))
            .collect())
    }

    /// Audit actions of a user in `[start, end]`, grouped by action.
    pub async fn user_activity_summary(
        &self,
        user_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> AppResult<ActivitySummary> {
        let (start, end) = resolve_range(start, end)?;
        self.user_repo.get_by_id(user_id).await?;

        let actions = self
            .user_activity_repo
            .count_by_action(user_id, start, end)
            .await?;
        let total = actions.iter().map(|a| a.count).sum();

        Ok(ActivitySummary {
            user_id: user_id.to_string(),
            start,
            end,
            total,
            actions,
        })
    }

    /// Delete views older than `days_old` days.
    pub async fn cleanup_old_views(&self, days_old: i64) -> AppResult<u64> {
        let cutoff = Self::cleanup_cutoff(days_old)?;
        let deleted = self.post_view_repo.delete_older_than(cutoff).await?;
        info!(deleted, days_old, "Cleaned up old post views");
        Ok(deleted)
    }

    /// Delete audit records older than `days_old` days.
    pub async fn cleanup_old_activity(&self, days_old: i64) -> AppResult<u64> {
        let cutoff = Self::cleanup_cutoff(days_old)?;
        let deleted = self.user_activity_repo.delete_older_than(cutoff).await?;
        info!(deleted, days_old, "Cleaned up old user activity");
        Ok(deleted)
    }

    fn cleanup_cutoff(days_old: i64) -> AppResult<DateTime<Utc>> {
        if days_old < MIN_CLEANUP_AGE_DAYS {
            return Err(AppError::Validation(format!(
                "daysOld must be at least {MIN_CLEANUP_AGE_DAYS}"
            )));
        }
        days_before(Utc::now(), days_old)
    }
}
