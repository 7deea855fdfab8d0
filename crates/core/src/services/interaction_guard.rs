//! Interaction guard.
//!
//! Rejects duplicate or excessive toggle requests and repeated views before
//! they reach the database. The guard is advisory: a rejected request never
//! mutates anything, and an unavailable shared backend lets requests through.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fred::clients::Client as RedisClient;
use fred::interfaces::KeysInterface;
use fred::types::{Expiration, SetOptions};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Minimum spacing between accepted toggles of the same (actor, subject) pair.
pub const TOGGLE_COOLDOWN: Duration = Duration::from_secs(1);

/// Accepted toggles per (actor, subject) pair in one minute bucket.
pub const TOGGLES_PER_MINUTE: u32 = 10;

/// Minimum spacing between recorded views of a subject by the same viewer.
pub const VIEW_COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// Recorded anonymous views per IP address in one hour bucket.
pub const ANONYMOUS_VIEWS_PER_HOUR: u32 = 100;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * 60;

/// Entry count past which the in-memory guard prunes inline.
const PRUNE_THRESHOLD: usize = 10_000;

/// Who is viewing a subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Viewer {
    /// A signed-in user.
    User(String),
    /// An anonymous client, identified by IP address.
    Anonymous(String),
}

impl Viewer {
    fn key(&self) -> String {
        match self {
            Self::User(id) => format!("u:{id}"),
            Self::Anonymous(ip) => format!("ip:{ip}"),
        }
    }
}

/// Admission control for toggles and views.
#[async_trait]
pub trait InteractionGuard: Send + Sync {
    /// Whether a toggle by `actor_id` on `subject_id` should be processed.
    /// Accepting records the request.
    async fn should_accept(&self, actor_id: &str, subject_id: &str) -> bool;

    /// Whether a view of `subject_id` should be recorded.
    /// Accepting records the view.
    async fn should_record_view(&self, subject_id: &str, viewer: &Viewer) -> bool;

    /// Drop expired entries. Returns how many were removed.
    async fn sweep(&self) -> usize;
}

/// Shared interaction guard handle.
pub type InteractionGuardService = Arc<dyn InteractionGuard>;

#[derive(Default)]
struct GuardState {
    last_toggle: HashMap<(String, String), Instant>,
    toggle_buckets: HashMap<(String, String, u64), u32>,
    last_view: HashMap<(String, Viewer), Instant>,
    ip_view_buckets: HashMap<(String, u64), u32>,
}

impl GuardState {
    fn len(&self) -> usize {
        self.last_toggle.len()
            + self.toggle_buckets.len()
            + self.last_view.len()
            + self.ip_view_buckets.len()
    }

    fn prune(&mut self, now: Instant, minute: u64, hour: u64) -> usize {
        let before = self.len();
        self.last_toggle
            .retain(|_, at| now.duration_since(*at) < TOGGLE_COOLDOWN);
        self.toggle_buckets.retain(|(_, _, bucket), _| *bucket >= minute);
        self.last_view
            .retain(|_, at| now.duration_since(*at) < VIEW_COOLDOWN);
        self.ip_view_buckets.retain(|(_, bucket), _| *bucket >= hour);
        before - self.len()
    }
}

/// Process-local guard. Correct for a single server instance.
pub struct InMemoryInteractionGuard {
    epoch: Instant,
    state: Mutex<GuardState>,
}

impl InMemoryInteractionGuard {
    /// Create an empty guard.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            state: Mutex::new(GuardState::default()),
        }
    }

    fn bucket(&self, now: Instant, width_secs: u64) -> u64 {
        now.duration_since(self.epoch).as_secs() / width_secs
    }

    /// Number of tracked entries across all maps.
    pub async fn len(&self) -> usize {
        self.state.lock().await.len()
    }

    /// Whether nothing is tracked.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryInteractionGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InteractionGuard for InMemoryInteractionGuard {
    async fn should_accept(&self, actor_id: &str, subject_id: &str) -> bool {
        let now = Instant::now();
        let minute = self.bucket(now, MINUTE);
        let pair = (actor_id.to_string(), subject_id.to_string());
        let mut state = self.state.lock().await;

        if state.len() > PRUNE_THRESHOLD {
            let hour = self.bucket(now, HOUR);
            state.prune(now, minute, hour);
        }

        let cooling = state
            .last_toggle
            .get(&pair)
            .is_some_and(|at| now.duration_since(*at) < TOGGLE_COOLDOWN);
        if cooling {
            debug!(actor_id = %actor_id, subject_id = %subject_id, "Toggle inside cooldown");
            return false;
        }

        let bucket_key = (pair.0.clone(), pair.1.clone(), minute);
        let accepted = state.toggle_buckets.get(&bucket_key).copied().unwrap_or(0);
        if accepted >= TOGGLES_PER_MINUTE {
            debug!(
                actor_id = %actor_id,
                subject_id = %subject_id,
                accepted = accepted,
                "Toggle over per-minute limit"
            );
            return false;
        }

        state.last_toggle.insert(pair, now);
        *state.toggle_buckets.entry(bucket_key).or_insert(0) += 1;
        true
    }

    async fn should_record_view(&self, subject_id: &str, viewer: &Viewer) -> bool {
        let now = Instant::now();
        let hour = self.bucket(now, HOUR);
        let key = (subject_id.to_string(), viewer.clone());
        let mut state = self.state.lock().await;

        let cooling = state
            .last_view
            .get(&key)
            .is_some_and(|at| now.duration_since(*at) < VIEW_COOLDOWN);
        if cooling {
            return false;
        }

        if let Viewer::Anonymous(ip) = viewer {
            let bucket_key = (ip.clone(), hour);
            let recorded = state.ip_view_buckets.get(&bucket_key).copied().unwrap_or(0);
            if recorded >= ANONYMOUS_VIEWS_PER_HOUR {
                debug!(ip = %ip, "Anonymous view cap reached");
                return false;
            }
            *state.ip_view_buckets.entry(bucket_key).or_insert(0) += 1;
        }

        state.last_view.insert(key, now);
        true
    }

    async fn sweep(&self) -> usize {
        let now = Instant::now();
        let minute = self.bucket(now, MINUTE);
        let hour = self.bucket(now, HOUR);
        self.state.lock().await.prune(now, minute, hour)
    }
}

/// Guard backed by Redis TTL keys. Shared by every server instance.
pub struct RedisInteractionGuard {
    redis: Arc<RedisClient>,
    prefix: String,
}

impl RedisInteractionGuard {
    /// Create a guard using the given client and key prefix.
    #[must_use]
    pub const fn new(redis: Arc<RedisClient>, prefix: String) -> Self {
        Self { redis, prefix }
    }

    /// `SET key 1 NX` with a TTL. `Ok(true)` when the key was newly set.
    async fn claim(&self, key: String, ttl: Expiration) -> Result<bool, fred::error::Error> {
        let result: Option<String> = self
            .redis
            .set(key, "1", Some(ttl), Some(SetOptions::NX), false)
            .await?;
        Ok(result.is_some())
    }

    /// `INCR key`, setting the TTL on first increment.
    async fn bump(&self, key: String, ttl_secs: i64) -> Result<u64, fred::error::Error> {
        let count: u64 = self.redis.incr(key.clone()).await?;
        if count == 1 {
            self.redis.expire::<(), _>(key, ttl_secs, None).await?;
        }
        Ok(count)
    }
}

fn unix_bucket(width_secs: u64) -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() / width_secs)
        .unwrap_or(0)
}

#[async_trait]
impl InteractionGuard for RedisInteractionGuard {
    async fn should_accept(&self, actor_id: &str, subject_id: &str) -> bool {
        let cooldown_key = format!("{}:toggle:{actor_id}:{subject_id}", self.prefix);
        let bucket_key = format!(
            "{}:toggle_rate:{actor_id}:{subject_id}:{}",
            self.prefix,
            unix_bucket(MINUTE)
        );

        let result = async {
            if !self
                .claim(cooldown_key, Expiration::PX(TOGGLE_COOLDOWN.as_millis() as i64))
                .await?
            {
                return Ok(false);
            }
            let count = self.bump(bucket_key, MINUTE as i64).await?;
            Ok::<_, fred::error::Error>(count <= u64::from(TOGGLES_PER_MINUTE))
        }
        .await;

        result.unwrap_or_else(|e| {
            warn!(error = %e, "Interaction guard unavailable, accepting toggle");
            true
        })
    }

    async fn should_record_view(&self, subject_id: &str, viewer: &Viewer) -> bool {
        let cooldown_key = format!("{}:view:{subject_id}:{}", self.prefix, viewer.key());

        let result = async {
            if !self
                .claim(cooldown_key, Expiration::EX(VIEW_COOLDOWN.as_secs() as i64))
                .await?
            {
                return Ok(false);
            }
            if let Viewer::Anonymous(ip) = viewer {
                let bucket_key =
                    format!("{}:view_rate:{ip}:{}", self.prefix, unix_bucket(HOUR));
                let count = self.bump(bucket_key, HOUR as i64).await?;
                return Ok(count <= u64::from(ANONYMOUS_VIEWS_PER_HOUR));
            }
            Ok::<_, fred::error::Error>(true)
        }
        .await;

        result.unwrap_or_else(|e| {
            warn!(error = %e, "Interaction guard unavailable, recording view");
            true
        })
    }

    async fn sweep(&self) -> usize {
        // Keys expire on their own.
        0
    }
}
