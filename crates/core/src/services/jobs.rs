//! Job processing service for background tasks.
//!
//! Side effects that must never hold up a request (audit records, email,
//! mention resolution) are pushed onto a bounded in-memory queue and
//! handled by a small pool of workers.

use std::sync::Arc;

use chrono::Utc;
use quill_common::IdGenerator;
use quill_db::{entities::user_activity, repositories::UserActivityRepository};
use sea_orm::Set;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, error, info, warn};

use crate::services::email::{EmailService, NotificationEmail};
use crate::services::notification::NotificationService;

/// Maximum number of concurrent job workers.
const MAX_WORKERS: usize = 4;

/// Channel buffer size for jobs.
const JOB_BUFFER_SIZE: usize = 1000;

/// Job types that can be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Append an audit record.
    RecordActivity {
        user_id: String,
        action: String,
        subject_id: Option<String>,
        subject_type: Option<String>,
    },
    /// Render and send a notification email.
    SendEmail(NotificationEmail),
    /// Notify users mentioned in a comment.
    ResolveMentions {
        author_id: String,
        content: String,
        post_id: String,
        comment_id: String,
    },
}

impl Job {
    const fn kind(&self) -> &'static str {
        match self {
            Self::RecordActivity { .. } => "record_activity",
            Self::SendEmail(_) => "send_email",
            Self::ResolveMentions { .. } => "resolve_mentions",
        }
    }
}

/// Job sender for enqueueing jobs.
#[derive(Clone)]
pub struct JobSender {
    sender: mpsc::Sender<Job>,
}

impl JobSender {
    /// Enqueue a job without waiting.
    ///
    /// A full or closed queue drops the job with a warning; callers never
    /// observe the failure.
    pub fn enqueue(&self, job: Job) {
        let kind = job.kind();
        match self.sender.try_send(job) {
            Ok(()) => debug!(job = kind, "Job enqueued"),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(job = kind, "Job queue is full, dropping job");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(job = kind, "Job queue is closed, dropping job");
            }
        }
    }

    /// Enqueue an audit record.
    pub fn record_activity(
        &self,
        user_id: &str,
        action: &str,
        subject_id: Option<&str>,
        subject_type: Option<&str>,
    ) {
        self.enqueue(Job::RecordActivity {
            user_id: user_id.to_string(),
            action: action.to_string(),
            subject_id: subject_id.map(ToString::to_string),
            subject_type: subject_type.map(ToString::to_string),
        });
    }

    /// Enqueue a notification email.
    pub fn send_email(&self, email: NotificationEmail) {
        self.enqueue(Job::SendEmail(email));
    }

    /// Enqueue mention resolution for a comment.
    pub fn resolve_mentions(&self, author_id: &str, content: &str, post_id: &str, comment_id: &str) {
        self.enqueue(Job::ResolveMentions {
            author_id: author_id.to_string(),
            content: content.to_string(),
            post_id: post_id.to_string(),
            comment_id: comment_id.to_string(),
        });
    }
}

/// Job worker context containing services needed for job processing.
#[derive(Clone)]
pub struct JobWorkerContext {
    pub activity_repo: UserActivityRepository,
    pub email_service: EmailService,
    pub notification_service: NotificationService,
}

/// Job processing service.
pub struct JobService {
    sender: mpsc::Sender<Job>,
    receiver: Option<mpsc::Receiver<Job>>,
}

impl JobService {
    /// Create a new job service.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel(JOB_BUFFER_SIZE);
        Self {
            sender,
            receiver: Some(receiver),
        }
    }

    /// Get a job sender for enqueueing jobs.
    #[must_use]
    pub fn sender(&self) -> JobSender {
        JobSender {
            sender: self.sender.clone(),
        }
    }

    /// Take every queued job without running it.
    ///
    /// Only meaningful before [`JobService::start`].
    pub fn drain(&mut self) -> Vec<Job> {
        let mut jobs = Vec::new();
        if let Some(receiver) = self.receiver.as_mut() {
            while let Ok(job) = receiver.try_recv() {
                jobs.push(job);
            }
        }
        jobs
    }

    /// Start the job processor with the given context.
    /// This consumes the receiver and spawns worker tasks.
    pub fn start(mut self, context: JobWorkerContext) {
        let Some(receiver) = self.receiver.take() else {
            error!("Job service already started");
            return;
        };
        let context = Arc::new(context);

        tokio::spawn(async move {
            info!("Job worker starting with {} workers", MAX_WORKERS);
            run_job_processor(receiver, context).await;
            info!("Job worker stopped");
        });
    }
}

impl Default for JobService {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the job processor.
async fn run_job_processor(mut receiver: mpsc::Receiver<Job>, context: Arc<JobWorkerContext>) {
    let semaphore = Arc::new(Semaphore::new(MAX_WORKERS));

    while let Some(job) = receiver.recv().await {
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        let ctx = context.clone();

        tokio::spawn(async move {
            let _permit = permit;
            process_job(job, &ctx).await;
        });
    }
}

/// Process a single job. Failures are logged and never retried.
pub async fn process_job(job: Job, context: &JobWorkerContext) {
    match job {
        Job::RecordActivity {
            user_id,
            action,
            subject_id,
            subject_type,
        } => {
            let model = user_activity::ActiveModel {
                id: Set(IdGenerator::new().generate()),
                user_id: Set(user_id.clone()),
                action: Set(action.clone()),
                subject_id: Set(subject_id),
                subject_type: Set(subject_type),
                created_at: Set(Utc::now().into()),
            };
            if let Err(e) = context.activity_repo.create(model).await {
                warn!(user_id = %user_id, action = %action, error = %e, "Failed to record activity");
            }
        }
        Job::SendEmail(email) => process_email(context, &email).await,
        Job::ResolveMentions {
            author_id,
            content,
            post_id,
            comment_id,
        } => {
            match context
                .notification_service
                .notify_mentions(&author_id, &content, &post_id, &comment_id)
                .await
            {
                Ok(count) => debug!(comment_id = %comment_id, mentioned = count, "Mentions resolved"),
                Err(e) => {
                    warn!(comment_id = %comment_id, error = %e, "Failed to resolve mentions");
                }
            }
        }
    }
}

async fn process_email(context: &JobWorkerContext, email: &NotificationEmail) {
    match context.email_service.send_notification(email).await {
        Ok(()) => {
            debug!(to = %email.to, notification_type = ?email.notification_type, "Email sent");
        }
        Err(e) => {
            error!(
                to = %email.to,
                notification_type = ?email.notification_type,
                error = %e,
                "Failed to send email"
            );
        }
    }
}
