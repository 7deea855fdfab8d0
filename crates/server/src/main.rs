//! Quill server entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use fred::prelude::*;
use quill_api::{StreamingHub, middleware::AppState};
use quill_common::{Config, GuardBackend};
use quill_core::{
    AnalyticsService, CommentService, DedupEventPublisher, EmailSender, EmailService,
    EventPublisherService, FollowingService, InMemoryInteractionGuard, InteractionGuardService,
    InteractionService, JobService, JobWorkerContext, LogEmailSender, NotificationService,
    RedisInteractionGuard, SmtpEmailSender,
};
use quill_db::repositories::{
    CommentRepository, FollowingRepository, InteractionRepository,
    NotificationPreferenceRepository, NotificationRepository, PostRepository, PostViewRepository,
    UserActivityRepository, UserRepository,
};
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str =
    "quill_server=debug,quill_api=debug,quill_core=debug,quill_db=debug,tower_http=debug";

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Select the guard backend from configuration.
async fn build_guard(config: &Config) -> Result<InteractionGuardService, Box<dyn std::error::Error>> {
    match (config.interactions.guard_backend, &config.redis) {
        (GuardBackend::Memory, _) => {
            info!("Using in-memory interaction guard");
            Ok(Arc::new(InMemoryInteractionGuard::new()))
        }
        (GuardBackend::Redis, Some(redis)) => {
            info!("Connecting to Redis...");
            let fred_config = fred::types::config::Config::from_url(&redis.url)?;
            let client = fred::clients::Client::new(fred_config, None, None, None);
            client.init().await?;
            info!("Using Redis interaction guard");
            Ok(Arc::new(RedisInteractionGuard::new(
                Arc::new(client),
                redis.prefix.clone(),
            )))
        }
        (GuardBackend::Redis, None) => {
            Err("interactions.guard_backend = \"redis\" requires a [redis] section".into())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;
    init_tracing(&config);

    info!("Starting quill server...");

    // Connect to database
    let db = Arc::new(quill_db::init(&config).await?);
    info!("Connected to database");

    // Run migrations
    info!("Running database migrations...");
    quill_db::migrate(&db).await?;
    info!("Migrations completed");

    let guard = build_guard(&config).await?;

    // Real-time fan-out, with duplicate pushes collapsed
    let hub = StreamingHub::new();
    let publisher: EventPublisherService =
        Arc::new(DedupEventPublisher::new(Arc::new(hub.clone())));

    // Email
    let email_sender: Arc<dyn EmailSender> = match config.email.as_ref().filter(|e| e.enabled) {
        Some(email) => {
            info!(host = %email.smtp_host, "SMTP email enabled");
            Arc::new(SmtpEmailSender::new(email)?)
        }
        None => {
            info!("SMTP email disabled, emails will be logged");
            Arc::new(LogEmailSender)
        }
    };
    let site_name = config
        .email
        .as_ref()
        .map_or_else(|| "Quill".to_string(), |e| e.from_name.clone());
    let email_service = EmailService::new(email_sender, site_name, config.server.url.clone());

    // Initialize repositories
    let user_repo = UserRepository::new(Arc::clone(&db));
    let post_repo = PostRepository::new(Arc::clone(&db));
    let comment_repo = CommentRepository::new(Arc::clone(&db));
    let interaction_repo = InteractionRepository::new(Arc::clone(&db));
    let post_view_repo = PostViewRepository::new(Arc::clone(&db));
    let following_repo = FollowingRepository::new(Arc::clone(&db));
    let notification_repo = NotificationRepository::new(Arc::clone(&db));
    let preference_repo = NotificationPreferenceRepository::new(Arc::clone(&db));
    let activity_repo = UserActivityRepository::new(Arc::clone(&db));

    let job_service = JobService::new();
    let job_sender = job_service.sender();

    // Initialize services
    let mut notification_service =
        NotificationService::new(notification_repo, preference_repo, user_repo.clone());
    notification_service.set_event_publisher(publisher.clone());
    notification_service.set_job_sender(job_sender.clone());

    let mut interaction_service = InteractionService::new(
        interaction_repo.clone(),
        post_repo.clone(),
        comment_repo.clone(),
        user_repo.clone(),
        post_view_repo.clone(),
        guard.clone(),
        notification_service.clone(),
    );
    interaction_service.set_event_publisher(publisher.clone());
    interaction_service.set_job_sender(job_sender.clone());

    let mut comment_service = CommentService::new(
        comment_repo,
        post_repo.clone(),
        user_repo.clone(),
        notification_service.clone(),
    );
    comment_service.set_event_publisher(publisher.clone());
    comment_service.set_job_sender(job_sender.clone());

    let mut following_service =
        FollowingService::new(following_repo, user_repo.clone(), notification_service.clone());
    following_service.set_event_publisher(publisher.clone());
    following_service.set_job_sender(job_sender);

    let analytics_service = AnalyticsService::new(
        post_repo.clone(),
        post_view_repo,
        interaction_repo,
        activity_repo.clone(),
        user_repo.clone(),
    );

    // Start background jobs
    job_service.start(JobWorkerContext {
        activity_repo,
        email_service,
        notification_service: notification_service.clone(),
    });
    info!("Job worker started");

    // Periodic sweep of guard entries and empty rooms
    let sweep_every = Duration::from_secs(config.interactions.sweep_interval_secs.max(1));
    let sweep_guard = guard.clone();
    let sweep_hub = hub.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_every);
        loop {
            interval.tick().await;
            let entries = sweep_guard.sweep().await;
            let rooms = sweep_hub.sweep().await;
            debug!(entries, rooms, "Swept expired guard entries and empty rooms");
        }
    });

    let state = AppState {
        user_repo,
        post_repo,
        interaction_service,
        comment_service,
        following_service,
        notification_service,
        analytics_service,
        hub,
    };

    // Build router
    let app = quill_api::app(state).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    );

    // Start server with graceful shutdown
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server shutdown complete");
    Ok(())
}
