use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use course_catalog::api::router;
use course_catalog::config::{BackendKind, Config};
use course_catalog::db::{self, KvStore};
use course_catalog::persistence::{
    CourseApiConfig, HttpCourseBackend, LocalStoreBackend, PersistenceBackend,
};
use course_catalog::progress::LocalProgressTracker;
use course_catalog::repository::CourseRepository;
use course_catalog::services::CourseDeletionService;
use course_catalog::state::AppState;
use course_catalog::users::LocalUserDirectory;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "course_catalog=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = db::open_pool(&config.database_url).await?;
    let store = KvStore::new(pool.clone());

    let backend: Arc<dyn PersistenceBackend> = match &config.backend {
        BackendKind::Local => {
            info!("using local course store");
            Arc::new(LocalStoreBackend::new(store.clone()))
        }
        BackendKind::Remote { base_url } => {
            info!("using remote course API at {}", base_url);
            Arc::new(HttpCourseBackend::new(CourseApiConfig::new(base_url.clone()))?)
        }
    };

    let courses = Arc::new(CourseRepository::open(backend).await);
    let deletion = Arc::new(CourseDeletionService::new(
        courses.clone(),
        Arc::new(LocalProgressTracker::new(store.clone())),
        Arc::new(LocalUserDirectory::new(store)),
    ));

    let state = AppState {
        db: pool,
        courses: courses.clone(),
        deletion,
    };

    let app = router(state);

    info!("listening on http://{}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = courses.flush().await {
        warn!("failed to flush course catalog on shutdown: {}", e);
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
