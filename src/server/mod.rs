//! Web Front-End
//!
//! A JSON API over the conda client plus a single-page UI that drives it.
//!
//! | Method | Path | Purpose |
//! |--------|------|---------|
//! | GET | `/envs` | list environments |
//! | POST | `/envs` | create an environment (background) |
//! | DELETE | `/envs/:name` | remove an environment (background) |
//! | POST | `/envs/clone` | clone an environment (background) |
//! | POST | `/envs/export` | export an environment to YAML |
//! | GET | `/tasks/:task_id` | background task progress |
//! | GET | `/logs` | recent activity |

pub mod error;
pub mod handlers;

use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use axum::routing::{delete, get, post};
use axum::Router;
use log::{info, warn};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use crate::config::Settings;
use crate::environment::Conda;
use crate::execution::{TaskRegistry, TaskRunner};
use crate::monitoring::ActivityLog;

pub use error::ApiError;

/// Delay before opening the browser, giving the listener time to start.
const BROWSER_DELAY: Duration = Duration::from_secs(1);

/// State shared by all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub conda: Conda,
    pub tasks: TaskRunner,
    pub activity: ActivityLog,
    pub default_python: String,
    pub static_dir: PathBuf,
}

impl AppState {
    pub fn new(settings: &Settings, conda: Conda) -> Self {
        let activity = ActivityLog::new(settings.log_capacity);
        let tasks = TaskRunner::new(conda.clone(), TaskRegistry::new(), activity.clone());
        Self {
            conda,
            tasks,
            activity,
            default_python: settings.default_python.clone(),
            static_dir: settings.static_dir.clone(),
        }
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let static_dir = state.static_dir.clone();

    Router::new()
        .route("/", get(handlers::index))
        .route("/envs", get(handlers::list_envs).post(handlers::create_env))
        .route("/envs/clone", post(handlers::clone_env))
        .route("/envs/export", post(handlers::export_env))
        .route("/envs/:name", delete(handlers::delete_env))
        .route("/tasks/:task_id", get(handlers::task_progress))
        .route("/logs", get(handlers::logs))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(cors)
        .with_state(state)
}

/// Runs the web server until it fails or the process exits.
pub async fn serve(settings: &Settings) -> Result<(), Box<dyn Error + Send + Sync>> {
    let conda = settings.conda();
    info!("Using conda executable: {}", conda.executable().display());

    let state = AppState::new(settings, conda);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind((settings.host.as_str(), settings.port))
        .await
        .map_err(|e| format!("Could not bind {}:{}: {}", settings.host, settings.port, e))?;

    let url = settings.url();
    info!("Conda environment manager listening on {}", url);

    if settings.open_browser {
        tokio::spawn(async move {
            tokio::time::sleep(BROWSER_DELAY).await;
            if let Err(e) = open::that(&url) {
                warn!("Could not open browser: {}", e);
            }
        });
    }

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_from_settings() {
        let settings = Settings {
            default_python: "3.11".into(),
            log_capacity: 5,
            ..Settings::default()
        };
        let state = AppState::new(&settings, Conda::new("conda"));
        assert_eq!(state.default_python, "3.11");
        assert_eq!(state.static_dir, PathBuf::from("static"));
        assert!(state.activity.is_empty());
    }

    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    async fn send(app: Router, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_invalid_name_returns_detail() {
        let app = router(AppState::new(&Settings::default(), Conda::new("conda")));
        let (status, body) = send(app, Method::POST, "/envs", Some(r#"{"name": ".hidden"}"#)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let detail = body["detail"].as_str().unwrap();
        assert!(detail.starts_with("invalid environment name '.hidden'"));
    }

    #[tokio::test]
    async fn test_unknown_task_route() {
        let app = router(AppState::new(&Settings::default(), Conda::new("conda")));
        let (status, body) = send(app, Method::GET, "/tasks/does-not-exist", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "unknown");
        assert_eq!(body["progress"], 0);
        assert_eq!(body["stage"], "Task not found or already finished");
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use crate::testing::FakeConda;

        fn app(fake: &FakeConda) -> Router {
            router(AppState::new(&Settings::default(), fake.conda()))
        }

        #[tokio::test]
        async fn test_clone_route_is_not_an_env_name() {
            let fake = FakeConda::new();
            let (status, body) = send(
                app(&fake),
                Method::POST,
                "/envs/clone",
                Some(r#"{"source_env": "gamma", "new_env": "delta"}"#),
            )
            .await;

            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["detail"], "environment 'gamma' does not exist");
        }

        #[tokio::test]
        async fn test_clone_route_starts_task() {
            let fake = FakeConda::new();
            let (status, body) = send(
                app(&fake),
                Method::POST,
                "/envs/clone",
                Some(r#"{"source_env": "alpha", "new_env": "delta"}"#),
            )
            .await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["task_id"].as_str().unwrap().len(), 36);
        }

        #[tokio::test]
        async fn test_delete_route() {
            let fake = FakeConda::new();

            let (status, body) = send(app(&fake), Method::DELETE, "/envs/gamma", None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["detail"], "environment 'gamma' does not exist");

            let (status, body) = send(app(&fake), Method::DELETE, "/envs/beta", None).await;
            assert_eq!(status, StatusCode::OK);
            assert!(body["message"].as_str().unwrap().contains("beta"));
        }

        #[tokio::test]
        async fn test_list_route() {
            let fake = FakeConda::new();
            let (status, body) = send(app(&fake), Method::GET, "/envs", None).await;

            assert_eq!(status, StatusCode::OK);
            let names: Vec<&str> = body
                .as_array()
                .unwrap()
                .iter()
                .filter_map(|e| e["name"].as_str())
                .collect();
            assert_eq!(names, vec!["alpha", "beta"]);
        }
    }
}
