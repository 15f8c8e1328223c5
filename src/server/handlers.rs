//! HTTP Handlers
//!
//! Each handler validates its request against the current environment
//! list, then either answers directly or starts a background task and
//! returns its id for polling via `/tasks/{task_id}`.

use axum::extract::{Path, State};
use axum::response::Html;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::AppState;
use crate::environment::export::{export_env as run_export, ExportOptions};
use crate::environment::{is_valid_env_name, EnvInfo};
use crate::error::CondaError;
use crate::execution::{Operation, TaskProgress};

/// Number of activity entries returned by `/logs`.
pub const LOG_TAIL: usize = 100;

/// Page served when `static_dir` has no `index.html`.
pub const EMBEDDED_INDEX: &str = include_str!("../../ui/index.html");

#[derive(Debug, Deserialize)]
pub struct CreateEnvRequest {
    pub name: String,
    pub python_version: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CloneEnvRequest {
    pub source_env: String,
    pub new_env: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct TaskAccepted {
    pub message: String,
    pub task_id: String,
}

#[derive(Debug, Serialize)]
pub struct ExportResponse {
    pub yml_content: String,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub logs: Vec<String>,
}

impl AppState {
    /// Records a failure in the activity log and converts it for the client.
    fn reject(&self, err: CondaError) -> ApiError {
        if !err.is_client_error() {
            self.activity.error(err.to_string());
        }
        err.into()
    }

    async fn env_names(&self) -> Result<Vec<String>, ApiError> {
        self.conda.env_names().await.map_err(|e| self.reject(e))
    }
}

/// `GET /envs`
pub async fn list_envs(State(state): State<AppState>) -> Result<Json<Vec<EnvInfo>>, ApiError> {
    state
        .conda
        .list_envs()
        .await
        .map(Json)
        .map_err(|e| state.reject(e))
}

/// `POST /envs`
pub async fn create_env(
    State(state): State<AppState>,
    Json(req): Json<CreateEnvRequest>,
) -> Result<Json<TaskAccepted>, ApiError> {
    if !is_valid_env_name(&req.name) {
        return Err(CondaError::InvalidName(req.name).into());
    }
    if state.env_names().await?.contains(&req.name) {
        return Err(CondaError::AlreadyExists(req.name).into());
    }

    let python_version = req
        .python_version
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| state.default_python.clone());

    let message = format!("Creating environment in the background: {}", req.name);
    let task_id = state.tasks.start(Operation::Create {
        name: req.name,
        python_version,
    });
    Ok(Json(TaskAccepted { message, task_id }))
}

/// `DELETE /envs/{name}`
pub async fn delete_env(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<TaskAccepted>, ApiError> {
    if !state.env_names().await?.contains(&name) {
        return Err(CondaError::NoSuchEnv(name).into());
    }

    let message = format!("Removing environment in the background: {}", name);
    let task_id = state.tasks.start(Operation::Remove { name });
    Ok(Json(TaskAccepted { message, task_id }))
}

/// `POST /envs/clone`
pub async fn clone_env(
    State(state): State<AppState>,
    Json(req): Json<CloneEnvRequest>,
) -> Result<Json<TaskAccepted>, ApiError> {
    let names = state.env_names().await?;
    if !names.contains(&req.source_env) {
        return Err(CondaError::NoSuchEnv(req.source_env).into());
    }
    if !is_valid_env_name(&req.new_env) {
        return Err(CondaError::InvalidName(req.new_env).into());
    }
    if names.contains(&req.new_env) {
        return Err(CondaError::AlreadyExists(req.new_env).into());
    }

    let message = format!(
        "Cloning environment in the background: {} -> {}",
        req.source_env, req.new_env
    );
    let task_id = state.tasks.start(Operation::Clone {
        source: req.source_env,
        new_name: req.new_env,
    });
    Ok(Json(TaskAccepted { message, task_id }))
}

/// `POST /envs/export`
pub async fn export_env(
    State(state): State<AppState>,
    Json(mut options): Json<ExportOptions>,
) -> Result<Json<ExportResponse>, ApiError> {
    // A blank name means the active environment.
    options.env_name = options
        .env_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    if let Some(ref name) = options.env_name {
        if !state.env_names().await?.contains(name) {
            return Err(CondaError::NoSuchEnv(name.clone()).into());
        }
    }

    let outcome = run_export(&state.conda, &options)
        .await
        .map_err(|e| state.reject(e))?;
    state.activity.info(outcome.message);

    Ok(Json(ExportResponse {
        yml_content: outcome.yml_content,
    }))
}

/// `GET /tasks/{task_id}`
pub async fn task_progress(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Json<TaskProgress> {
    Json(state.tasks.registry().get(&task_id))
}

/// `GET /logs`
pub async fn logs(State(state): State<AppState>) -> Json<LogsResponse> {
    Json(LogsResponse {
        logs: state.activity.recent_lines(LOG_TAIL),
    })
}

/// `GET /`
pub async fn index(State(state): State<AppState>) -> Html<String> {
    let custom = state.static_dir.join("index.html");
    match tokio::fs::read_to_string(&custom).await {
        Ok(page) => Html(page),
        Err(_) => Html(EMBEDDED_INDEX.to_string()),
    }
}
