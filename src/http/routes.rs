use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::error::ServiceError;
use crate::models::{Game, Gameserver, ScheduledTask};
use crate::scheduler::CronExpr;

use super::AppState;

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

// --- Games catalog: a thin CRUD surface directly over the store. No
// lifecycle logic applies to catalog entries, so the HTTP layer does not
// need to go through GameserverService for these. ---

pub fn games_router() -> Router<AppState> {
    Router::new()
        .route("/api/games", get(list_games).post(create_game))
        .route(
            "/api/games/{id}",
            get(get_game).put(update_game).delete(delete_game),
        )
}

async fn list_games(State(state): State<AppState>) -> Result<Json<Vec<Game>>, ServiceError> {
    Ok(Json(state.store.list_games()?))
}

async fn get_game(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Game>, ServiceError> {
    Ok(Json(state.store.get_game(&id)?))
}

async fn create_game(
    State(state): State<AppState>,
    Json(game): Json<Game>,
) -> Result<(StatusCode, Json<Game>), ServiceError> {
    Ok((StatusCode::CREATED, Json(state.store.create_game(game)?)))
}

async fn update_game(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut game): Json<Game>,
) -> Result<Json<Game>, ServiceError> {
    game.id = id;
    Ok(Json(state.store.update_game(game)?))
}

async fn delete_game(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ServiceError> {
    state.store.delete_game(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Gameservers: the lifecycle surface, entirely through
// GameserverService so every request follows hydration / allocator /
// rollback rules the same way a scheduled invocation does. ---

pub fn gameservers_router() -> Router<AppState> {
    Router::new()
        .route("/api/gameservers", get(list_gameservers).post(create_gameserver))
        .route(
            "/api/gameservers/{id}",
            get(get_gameserver).put(update_gameserver).delete(delete_gameserver),
        )
        .route("/api/gameservers/{id}/start", post(start_gameserver))
        .route("/api/gameservers/{id}/stop", post(stop_gameserver))
        .route("/api/gameservers/{id}/restart", post(restart_gameserver))
        .route("/api/gameservers/{id}/console", post(send_command))
        .route(
            "/api/gameservers/{id}/backup",
            post(create_backup).get(list_backups),
        )
        .route("/api/gameservers/{id}/restore", post(restore_backup))
        .route(
            "/api/gameservers/{id}/files",
            get(list_files).put(write_file).delete(delete_path),
        )
        .route("/api/gameservers/{id}/files/mkdir", post(create_directory))
        .route("/api/gameservers/{id}/files/rename", post(rename_file))
        .route("/api/gameservers/{id}/files/download", get(download_file))
        .route("/api/gameservers/{id}/files/upload", post(upload_file))
}

async fn list_gameservers(State(state): State<AppState>) -> Result<Json<Vec<Gameserver>>, ServiceError> {
    Ok(Json(state.service.list_gameservers().await?))
}

async fn get_gameserver(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Gameserver>, ServiceError> {
    Ok(Json(state.service.get_gameserver(&id).await?))
}

async fn create_gameserver(
    State(state): State<AppState>,
    Json(gs): Json<Gameserver>,
) -> Result<(StatusCode, Json<Gameserver>), ServiceError> {
    Ok((StatusCode::CREATED, Json(state.service.create_gameserver(gs).await?)))
}

async fn update_gameserver(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(gs): Json<Gameserver>,
) -> Result<Json<Gameserver>, ServiceError> {
    Ok(Json(state.service.update_gameserver(&id, gs).await?))
}

async fn delete_gameserver(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ServiceError> {
    state.service.delete_gameserver(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn start_gameserver(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Gameserver>, ServiceError> {
    Ok(Json(state.service.start_gameserver(&id).await?))
}

async fn stop_gameserver(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Gameserver>, ServiceError> {
    Ok(Json(state.service.stop_gameserver(&id).await?))
}

async fn restart_gameserver(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Gameserver>, ServiceError> {
    Ok(Json(state.service.restart_gameserver(&id).await?))
}

#[derive(Deserialize)]
struct ConsoleCommand {
    command: String,
}

async fn send_command(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ConsoleCommand>,
) -> Result<StatusCode, ServiceError> {
    state.service.send_command(&id, &body.command).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_backup(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let filename = state.service.create_gameserver_backup(&id).await?;
    Ok(Json(json!({ "filename": filename })))
}

async fn list_backups(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<crate::driver::FileEntry>>, ServiceError> {
    Ok(Json(state.service.list_gameserver_backups(&id).await?))
}

#[derive(Deserialize)]
struct RestoreQuery {
    backup: String,
}

async fn restore_backup(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<RestoreQuery>,
) -> Result<StatusCode, ServiceError> {
    state.service.restore_gameserver_backup(&id, &q.backup).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct PathQuery {
    path: String,
}

async fn list_files(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<PathQuery>,
) -> Result<Json<Vec<crate::driver::FileEntry>>, ServiceError> {
    Ok(Json(state.service.list_files(&id, &q.path).await?))
}

#[derive(Deserialize)]
struct WriteFileBody {
    path: String,
    content: String,
}

async fn write_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<WriteFileBody>,
) -> Result<StatusCode, ServiceError> {
    state
        .service
        .write_file(&id, &body.path, body.content.into_bytes())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_path(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<PathQuery>,
) -> Result<StatusCode, ServiceError> {
    state.service.delete_path(&id, &q.path).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct MkdirBody {
    path: String,
}

async fn create_directory(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<MkdirBody>,
) -> Result<StatusCode, ServiceError> {
    state.service.create_directory(&id, &body.path).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct RenameBody {
    from: String,
    to: String,
}

async fn rename_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RenameBody>,
) -> Result<StatusCode, ServiceError> {
    state.service.rename_file(&id, &body.from, &body.to).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Raw tar stream, distinct from `GET .../files` which returns decoded
/// directory listings (spec §4.2's `DownloadFile`).
async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<PathQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let bytes = state.service.download_file(&id, &q.path).await?;
    Ok((
        [(axum::http::header::CONTENT_TYPE, "application/x-tar")],
        bytes,
    ))
}

/// Raw request body copied in as-is, distinct from the JSON-text
/// `PUT .../files` editor endpoint (spec §4.2's `UploadFile`).
async fn upload_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<PathQuery>,
    body: axum::body::Bytes,
) -> Result<StatusCode, ServiceError> {
    state.service.upload_file(&id, &q.path, body.to_vec()).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Scheduled tasks: direct store CRUD, validating the cron grammar at
// the boundary so a bad expression never reaches the scheduler. ---

pub fn tasks_router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/gameservers/{id}/tasks",
            get(list_tasks).post(create_task),
        )
        .route(
            "/api/gameservers/{id}/tasks/{task_id}",
            put(update_task).delete(delete_task),
        )
}

async fn list_tasks(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ScheduledTask>>, ServiceError> {
    Ok(Json(state.store.list_scheduled_tasks_for_gameserver(&id)?))
}

async fn create_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut task): Json<ScheduledTask>,
) -> Result<(StatusCode, Json<ScheduledTask>), ServiceError> {
    CronExpr::parse(&task.cron_schedule)
        .map_err(|_| ServiceError::BadRequest(format!("invalid cron expression '{}'", task.cron_schedule)))?;
    task.gameserver_id = id;
    Ok((StatusCode::CREATED, Json(state.store.create_scheduled_task(task)?)))
}

async fn update_task(
    State(state): State<AppState>,
    Path((_id, task_id)): Path<(String, String)>,
    Json(mut task): Json<ScheduledTask>,
) -> Result<Json<ScheduledTask>, ServiceError> {
    CronExpr::parse(&task.cron_schedule)
        .map_err(|_| ServiceError::BadRequest(format!("invalid cron expression '{}'", task.cron_schedule)))?;
    task.id = task_id;
    Ok(Json(state.store.update_scheduled_task(task)?))
}

async fn delete_task(
    State(state): State<AppState>,
    Path((_id, task_id)): Path<(String, String)>,
) -> Result<StatusCode, ServiceError> {
    state.store.delete_scheduled_task(&task_id)?;
    Ok(StatusCode::NO_CONTENT)
}
