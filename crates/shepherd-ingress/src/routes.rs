use std::collections::BTreeMap;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use kube::api::{ListParams, PostParams};
use serde::Deserialize;
use shepherd_types::condition::{self, reason, ConditionStatus, NOTIFIED, SUCCEEDED};
use shepherd_types::naming::{normalise_repo_label, validate_label_value, validate_task_name};
use shepherd_types::task_record::{labels, CallbackRef, RepoRef, RunnerConfig, TaskDescription};
use shepherd_types::{codec, Condition, TaskRecord, TaskRecordSpec};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::callback::{send_signed_callback, CallbackDetails, CallbackPayload};
use crate::error::AppError;
use crate::models::*;
use crate::security::TaskAuth;
use crate::state::AppState;
use crate::task_store;

pub fn public_router(state: AppState) -> Router {
    let tasks = Router::new()
        .route("/", post(create_task).get(list_tasks))
        .route("/{id}", get(get_task))
        .route("/{id}/events", get(stream_events));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(healthz))
        .nest("/tasks", tasks)
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn internal_router(state: AppState) -> Router {
    let tasks = Router::new()
        .route("/{id}/data", get(task_data))
        .route("/{id}/token", get(task_token))
        .route("/{id}/status", post(status_ingest))
        .route("/{id}/events", post(event_ingest));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(healthz))
        .nest("/tasks", tasks)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &crate::config::IngressConfig) -> CorsLayer {
    if config.allow_all_cors() {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any)
    }
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

// ---- Create task ----

async fn create_task(
    State(state): State<AppState>,
    Json(payload): Json<CreateTaskRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.repo.url.is_empty() {
        return Err(AppError::bad_request("repo.url is required"));
    }
    if payload.task.description.is_empty() {
        return Err(AppError::bad_request("task.description must be non-empty"));
    }
    if payload.callback_url.is_empty() {
        return Err(AppError::bad_request("callbackURL is required"));
    }
    if payload.runner.sandbox_template_name.is_empty() {
        return Err(AppError::bad_request("runner.sandboxTemplateName is required"));
    }
    if let Some(timeout) = &payload.runner.timeout {
        shepherd_types::duration::parse_duration(timeout)
            .map_err(|_| AppError::bad_request("runner.timeout is not a valid duration"))?;
    }
    for value in payload.labels.values() {
        validate_label_value(value).map_err(|err| AppError::bad_request(err.to_string()))?;
    }

    let (encoded_context, encoding) = codec::compress_context(payload.task.context.as_deref().unwrap_or(""))?;

    let mut labels_map: BTreeMap<String, String> = payload.labels.clone();
    labels_map.insert(labels::REPO.to_string(), normalise_repo_label(&payload.repo.url));
    if let Some(source_type) = &payload.task.source_type {
        labels_map.insert(labels::SOURCE_TYPE.to_string(), source_type.clone());
        match source_type.as_str() {
            "issue" => {
                if let Some(id) = &payload.task.source_id {
                    labels_map.insert(labels::ISSUE.to_string(), id.clone());
                }
            }
            "fleet" => {
                if let Some(id) = &payload.task.source_id {
                    labels_map.insert(labels::FLEET.to_string(), id.clone());
                }
            }
            _ => {}
        }
    }
    if let Some(source_id) = &payload.task.source_id {
        labels_map.insert(labels::SOURCE_ID.to_string(), source_id.clone());
    }

    let spec = TaskRecordSpec {
        repo: RepoRef {
            url: payload.repo.url.clone(),
            git_ref: payload.repo.git_ref.clone(),
        },
        task: TaskDescription {
            description: payload.task.description.clone(),
            context: if encoded_context.is_empty() { None } else { Some(encoded_context) },
            context_encoding: Some(encoding.to_string()),
            source_url: payload.task.source_url.clone(),
            source_type: payload.task.source_type.as_deref().and_then(|s| s.parse().ok()),
            source_id: payload.task.source_id.clone(),
        },
        callback: CallbackRef {
            url: payload.callback_url.clone(),
        },
        runner: RunnerConfig {
            sandbox_template_name: payload.runner.sandbox_template_name.clone(),
            timeout: payload.runner.timeout.clone(),
            service_account_name: payload.runner.service_account_name.clone(),
        },
    };

    // Retry internally on a rare name collision, each attempt with
    // a freshly generated random suffix.
    for _ in 0..5 {
        let name = shepherd_types::naming::generate_task_name();
        validate_task_name(&name).map_err(|err| AppError::bad_request(err.to_string()))?;

        let mut task = TaskRecord::new(&name, spec.clone());
        task.metadata.namespace = Some(state.config.namespace.clone());
        task.metadata.labels = Some(labels_map.iter().map(|(k, v)| (k.to_string(), v.clone())).collect());

        match task_store::api(&state.client, &state.config.namespace)
            .create(&PostParams::default(), &task)
            .await
        {
            Ok(created) => return Ok((StatusCode::CREATED, Json(to_task_response(&created)))),
            Err(kube::Error::Api(err)) if err.code == 409 => continue,
            Err(err) => return Err(AppError::from(err)),
        }
    }

    Err(AppError::conflict("failed to allocate a unique task name"))
}

// ---- List / get tasks ----

#[derive(Debug, Deserialize, Default)]
pub struct ListTasksQuery {
    pub repo: Option<String>,
    pub issue: Option<String>,
    pub fleet: Option<String>,
    pub active: Option<bool>,
}

async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListTasksQuery>,
) -> Result<impl IntoResponse, AppError> {
    let mut selectors = Vec::new();
    if let Some(repo) = &query.repo {
        let normalised = normalise_repo_label(repo);
        validate_label_value(&normalised).map_err(|err| AppError::bad_request(err.to_string()))?;
        selectors.push(format!("{}={}", labels::REPO, normalised));
    }
    if let Some(issue) = &query.issue {
        validate_label_value(issue).map_err(|err| AppError::bad_request(err.to_string()))?;
        selectors.push(format!("{}={}", labels::ISSUE, issue));
    }
    if let Some(fleet) = &query.fleet {
        validate_label_value(fleet).map_err(|err| AppError::bad_request(err.to_string()))?;
        selectors.push(format!("{}={}", labels::FLEET, fleet));
    }

    let mut list_params = ListParams::default();
    if !selectors.is_empty() {
        list_params = list_params.labels(&selectors.join(","));
    }

    let mut items = task_store::list(&state.client, &state.config.namespace, list_params).await?;
    if query.active == Some(true) {
        items.retain(is_active);
    }

    Ok(Json(items.iter().map(to_task_response).collect::<Vec<_>>()))
}

async fn get_task(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, AppError> {
    let task = task_store::get(&state.client, &state.config.namespace, &id).await?;
    Ok(Json(to_task_response(&task)))
}

// ---- Event streaming ----

#[derive(Debug, Deserialize, Default)]
pub struct EventsQuery {
    pub after: Option<u64>,
}

async fn stream_events(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_event_socket(socket, state, id, query.after.unwrap_or(0)))
}

async fn handle_event_socket(mut socket: WebSocket, state: AppState, task_id: String, after: u64) {
    let (history, rx) = state.events.subscribe(&task_id, after).await;
    for event in &history {
        if send_task_event(&mut socket, event).await.is_err() {
            return;
        }
    }

    if let Some(mut rx) = rx {
        loop {
            tokio::select! {
                event = rx.recv() => {
                    match event {
                        Some(event) => {
                            if send_task_event(&mut socket, &event).await.is_err() {
                                return;
                            }
                        }
                        None => break,
                    }
                }
                incoming = socket.recv() => {
                    // Server is write-only after upgrade; client frames are
                    // drained but discarded, and a disconnect ends the handler.
                    if incoming.is_none() {
                        return;
                    }
                }
            }
        }
    }

    if let Ok(task) = task_store::get(&state.client, &state.config.namespace, &task_id).await {
        let _ = send_task_complete(&mut socket, &task).await;
    }
    let _ = socket.send(Message::Close(None)).await;
}

async fn send_task_event(socket: &mut WebSocket, event: &shepherd_types::TaskEvent) -> Result<(), ()> {
    let frame = serde_json::json!({ "type": "task_event", "data": event });
    send_json_frame(socket, &frame).await
}

async fn send_task_complete(socket: &mut WebSocket, task: &TaskRecord) -> Result<(), ()> {
    let response = to_task_response(task);
    let frame = serde_json::json!({
        "type": "task_complete",
        "data": {
            "taskID": response.id,
            "status": response.status.phase,
            "prURL": response.status.pr_url,
            "error": response.status.error,
        }
    });
    send_json_frame(socket, &frame).await
}

async fn send_json_frame(socket: &mut WebSocket, frame: &serde_json::Value) -> Result<(), ()> {
    let text = serde_json::to_string(frame).map_err(|_| ())?;
    socket.send(Message::Text(text.into())).await.map_err(|_| ())
}

// ---- Task data fetch ----

async fn task_data(State(state): State<AppState>, auth: TaskAuth) -> Result<impl IntoResponse, AppError> {
    let task = task_store::get(&state.client, &state.config.namespace, &auth.task_id).await?;
    let status = task.status.clone().unwrap_or_default();
    if condition::is_terminal(&status.conditions) {
        return Err(AppError::gone("task is already terminal"));
    }

    let context = codec::decompress_context(
        task.spec.task.context.as_deref().unwrap_or(""),
        task.spec.task.context_encoding.as_deref().unwrap_or(""),
    )?;

    Ok(Json(TaskDataResponse {
        description: task.spec.task.description.clone(),
        context,
        source_url: task.spec.task.source_url.clone(),
        repo: RepoOutput {
            url: task.spec.repo.url.clone(),
            git_ref: task.spec.repo.git_ref.clone(),
        },
    }))
}

// ---- Credential mint ----

async fn task_token(State(state): State<AppState>, auth: TaskAuth) -> Result<impl IntoResponse, AppError> {
    let task = task_store::get(&state.client, &state.config.namespace, &auth.task_id).await?;
    let status = task.status.clone().unwrap_or_default();
    if condition::is_terminal(&status.conditions) {
        return Err(AppError::gone("task is already terminal"));
    }
    if status.credential_issued {
        return Err(AppError::conflict("credential already issued for this task"));
    }

    let repository = normalise_repo_label(&task.spec.repo.url);
    let (token, expires_at) = state.credentials.mint(&repository).await?;

    task_store::patch_status(&state.client, &state.config.namespace, &auth.task_id, |t| {
        if let Some(status) = t.status.as_mut() {
            status.credential_issued = true;
        }
    })
    .await?;

    Ok(Json(CredentialResponse { token, expires_at }))
}

// ---- Status ingest ----

async fn status_ingest(
    State(state): State<AppState>,
    auth: TaskAuth,
    Json(payload): Json<StatusIngestRequest>,
) -> Result<impl IntoResponse, AppError> {
    let is_terminal_event = matches!(payload.event, StatusEventKind::Completed | StatusEventKind::Failed);

    if !is_terminal_event {
        let task = task_store::get(&state.client, &state.config.namespace, &auth.task_id).await?;
        let http = reqwest::Client::new();
        let event_name = match payload.event {
            StatusEventKind::Started => "started",
            StatusEventKind::Progress => "progress",
            _ => unreachable!(),
        };
        send_signed_callback(
            &http,
            &task.spec.callback.url,
            &state.config.adapter_hmac_secret,
            &CallbackPayload {
                task_id: &auth.task_id,
                event: event_name,
                message: &payload.message,
                details: None,
            },
        )
        .await;
        return Ok(Json(StatusIngestResponse { noop: false }));
    }

    let already_terminal = {
        let task = task_store::get(&state.client, &state.config.namespace, &auth.task_id).await?;
        condition::is_terminal(&task.status.unwrap_or_default().conditions)
    };

    let updated = task_store::patch_status(&state.client, &state.config.namespace, &auth.task_id, |t| {
        let generation = t.metadata.generation.unwrap_or(0);
        let status = t.status.get_or_insert_with(Default::default);
        if condition::is_terminal(&status.conditions) {
            return;
        }
        match payload.event {
            StatusEventKind::Completed => {
                condition::set_condition(
                    &mut status.conditions,
                    Condition::new(SUCCEEDED, ConditionStatus::True, reason::SUCCEEDED, payload.message.clone(), generation),
                );
                if let Some(pr_url) = payload.details.as_ref().and_then(|d| d.pr_url.clone()) {
                    status
                        .result
                        .get_or_insert(shepherd_types::TaskResult { pr_url: None, error: None })
                        .pr_url = Some(pr_url);
                }
                status.completion_time = Some(chrono::Utc::now());
            }
            StatusEventKind::Failed => {
                condition::set_condition(
                    &mut status.conditions,
                    Condition::new(SUCCEEDED, ConditionStatus::False, reason::FAILED, payload.message.clone(), generation),
                );
                if let Some(error) = payload.details.as_ref().and_then(|d| d.error.clone()) {
                    status
                        .result
                        .get_or_insert(shepherd_types::TaskResult { pr_url: None, error: None })
                        .error = Some(error);
                }
                status.completion_time = Some(chrono::Utc::now());
            }
            _ => unreachable!(),
        }
    })
    .await?;

    state.events.complete(&auth.task_id).await;
    {
        let task_id = auth.task_id.clone();
        let events = state.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(5 * 60)).await;
            events.cleanup(&task_id).await;
        });
    }

    if already_terminal {
        return Ok(Json(StatusIngestResponse { noop: true }));
    }

    // Dedup against `Notified`: whichever path (this synchronous handler or
    // the watcher) observes the terminal transition first wins the CAS.
    let should_notify = {
        let status = updated.status.clone().unwrap_or_default();
        condition::get_condition(&status.conditions, NOTIFIED)
            .map(|c| c.status != ConditionStatus::True)
            .unwrap_or(true)
    };

    if should_notify {
        let status = updated.status.clone().unwrap_or_default();
        let (event_name, details) = match payload.event {
            StatusEventKind::Completed => (
                "completed",
                CallbackDetails {
                    pr_url: status.result.as_ref().and_then(|r| r.pr_url.clone()),
                    error: None,
                },
            ),
            StatusEventKind::Failed => (
                "failed",
                CallbackDetails {
                    pr_url: None,
                    error: status.result.as_ref().and_then(|r| r.error.clone()),
                },
            ),
            _ => unreachable!(),
        };

        let http = reqwest::Client::new();
        let sent = send_signed_callback(
            &http,
            &updated.spec.callback.url,
            &state.config.adapter_hmac_secret,
            &CallbackPayload {
                task_id: &auth.task_id,
                event: event_name,
                message: &payload.message,
                details: Some(details),
            },
        )
        .await;

        let notified_reason = if sent { reason::CALLBACK_SENT } else { reason::CALLBACK_FAILED };
        let _ = task_store::patch_status(&state.client, &state.config.namespace, &auth.task_id, |t| {
            let generation = t.metadata.generation.unwrap_or(0);
            let status = t.status.get_or_insert_with(Default::default);
            let already_notified = condition::get_condition(&status.conditions, NOTIFIED)
                .map(|c| c.status == ConditionStatus::True)
                .unwrap_or(false);
            if already_notified {
                return;
            }
            condition::set_condition(
                &mut status.conditions,
                Condition::new(NOTIFIED, ConditionStatus::True, notified_reason, "adapter callback attempted", generation),
            );
        })
        .await;
    }

    Ok(Json(StatusIngestResponse { noop: false }))
}

// ---- Event ingest ----

async fn event_ingest(
    State(state): State<AppState>,
    auth: TaskAuth,
    Json(payload): Json<EventIngestRequest>,
) -> Result<impl IntoResponse, AppError> {
    let task = task_store::get(&state.client, &state.config.namespace, &auth.task_id).await?;
    if condition::is_terminal(&task.status.unwrap_or_default().conditions) {
        return Err(AppError::gone("task is already terminal"));
    }

    for event in &payload.events {
        if !event.is_valid() {
            return Err(AppError::bad_request("event sequence must be > 0 and summary non-empty"));
        }
    }

    state.events.publish(&auth.task_id, payload.events).await;
    Ok(StatusCode::OK)
}
