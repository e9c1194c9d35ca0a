use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Extension, Path, Query, State};
use axum::{
    Json, Router,
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::interval;
use validator::Validate;

use duet_domain::{
    idempotency::BeginOutcome,
    identity::ActorIdentity,
    ports::idempotency::{IdempotencyKey, IdempotencyResponse},
    ports::realtime::EventPublisher,
    realtime::PushEvent,
    support::{
        CreateSupportRequestInput, ParticipantRole, ReportSupportRequestInput, SupportReport,
        SupportRequest,
    },
    threads::{Message, MessageContext, MessageKind, SendMessageInput, ThreadSummary},
    timeline::{TimelineItem, build_timeline_page},
    tips::SendTipInput,
};

use crate::error::{ApiError, map_domain_error};
use crate::middleware as app_middleware;
use crate::middleware::AuthContext;
use crate::{observability, state::AppState, validation};

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/v1/messages", post(send_direct_message))
        .route("/v1/messages/:message_id/read", post(mark_message_read))
        .route("/v1/threads", get(list_threads))
        .route("/v1/threads/:thread_id/timeline", get(fetch_timeline))
        .route("/v1/threads/:thread_id/read", post(mark_thread_read))
        .route("/v1/tips", post(send_tip))
        .route(
            "/v1/support-requests",
            post(create_support_request).get(list_support_requests),
        )
        .route(
            "/v1/support-requests/:request_id/accept",
            post(accept_support_request),
        )
        .route(
            "/v1/support-requests/:request_id/decline",
            post(decline_support_request),
        )
        .route(
            "/v1/support-requests/:request_id/cancel",
            post(cancel_support_request),
        )
        .route(
            "/v1/support-requests/:request_id/close",
            post(close_support_request),
        )
        .route(
            "/v1/support-requests/:request_id/report",
            post(report_support_request),
        )
        .route("/v1/realtime/ws", get(realtime_ws))
        .route_layer(middleware::from_fn(app_middleware::require_auth_middleware));

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .merge(protected)
        .layer(app_middleware::timeout_layer())
        .layer(app_middleware::trace_layer())
        .layer(app_middleware::set_request_id_layer())
        .layer(app_middleware::propagate_request_id_layer())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::auth_middleware,
        ))
        .layer(middleware::from_fn(
            app_middleware::correlation_id_middleware,
        ))
        .layer(middleware::from_fn(app_middleware::metrics_layer));

    if !state.config.is_test() {
        app = app.layer(app_middleware::rate_limit_layer());
    }

    app.with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.app_env.clone(),
    })
}

async fn metrics() -> Response {
    match observability::render_metrics() {
        Some(body) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[derive(Debug, Deserialize, Validate)]
struct SendDirectMessageRequest {
    #[validate(length(min = 1, max = 128))]
    recipient_id: String,
    #[validate(length(min = 1, max = 2_000))]
    message: String,
}

async fn send_direct_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<SendDirectMessageRequest>,
) -> Result<Response, ApiError> {
    validation::validate(&payload)?;
    let actor = actor_identity(&auth)?;
    let request_id = request_id_from_headers(&headers)?;
    let correlation_id = correlation_id_from_headers(&headers)?;

    let key = IdempotencyKey::new(
        "message_send",
        format!("{}:{}", actor.user_id, payload.recipient_id),
        request_id.clone(),
    );
    let outcome = state.idempotency.begin(&key).await.map_err(|err| {
        tracing::error!(error = %err, "idempotency begin failed");
        ApiError::Internal
    })?;

    match outcome {
        BeginOutcome::Replay(response) => Ok(to_response(response)),
        BeginOutcome::InProgress => Err(ApiError::Conflict),
        BeginOutcome::Started => {
            let message = state
                .thread_service()
                .send_direct_message(
                    &actor,
                    &payload.recipient_id,
                    payload.message,
                    request_id,
                    correlation_id,
                )
                .await
                .map_err(map_domain_error)?;

            let response = IdempotencyResponse {
                status_code: StatusCode::CREATED.as_u16(),
                body: serde_json::to_value(&message).map_err(|_| ApiError::Internal)?,
            };
            state
                .idempotency
                .complete(&key, response.clone())
                .await
                .map_err(|err| {
                    tracing::error!(error = %err, "idempotency complete failed");
                    ApiError::Internal
                })?;
            Ok(to_response(response))
        }
    }
}

async fn list_threads(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<ThreadSummary>>, ApiError> {
    let actor = actor_identity(&auth)?;
    let threads = state
        .thread_service()
        .list_threads(&actor)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(threads))
}

#[derive(Debug, Deserialize)]
struct TimelineQuery {
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn fetch_timeline(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(thread_id): Path<String>,
    Query(query): Query<TimelineQuery>,
) -> Result<Json<Vec<TimelineItem>>, ApiError> {
    let actor = actor_identity(&auth)?;
    let page = build_timeline_page(query.limit, query.offset);
    let items = state
        .timeline_service()
        .fetch(&actor, &thread_id, page)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(items))
}

#[derive(Serialize)]
struct MarkThreadReadResponse {
    thread_id: String,
    read_count: usize,
}

async fn mark_thread_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(thread_id): Path<String>,
) -> Result<Json<MarkThreadReadResponse>, ApiError> {
    let actor = actor_identity(&auth)?;
    let read_count = state
        .thread_service()
        .mark_read(&actor, &thread_id)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(MarkThreadReadResponse {
        thread_id,
        read_count,
    }))
}

async fn mark_message_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(message_id): Path<String>,
) -> Result<Json<Message>, ApiError> {
    let actor = actor_identity(&auth)?;
    let message = state
        .thread_service()
        .mark_message_read(&actor, &message_id)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(message))
}

#[derive(Debug, Deserialize, Validate)]
struct SendTipRequest {
    #[validate(length(min = 1, max = 128))]
    to_user_id: String,
    pub amount: i64,
    pub reason: Option<String>,
    /// Optional courtesy line delivered alongside the transfer.
    pub message: Option<String>,
}

async fn send_tip(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<SendTipRequest>,
) -> Result<Response, ApiError> {
    validation::validate(&payload)?;
    let actor = actor_identity(&auth)?;
    let request_id = request_id_from_headers(&headers)?;
    let correlation_id = correlation_id_from_headers(&headers)?;

    let key = IdempotencyKey::new("tip_send", actor.user_id.clone(), request_id.clone());
    let outcome = state.idempotency.begin(&key).await.map_err(|err| {
        tracing::error!(error = %err, "idempotency begin failed");
        ApiError::Internal
    })?;

    match outcome {
        BeginOutcome::Replay(response) => Ok(to_response(response)),
        BeginOutcome::InProgress => Err(ApiError::Conflict),
        BeginOutcome::Started => {
            let transfer = state
                .tip_service()
                .send_tip(
                    &actor,
                    SendTipInput {
                        to_user_id: payload.to_user_id,
                        amount: payload.amount,
                        reason: payload.reason,
                        courtesy_message: payload.message,
                        request_id,
                        correlation_id,
                    },
                )
                .await
                .map_err(map_domain_error)?;

            let response = IdempotencyResponse {
                status_code: StatusCode::CREATED.as_u16(),
                body: serde_json::to_value(&transfer).map_err(|_| ApiError::Internal)?,
            };
            state
                .idempotency
                .complete(&key, response.clone())
                .await
                .map_err(|err| {
                    tracing::error!(error = %err, "idempotency complete failed");
                    ApiError::Internal
                })?;
            Ok(to_response(response))
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
struct CreateSupportRequestBody {
    #[validate(length(min = 1, max = 128))]
    to_user_id: String,
    #[serde(alias = "type")]
    #[validate(length(min = 1, max = 64))]
    kind: String,
    pub amount: i64,
    #[validate(length(min = 1, max = 1_000))]
    description: String,
}

async fn create_support_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<CreateSupportRequestBody>,
) -> Result<Response, ApiError> {
    validation::validate(&payload)?;
    let actor = actor_identity(&auth)?;
    let request_id = request_id_from_headers(&headers)?;
    let correlation_id = correlation_id_from_headers(&headers)?;

    let key = IdempotencyKey::new(
        "support_request_create",
        actor.user_id.clone(),
        request_id.clone(),
    );
    let outcome = state.idempotency.begin(&key).await.map_err(|err| {
        tracing::error!(error = %err, "idempotency begin failed");
        ApiError::Internal
    })?;

    match outcome {
        BeginOutcome::Replay(response) => Ok(to_response(response)),
        BeginOutcome::InProgress => Err(ApiError::Conflict),
        BeginOutcome::Started => {
            let request = state
                .support_service()
                .create(
                    &actor,
                    CreateSupportRequestInput {
                        to_user_id: payload.to_user_id,
                        kind: payload.kind,
                        amount: payload.amount,
                        description: payload.description,
                        request_id,
                        correlation_id,
                    },
                )
                .await
                .map_err(map_domain_error)?;

            let response = IdempotencyResponse {
                status_code: StatusCode::CREATED.as_u16(),
                body: serde_json::to_value(&request).map_err(|_| ApiError::Internal)?,
            };
            state
                .idempotency
                .complete(&key, response.clone())
                .await
                .map_err(|err| {
                    tracing::error!(error = %err, "idempotency complete failed");
                    ApiError::Internal
                })?;
            Ok(to_response(response))
        }
    }
}

#[derive(Debug, Deserialize)]
struct SupportRequestListQuery {
    role: Option<String>,
}

async fn list_support_requests(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<SupportRequestListQuery>,
) -> Result<Json<Vec<SupportRequest>>, ApiError> {
    let actor = actor_identity(&auth)?;
    let role = match query.role.as_deref() {
        Some("sent") => Some(ParticipantRole::Sent),
        Some("received") => Some(ParticipantRole::Received),
        None => None,
        Some(other) => {
            return Err(ApiError::Validation(format!(
                "unknown role filter '{other}', expected sent or received"
            )));
        }
    };
    let requests = state
        .support_service()
        .list_for(&actor, role)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(requests))
}

/// accept / decline / cancel share the same envelope-free transition shape.
macro_rules! support_transition_handler {
    ($name:ident, $entity:literal, $call:ident) => {
        async fn $name(
            State(state): State<AppState>,
            headers: HeaderMap,
            Extension(auth): Extension<AuthContext>,
            Path(request_id): Path<String>,
        ) -> Result<Response, ApiError> {
            let actor = actor_identity(&auth)?;
            let http_request_id = request_id_from_headers(&headers)?;

            let key = IdempotencyKey::new(
                $entity,
                format!("{}:{request_id}", actor.user_id),
                http_request_id,
            );
            let outcome = state.idempotency.begin(&key).await.map_err(|err| {
                tracing::error!(error = %err, "idempotency begin failed");
                ApiError::Internal
            })?;

            match outcome {
                BeginOutcome::Replay(response) => Ok(to_response(response)),
                BeginOutcome::InProgress => Err(ApiError::Conflict),
                BeginOutcome::Started => {
                    let request = state
                        .support_service()
                        .$call(&actor, &request_id)
                        .await
                        .map_err(map_domain_error)?;

                    let response = IdempotencyResponse {
                        status_code: StatusCode::OK.as_u16(),
                        body: serde_json::to_value(&request).map_err(|_| ApiError::Internal)?,
                    };
                    state
                        .idempotency
                        .complete(&key, response.clone())
                        .await
                        .map_err(|err| {
                            tracing::error!(error = %err, "idempotency complete failed");
                            ApiError::Internal
                        })?;
                    Ok(to_response(response))
                }
            }
        }
    };
}

support_transition_handler!(accept_support_request, "support_request_accept", accept);
support_transition_handler!(decline_support_request, "support_request_decline", decline);
support_transition_handler!(cancel_support_request, "support_request_cancel", cancel);

#[derive(Debug, Deserialize, Validate)]
struct CloseSupportRequestBody {
    #[validate(range(min = 1, max = 5))]
    rating: u8,
}

async fn close_support_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Path(request_id): Path<String>,
    Json(payload): Json<CloseSupportRequestBody>,
) -> Result<Response, ApiError> {
    validation::validate(&payload)?;
    let actor = actor_identity(&auth)?;
    let http_request_id = request_id_from_headers(&headers)?;

    let key = IdempotencyKey::new(
        "support_request_close",
        format!("{}:{request_id}", actor.user_id),
        http_request_id,
    );
    let outcome = state.idempotency.begin(&key).await.map_err(|err| {
        tracing::error!(error = %err, "idempotency begin failed");
        ApiError::Internal
    })?;

    match outcome {
        BeginOutcome::Replay(response) => Ok(to_response(response)),
        BeginOutcome::InProgress => Err(ApiError::Conflict),
        BeginOutcome::Started => {
            let request = state
                .support_service()
                .close(&actor, &request_id, payload.rating)
                .await
                .map_err(map_domain_error)?;

            let response = IdempotencyResponse {
                status_code: StatusCode::OK.as_u16(),
                body: serde_json::to_value(&request).map_err(|_| ApiError::Internal)?,
            };
            state
                .idempotency
                .complete(&key, response.clone())
                .await
                .map_err(|err| {
                    tracing::error!(error = %err, "idempotency complete failed");
                    ApiError::Internal
                })?;
            Ok(to_response(response))
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
struct ReportSupportRequestBody {
    #[validate(length(min = 1, max = 64))]
    category: String,
    #[validate(length(min = 1, max = 1_000))]
    description: String,
}

async fn report_support_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Path(request_id): Path<String>,
    Json(payload): Json<ReportSupportRequestBody>,
) -> Result<Response, ApiError> {
    validation::validate(&payload)?;
    let actor = actor_identity(&auth)?;
    let http_request_id = request_id_from_headers(&headers)?;

    let key = IdempotencyKey::new(
        "support_request_report",
        format!("{}:{request_id}", actor.user_id),
        http_request_id,
    );
    let outcome = state.idempotency.begin(&key).await.map_err(|err| {
        tracing::error!(error = %err, "idempotency begin failed");
        ApiError::Internal
    })?;

    match outcome {
        BeginOutcome::Replay(response) => Ok(to_response(response)),
        BeginOutcome::InProgress => Err(ApiError::Conflict),
        BeginOutcome::Started => {
            let report: SupportReport = state
                .support_service()
                .report(
                    &actor,
                    &request_id,
                    ReportSupportRequestInput {
                        category: payload.category,
                        description: payload.description,
                    },
                )
                .await
                .map_err(map_domain_error)?;

            let response = IdempotencyResponse {
                status_code: StatusCode::CREATED.as_u16(),
                body: serde_json::to_value(&report).map_err(|_| ApiError::Internal)?,
            };
            state
                .idempotency
                .complete(&key, response.clone())
                .await
                .map_err(|err| {
                    tracing::error!(error = %err, "idempotency complete failed");
                    ApiError::Internal
                })?;
            Ok(to_response(response))
        }
    }
}

/// Client -> server frames on the realtime socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "snake_case")]
enum ClientCommand {
    JoinThread {
        thread_id: String,
    },
    LeaveThread {
        thread_id: String,
    },
    TypingStart {
        thread_id: String,
    },
    TypingStop {
        thread_id: String,
    },
    SendMessage {
        thread_id: String,
        message: String,
        request_id: Option<String>,
    },
    SendSupportMessage {
        thread_id: String,
        message: String,
        request_id: Option<String>,
    },
}

async fn realtime_ws(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let actor = actor_identity(&auth)?;
    Ok(ws.on_upgrade(move |socket| handle_realtime_socket(socket, state, actor)))
}

async fn handle_realtime_socket(socket: WebSocket, state: AppState, actor: ActorIdentity) {
    let (mut sender, mut incoming) = socket.split();
    let (conn_id, mut events) = state.realtime.register(&actor.user_id);
    tracing::debug!(user_id = %actor.user_id, conn_id = %conn_id, "realtime connection opened");

    let mut heartbeat = interval(Duration::from_secs(15));
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                let Ok(payload) = serde_json::to_string(&event) else {
                    tracing::error!(event = event.name(), "failed to serialize push event");
                    continue;
                };
                if sender.send(WsMessage::Text(payload)).await.is_err() {
                    break;
                }
            }
            frame = incoming.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        handle_client_command(&state, &conn_id, &actor, &text).await;
                    }
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
            _ = heartbeat.tick() => {
                if sender.send(WsMessage::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    state.realtime.unregister(&conn_id);
    tracing::debug!(user_id = %actor.user_id, conn_id = %conn_id, "realtime connection closed");
}

async fn handle_client_command(
    state: &AppState,
    conn_id: &str,
    actor: &ActorIdentity,
    raw: &str,
) {
    let command: ClientCommand = match serde_json::from_str(raw) {
        Ok(command) => command,
        Err(err) => {
            tracing::debug!(error = %err, "unparseable realtime command");
            state.realtime.send_to_conn(
                conn_id,
                &PushEvent::MessageSendError {
                    reason: "unrecognized command".to_string(),
                },
            );
            return;
        }
    };

    match command {
        ClientCommand::JoinThread { thread_id } => {
            match state
                .thread_service()
                .validate_access(&thread_id, &actor.user_id)
                .await
            {
                Ok(_) => {
                    state.realtime.join_thread(conn_id, &thread_id);
                    // Entering a conversation implies reading it.
                    if let Err(err) = state.thread_service().mark_read(actor, &thread_id).await {
                        tracing::warn!(error = %err, thread_id, "mark-read on join failed");
                    }
                    state.realtime.publish_to_thread(
                        &thread_id,
                        &PushEvent::ThreadJoined {
                            thread_id: thread_id.clone(),
                            user_id: actor.user_id.clone(),
                        },
                    );
                }
                Err(err) => {
                    state.realtime.send_to_conn(
                        conn_id,
                        &PushEvent::ThreadJoinError {
                            thread_id,
                            reason: err.to_string(),
                        },
                    );
                }
            }
        }
        ClientCommand::LeaveThread { thread_id } => {
            state.realtime.leave_thread(conn_id, &thread_id);
            let event = PushEvent::ThreadLeft {
                thread_id: thread_id.clone(),
                user_id: actor.user_id.clone(),
            };
            state.realtime.publish_to_thread(&thread_id, &event);
            state.realtime.send_to_conn(conn_id, &event);
        }
        ClientCommand::TypingStart { thread_id } => {
            relay_typing(state, actor, &thread_id, true).await;
        }
        ClientCommand::TypingStop { thread_id } => {
            relay_typing(state, actor, &thread_id, false).await;
        }
        ClientCommand::SendMessage {
            thread_id,
            message,
            request_id,
        } => {
            send_from_socket(state, conn_id, actor, thread_id, message, request_id, MessageContext::Dm)
                .await;
        }
        ClientCommand::SendSupportMessage {
            thread_id,
            message,
            request_id,
        } => {
            send_from_socket(
                state,
                conn_id,
                actor,
                thread_id,
                message,
                request_id,
                MessageContext::Support,
            )
            .await;
        }
    }
}

/// Typing is pure relay: no server-side timer or debounce, visible both in
/// the open thread view and in the counterpart's inbox list.
async fn relay_typing(state: &AppState, actor: &ActorIdentity, thread_id: &str, is_typing: bool) {
    let thread = match state
        .thread_service()
        .validate_access(thread_id, &actor.user_id)
        .await
    {
        Ok(thread) => thread,
        Err(err) => {
            tracing::debug!(error = %err, thread_id, "typing relay rejected");
            return;
        }
    };

    let event = PushEvent::UserTyping {
        thread_id: thread_id.to_string(),
        user_id: actor.user_id.clone(),
        is_typing,
    };
    state.realtime.publish_to_thread(thread_id, &event);
    if let Some(counterpart) = thread.counterpart_of(&actor.user_id) {
        state.realtime.publish_to_user(counterpart, &event);
    }
}

async fn send_from_socket(
    state: &AppState,
    conn_id: &str,
    actor: &ActorIdentity,
    thread_id: String,
    message: String,
    request_id: Option<String>,
    context: MessageContext,
) {
    let request_id =
        request_id.unwrap_or_else(duet_domain::util::uuid_v7_without_dashes);
    let input = SendMessageInput {
        thread_id,
        body: message,
        context,
        kind: MessageKind::User,
        request_id,
        correlation_id: duet_domain::util::uuid_v7_without_dashes(),
        occurred_at_ms: None,
    };
    if let Err(err) = state.thread_service().record_message(actor, input).await {
        state.realtime.send_to_conn(
            conn_id,
            &PushEvent::MessageSendError {
                reason: err.to_string(),
            },
        );
    }
}

fn actor_identity(auth: &AuthContext) -> Result<ActorIdentity, ApiError> {
    let user_id = auth
        .user_id
        .as_ref()
        .filter(|user_id| !user_id.trim().is_empty())
        .ok_or(ApiError::Unauthorized)?;
    Ok(ActorIdentity {
        user_id: user_id.to_string(),
        username: auth
            .username
            .clone()
            .unwrap_or_else(|| user_id.to_string()),
    })
}

fn request_id_from_headers(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(std::string::ToString::to_string)
        .ok_or_else(|| ApiError::Validation("missing request id".into()))
}

fn correlation_id_from_headers(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(app_middleware::CORRELATION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(std::string::ToString::to_string)
        .ok_or_else(|| ApiError::Validation("missing correlation id".into()))
}

fn to_response(response: IdempotencyResponse) -> Response {
    let status = StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::OK);
    (status, Json(response.body)).into_response()
}
