// region:    --- Imports
use crate::app::AppState;
use crate::auction::{CreateAuctionCommand, EditAuctionCommand};
use crate::bidding::PlaceBidCommand;
use crate::channel::{ChannelRegistry, ConnectionId, Topic};
use crate::error::{AppError, ErrorKind};
use crate::principal::{Principal, Role};
use axum::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

// endregion: --- Imports

// region:    --- Principal Extractor
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// ID 서비스(게이트웨이)가 전달한 헤더에서 인증 주체 추출
#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let missing = || AppError::Forbidden("인증 정보가 없습니다.".to_string());

        let id = header(USER_ID_HEADER)
            .ok_or_else(missing)?
            .parse::<i64>()
            .map_err(|_| AppError::Forbidden("잘못된 사용자 id 입니다.".to_string()))?;
        let name = header(USER_NAME_HEADER).unwrap_or_else(|| format!("user-{id}"));
        let role = match header(USER_ROLE_HEADER) {
            Some(role) => role.parse::<Role>().map_err(|_| {
                warn!("{:<12} --> 알 수 없는 역할 헤더: user={}, role={}", "Handler", id, role);
                AppError::Forbidden(format!("잘못된 사용자 역할 입니다: {role}"))
            })?,
            None => Role::Bidder,
        };
        Ok(Principal::new(id, name, role))
    }
}
// endregion: --- Principal Extractor

// region:    --- Error Response
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::StateConflict => StatusCode::CONFLICT,
            ErrorKind::Authorization => StatusCode::FORBIDDEN,
            ErrorKind::TransientIo => StatusCode::SERVICE_UNAVAILABLE,
        };
        let mut body = serde_json::json!({
            "error": self.to_string(),
            "code": self.code(),
        });
        if let AppError::BidTooLow { amount, current } = &self {
            body["bid_amount"] = (*amount).into();
            body["current_bid"] = (*current).into();
        }
        (status, Json(body)).into_response()
    }
}
// endregion: --- Error Response

// region:    --- Routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/auctions",
            post(handle_create_auction).get(handle_list_auctions),
        )
        .route(
            "/auctions/:id",
            get(handle_get_auction)
                .put(handle_edit_auction)
                .delete(handle_delete_auction),
        )
        .route("/auctions/:id/bids", post(handle_place_bid))
        .route("/admin/auctions/:id/approve", post(handle_approve))
        .route("/admin/auctions/:id/reject", post(handle_reject))
        .route("/admin/auctions/:id/close", post(handle_force_close))
        .route(
            "/notifications",
            get(handle_list_notifications).delete(handle_clear_notifications),
        )
        .route(
            "/notifications/unread-count",
            get(handle_unread_count),
        )
        .route("/notifications/read-all", post(handle_mark_all_read))
        .route("/notifications/:id/read", post(handle_mark_read))
        .route("/ws", get(handle_ws))
        .with_state(state)
}
// endregion: --- Routes

// region:    --- Command Handlers
#[derive(Debug, Deserialize)]
pub struct BidRequest {
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

/// 경매 등록
pub async fn handle_create_auction(
    State(state): State<AppState>,
    principal: Principal,
    Json(cmd): Json<CreateAuctionCommand>,
) -> Result<impl IntoResponse, AppError> {
    info!("{:<12} --> 경매 등록 user: {}", "Handler", principal.id);
    let item = state.auctions.create(&principal, cmd).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// 경매 수정
pub async fn handle_edit_auction(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(cmd): Json<EditAuctionCommand>,
) -> Result<impl IntoResponse, AppError> {
    info!("{:<12} --> 경매 수정 id: {}", "Handler", id);
    Ok(Json(state.auctions.edit(&principal, id, cmd).await?))
}

/// 경매 삭제
pub async fn handle_delete_auction(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    info!("{:<12} --> 경매 삭제 id: {}", "Handler", id);
    state.auctions.delete(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// 입찰 요청 처리
pub async fn handle_place_bid(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(req): Json<BidRequest>,
) -> Result<impl IntoResponse, AppError> {
    info!(
        "{:<12} --> 입찰 요청 auction: {}, user: {}",
        "Handler", id, principal.id
    );
    let item = state
        .ledger
        .place_bid(PlaceBidCommand {
            auction_id: id,
            bidder_id: principal.id,
            bidder_name: principal.name.clone(),
            amount: req.amount,
        })
        .await?;
    Ok(Json(serde_json::json!({
        "message": "입찰이 성공적으로 처리되었습니다.",
        "current_bid": item.current_bid,
        "bid_amount": req.amount,
    })))
}

/// 관리자 승인
pub async fn handle_approve(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.auctions.approve(&principal, id).await?))
}

/// 관리자 거절
pub async fn handle_reject(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(req): Json<RejectRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.auctions.reject(&principal, id, req.reason).await?))
}

/// 관리자 강제 종료
pub async fn handle_force_close(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.auctions.force_close(&principal, id).await?))
}

// endregion: --- Command Handlers

// region:    --- Query Handlers

/// 모든 경매 조회
pub async fn handle_list_auctions(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    info!("{:<12} --> 모든 경매 조회", "HandlerQuery");
    Ok(Json(state.auctions.list().await?))
}

/// 경매 조회
pub async fn handle_get_auction(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    info!("{:<12} --> 경매 조회 id: {}", "HandlerQuery", id);
    Ok(Json(state.auctions.get(id).await?))
}

/// 알림 목록
pub async fn handle_list_notifications(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.notifier.list(principal.id).await?))
}

/// 읽지 않은 알림 수
pub async fn handle_unread_count(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<impl IntoResponse, AppError> {
    let unread = state.notifier.unread_count(principal.id).await?;
    Ok(Json(serde_json::json!({ "unread": unread })))
}

/// 알림 읽음 처리
pub async fn handle_mark_read(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    state.notifier.mark_read(principal.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// 모든 알림 읽음 처리
pub async fn handle_mark_all_read(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<impl IntoResponse, AppError> {
    let updated = state.notifier.mark_all_read(principal.id).await?;
    Ok(Json(serde_json::json!({ "updated": updated })))
}

/// 알림 비우기
pub async fn handle_clear_notifications(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<impl IntoResponse, AppError> {
    let removed = state.notifier.clear(principal.id).await?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}

// endregion: --- Query Handlers

// region:    --- WebSocket
#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ClientAction {
    Subscribe,
    Unsubscribe,
}

#[derive(Debug, Deserialize)]
struct ClientMessage {
    action: ClientAction,
    topic: String,
}

/// 실시간 연결 (user:<id>, global 자동 구독)
pub async fn handle_ws(
    State(state): State<AppState>,
    principal: Principal,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let channels = Arc::clone(&state.channels);
    ws.on_upgrade(move |socket| run_connection(socket, channels, principal))
}

async fn run_connection(mut socket: WebSocket, channels: Arc<ChannelRegistry>, principal: Principal) {
    let (connection_id, mut outgoing) = channels.connect();
    channels.subscribe(connection_id, Topic::User(principal.id));
    channels.subscribe(connection_id, Topic::Global);
    info!(
        "{:<12} --> 실시간 연결: user={}, connection={}",
        "Channel", principal.id, connection_id
    );

    loop {
        tokio::select! {
            message = outgoing.recv() => {
                let Some(message) = message else { break };
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("{:<12} --> 메시지 직렬화 실패: {:?}", "Channel", e);
                        continue;
                    }
                };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    handle_client_message(&channels, connection_id, &principal, &text);
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    channels.disconnect(connection_id);
    info!(
        "{:<12} --> 실시간 연결 종료: user={}, connection={}",
        "Channel", principal.id, connection_id
    );
}

fn handle_client_message(
    channels: &ChannelRegistry,
    connection_id: ConnectionId,
    principal: &Principal,
    text: &str,
) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            debug!("{:<12} --> 알 수 없는 클라이언트 메시지: {:?}", "Channel", e);
            return;
        }
    };
    let topic: Topic = match message.topic.parse() {
        Ok(topic) => topic,
        Err(e) => {
            debug!("{:<12} --> {}", "Channel", e);
            return;
        }
    };
    // 다른 사용자의 개인 토픽은 구독할 수 없다
    if let Topic::User(owner) = topic {
        if owner != principal.id {
            warn!(
                "{:<12} --> 타인 토픽 구독 거부: user={}, topic={}",
                "Channel", principal.id, topic
            );
            return;
        }
    }
    match message.action {
        ClientAction::Subscribe => {
            channels.subscribe(connection_id, topic);
        }
        ClientAction::Unsubscribe => {
            channels.unsubscribe(connection_id, topic);
        }
    }
}
// endregion: --- WebSocket
