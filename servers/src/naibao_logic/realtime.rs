use super::auth::{authenticate, bearer_token};
use super::error::{ApiError, ApiResult};
use super::routes::parse_baby_id;
use super::state::SharedState;
use axum::{
    body::Bytes,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt, future};
use lib_naibao::core::{Frame, Session};
use lib_naibao::models::{BabyId, UserId};
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub baby_id: Option<String>,
}

/// `GET /ws?token=..&baby_id=..`.
///
/// Authentication and membership are settled on the plain HTTP request, so
/// a refused client gets a status code instead of an upgraded socket.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let (user_id, baby_id) = match admit(&state, &params, &headers).await {
        Ok(admitted) => admitted,
        Err(e) => return e.into_response(),
    };
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };
    ws.on_upgrade(move |socket| run_session(socket, state, user_id, baby_id))
}

async fn admit(state: &SharedState, params: &WsParams, headers: &HeaderMap) -> ApiResult<(UserId, BabyId)> {
    let token = params
        .token
        .as_deref()
        .filter(|t| !t.is_empty())
        .or_else(|| bearer_token(headers));
    let user_id = authenticate(state, token)?;
    let baby_id = parse_baby_id(params.baby_id.as_deref())?;
    state
        .services
        .access
        .member_of(baby_id, user_id)
        .await
        .map_err(ApiError::from)?;
    Ok((user_id, baby_id))
}

async fn run_session(socket: WebSocket, state: SharedState, user_id: UserId, baby_id: BabyId) {
    let registration = match state.hub.register(user_id, baby_id).await {
        Ok(registration) => registration,
        Err(e) => {
            warn!(user = user_id, baby = baby_id, error = %e, "hub refused session");
            return;
        }
    };
    let session = Session::new(state.hub.clone(), registration, state.session_config);
    let id = session.id();

    let (sink, stream) = socket.split();
    let sink = sink.with(|frame: Frame| future::ready(Ok::<_, axum::Error>(to_message(frame))));
    let stream = stream.map(|message| message.map(to_frame));

    session.start(sink, stream).join().await;
    info!(session = id, user = user_id, baby = baby_id, "websocket closed");
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(bytes) => Message::Binary(bytes.into()),
        Frame::Ping => Message::Ping(Bytes::new()),
        Frame::Pong => Message::Pong(Bytes::new()),
        Frame::Close => Message::Close(None),
    }
}

fn to_frame(message: Message) -> Frame {
    match message {
        Message::Text(text) => Frame::Text(text.as_str().to_owned()),
        Message::Binary(bytes) => Frame::Binary(bytes.to_vec()),
        Message::Ping(_) => Frame::Ping,
        Message::Pong(_) => Frame::Pong,
        Message::Close(_) => Frame::Close,
    }
}
