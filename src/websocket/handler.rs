use actix::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use log::{debug, info, warn};
use uuid::Uuid;

use crate::models::{AppState, ClientMessage, ServerMessage, SessionId};
use crate::session::{Event, SessionEvent};

/// WebSocket connection relaying session events to a client
pub struct ChessWebSocket {
    pub id: String,
    pub app_state: web::Data<AppState>,
    /// Only events of this session are relayed; `None` relays everything.
    pub watching: Option<SessionId>,
    pub relay_ticks: bool,
}

impl Actor for ChessWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        ctx.add_stream(self.app_state.controller.subscribe());
        info!("Observer {} subscribed to session events", self.id);
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        info!("Observer {} disconnected", self.id);
    }
}

impl ChessWebSocket {
    pub fn send(&self, message: &ServerMessage, ctx: &mut ws::WebsocketContext<Self>) {
        match serde_json::to_string(message) {
            Ok(text) => ctx.text(text),
            Err(e) => {
                warn!("Failed to serialize {}: {}", message.message_type, e);
                ctx.text(r#"{"message_type": "error", "error": "serialization failed"}"#);
            }
        }
    }

    fn wants(&self, event: &SessionEvent) -> bool {
        if matches!(event.event, Event::ClockTick(_)) && !self.relay_ticks {
            return false;
        }
        self.watching.map_or(true, |id| id == event.session_id)
    }
}

// Orchestrator events
impl StreamHandler<SessionEvent> for ChessWebSocket {
    fn handle(&mut self, event: SessionEvent, ctx: &mut Self::Context) {
        if self.wants(&event) {
            debug!("Relaying event #{} of {} to {}", event.seq, event.session_id, self.id);
            self.send(&ServerMessage::from_event(&event), ctx);
        }
    }

    fn finished(&mut self, _: &mut Self::Context) {
        debug!("Event stream closed for {}", self.id);
    }
}

// Client requests
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ChessWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Text(text)) => {
                debug!("Observer {} sent: {}", self.id, text);
                match serde_json::from_str::<ClientMessage>(text.as_ref()) {
                    Ok(client_msg) => self.handle_message(client_msg, ctx),
                    Err(e) => {
                        warn!("Unparseable message from {}: {}", self.id, e);
                        let reply = ServerMessage::error(format!("Invalid message format: {}", e));
                        self.send(&reply, ctx);
                    }
                }
            }
            Ok(ws::Message::Binary(_)) => {
                warn!("Binary messages are not supported");
                self.send(&ServerMessage::error("Binary messages are not supported"), ctx);
            }
            Ok(ws::Message::Close(reason)) => {
                info!("Observer {} closed the socket: {:?}", self.id, reason);
                ctx.close(reason);
                ctx.stop();
            }
            _ => {
                ctx.stop();
            }
        }
    }
}

/// Upgrade an HTTP request to an observer socket.
pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let id = Uuid::new_v4().to_string();
    info!("New observer connection: {}", id);

    let ws = ChessWebSocket {
        id,
        app_state: app_state.clone(),
        watching: None,
        relay_ticks: true,
    };
    ws::start(ws, &req, stream)
}
