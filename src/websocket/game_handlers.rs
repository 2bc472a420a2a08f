use actix::prelude::*;
use actix_web_actors::ws;
use log::{info, warn};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{ClientMessage, ServerMessage, SessionId};
use crate::session::SessionError;
use crate::websocket::handler::ChessWebSocket;

impl ChessWebSocket {
    pub fn handle_message(&mut self, msg: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        if let Some(ticks) = msg.ticks {
            self.relay_ticks = ticks;
        }
        match msg.message_type.as_str() {
            "start" => self.handle_start(msg, ctx),
            "watch" => self.handle_watch(msg, ctx),
            "list" => self.handle_list(ctx),
            "state" => self.handle_state(msg, ctx),
            "pause" | "resume" | "cancel" => self.handle_control(msg, ctx),
            "reset" => self.handle_reset(msg, ctx),
            _ => {
                info!("Unknown message type: {}", msg.message_type);
                self.send(
                    &ServerMessage::error(format!("Unknown message type: {}", msg.message_type)),
                    ctx,
                );
            }
        }
    }

    /// Session named in the message, or the one this connection watches.
    fn target(&self, msg: &ClientMessage) -> Result<SessionId, String> {
        match msg.session_id.as_deref() {
            Some(raw) => {
                Uuid::parse_str(raw).map_err(|e| format!("Invalid session id {}: {}", raw, e))
            }
            None => self
                .watching
                .ok_or_else(|| "No session id given and no session watched".to_string()),
        }
    }

    fn reply_snapshot(
        &self,
        id: SessionId,
        message_type: &str,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        match self.app_state.controller.snapshot(id) {
            Ok(view) => {
                let mut message = ServerMessage::snapshot(&view);
                message.message_type = message_type.to_string();
                self.send(&message, ctx);
            }
            Err(e) => self.send(&ServerMessage::error(e.to_string()), ctx),
        }
    }

    pub fn handle_start(&mut self, msg: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        let config = msg.start.session_config(&self.app_state.config);
        info!(
            "Starting session for {}: {} vs {}",
            self.id, config.seats.white, config.seats.black
        );
        let id = self.app_state.controller.start(config);
        self.watching = Some(id);
        self.reply_snapshot(id, "session_started", ctx);
    }

    pub fn handle_watch(&mut self, msg: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        if msg.session_id.is_none() {
            self.watching = None;
            self.send(
                &ServerMessage {
                    message_type: "watching_all".to_string(),
                    ..ServerMessage::default()
                },
                ctx,
            );
            return;
        }
        match self.target(&msg) {
            Ok(id) => {
                self.watching = Some(id);
                self.reply_snapshot(id, "watching", ctx);
            }
            Err(e) => self.send(&ServerMessage::error(e), ctx),
        }
    }

    pub fn handle_list(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        for view in self.app_state.controller.list() {
            self.send(&ServerMessage::snapshot(&view), ctx);
        }
    }

    pub fn handle_state(&mut self, msg: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        match self.target(&msg) {
            Ok(id) => self.reply_snapshot(id, "session", ctx),
            Err(e) => self.send(&ServerMessage::error(e), ctx),
        }
    }

    pub fn handle_control(&mut self, msg: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        let id = match self.target(&msg) {
            Ok(id) => id,
            Err(e) => {
                self.send(&ServerMessage::error(e), ctx);
                return;
            }
        };
        let controller = &self.app_state.controller;
        let result = match msg.message_type.as_str() {
            "pause" => controller.pause(id),
            "resume" => controller.resume(id),
            _ => controller.cancel(id),
        };
        match result {
            Ok(()) => self.send(
                &ServerMessage {
                    message_type: format!("{}_requested", msg.message_type),
                    session_id: Some(id.to_string()),
                    ..ServerMessage::default()
                },
                ctx,
            ),
            Err(e) => {
                warn!("{} failed for {}: {}", msg.message_type, id, e);
                self.send(&ServerMessage::error(e.to_string()), ctx);
            }
        }
    }

    pub fn handle_reset(&mut self, msg: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        let id = match self.target(&msg) {
            Ok(id) => id,
            Err(e) => {
                self.send(&ServerMessage::error(e), ctx);
                return;
            }
        };
        let controller = Arc::clone(&self.app_state.controller);
        let reset = async move { controller.reset(id).await };

        ctx.spawn(reset.into_actor(self).map(move |result: Result<(), SessionError>, act, ctx| {
            match result {
                Ok(()) => {
                    if act.watching == Some(id) {
                        act.watching = None;
                    }
                    act.send(
                        &ServerMessage {
                            message_type: "session_reset".to_string(),
                            session_id: Some(id.to_string()),
                            ..ServerMessage::default()
                        },
                        ctx,
                    );
                }
                Err(e) => act.send(&ServerMessage::error(e.to_string()), ctx),
            }
        }));
    }
}
