use actix_files as fs;
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, Responder, ResponseError};
use log::info;

use crate::models::{AppState, ServerMessage, SessionId, StartRequest};
use crate::session::SessionError;

impl ResponseError for SessionError {
    fn status_code(&self) -> StatusCode {
        match self {
            SessionError::NotFound(_) => StatusCode::NOT_FOUND,
            SessionError::Finished(_) => StatusCode::CONFLICT,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ServerMessage::error(self.to_string()))
    }
}

/// HTTP handler for the index page
pub async fn index(req: HttpRequest, app_state: web::Data<AppState>) -> HttpResponse {
    let index = app_state.config.server.static_dir.join("index.html");
    match fs::NamedFile::open_async(&index).await {
        Ok(file) => file.into_response(&req),
        Err(_) => HttpResponse::Ok().body("Chess referee"),
    }
}

pub async fn create_session(
    app_state: web::Data<AppState>,
    request: web::Json<StartRequest>,
) -> impl Responder {
    let config = request.session_config(&app_state.config);
    let id = app_state.controller.start(config);
    info!("Session {} created over HTTP", id);
    match app_state.controller.snapshot(id) {
        Ok(view) => HttpResponse::Created().json(ServerMessage::snapshot(&view)),
        Err(e) => e.error_response(),
    }
}

pub async fn list_sessions(app_state: web::Data<AppState>) -> impl Responder {
    let sessions: Vec<ServerMessage> = app_state
        .controller
        .list()
        .iter()
        .map(ServerMessage::snapshot)
        .collect();
    HttpResponse::Ok().json(sessions)
}

pub async fn get_session(
    app_state: web::Data<AppState>,
    id: web::Path<SessionId>,
) -> Result<HttpResponse, SessionError> {
    let view = app_state.controller.snapshot(id.into_inner())?;
    Ok(HttpResponse::Ok().json(ServerMessage::snapshot(&view)))
}

fn accepted(message_type: &str, id: SessionId) -> HttpResponse {
    HttpResponse::Accepted().json(ServerMessage {
        message_type: message_type.to_string(),
        session_id: Some(id.to_string()),
        ..ServerMessage::default()
    })
}

pub async fn pause_session(
    app_state: web::Data<AppState>,
    id: web::Path<SessionId>,
) -> Result<HttpResponse, SessionError> {
    let id = id.into_inner();
    app_state.controller.pause(id)?;
    Ok(accepted("pause_requested", id))
}

pub async fn resume_session(
    app_state: web::Data<AppState>,
    id: web::Path<SessionId>,
) -> Result<HttpResponse, SessionError> {
    let id = id.into_inner();
    app_state.controller.resume(id)?;
    Ok(accepted("resume_requested", id))
}

pub async fn cancel_session(
    app_state: web::Data<AppState>,
    id: web::Path<SessionId>,
) -> Result<HttpResponse, SessionError> {
    let id = id.into_inner();
    app_state.controller.cancel(id)?;
    Ok(accepted("cancel_requested", id))
}

pub async fn reset_session(
    app_state: web::Data<AppState>,
    id: web::Path<SessionId>,
) -> Result<HttpResponse, SessionError> {
    let id = id.into_inner();
    app_state.controller.reset(id).await?;
    Ok(HttpResponse::Ok().json(ServerMessage {
        message_type: "session_reset".to_string(),
        session_id: Some(id.to_string()),
        ..ServerMessage::default()
    }))
}

/// Configure the HTTP routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/ws").route(web::get().to(crate::websocket::ws_index)))
        .service(web::resource("/").route(web::get().to(index)))
        .service(
            web::scope("/api/sessions")
                .route("", web::post().to(create_session))
                .route("", web::get().to(list_sessions))
                .route("/{id}", web::get().to(get_session))
                .route("/{id}/pause", web::post().to(pause_session))
                .route("/{id}/resume", web::post().to(resume_session))
                .route("/{id}/cancel", web::post().to(cancel_session))
                .route("/{id}/reset", web::post().to(reset_session)),
        );
}
