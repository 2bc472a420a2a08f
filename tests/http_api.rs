mod common;

use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use chess_referee::config::Config;
use chess_referee::game::engine::ChessEngine;
use chess_referee::gateway::SeatGateways;
use chess_referee::models::{AppState, Seats, ServerMessage};
use chess_referee::routes::configure_routes;
use chess_referee::session::SessionController;
use common::*;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

fn app_state(config: Config) -> web::Data<AppState> {
    let white = ScriptedAgent::new("white", vec![]);
    let black = ScriptedAgent::new("black", vec![]);
    let controller = SessionController::new(
        Arc::new(ChessEngine),
        Arc::new(move |_: &Seats| SeatGateways::new(white.clone(), black.clone())),
    );
    web::Data::new(AppState::new(Arc::new(controller), Arc::new(config)))
}

#[actix_web::test]
async fn session_lifecycle_over_http() {
    let state = app_state(Config::default());
    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .configure(configure_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/sessions")
        .set_json(json!({ "retry_budget": 4, "initial_clock_secs": 90 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: ServerMessage = test::read_body_json(resp).await;
    let id = created.session_id.clone().expect("session id");
    assert_eq!(created.message_type, "session");
    assert_eq!(created.white_time_ms, Some(90_000));
    assert_eq!(created.white_agent.as_deref(), Some("mock/mock"));

    let req = test::TestRequest::get()
        .uri(&format!("/api/sessions/{id}"))
        .to_request();
    let view: ServerMessage = test::call_and_read_body_json(&app, req).await;
    assert_eq!(view.session_id.as_deref(), Some(id.as_str()));
    assert_eq!(view.moves, Some(Vec::new()));

    let req = test::TestRequest::get().uri("/api/sessions").to_request();
    let listed: Vec<ServerMessage> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(listed.len(), 1);

    let req = test::TestRequest::post()
        .uri(&format!("/api/sessions/{id}/pause"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let reply: ServerMessage = test::read_body_json(resp).await;
    assert_eq!(reply.message_type, "pause_requested");

    let req = test::TestRequest::post()
        .uri(&format!("/api/sessions/{id}/reset"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::get()
        .uri(&format!("/api/sessions/{id}"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    state.controller.shutdown().await;
}

#[actix_web::test]
async fn control_of_a_finished_session_conflicts() {
    let state = app_state(Config::default());
    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .configure(configure_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/sessions")
        .set_json(json!({}))
        .to_request();
    let created: ServerMessage = test::call_and_read_body_json(&app, req).await;
    let id: Uuid = created
        .session_id
        .as_deref()
        .and_then(|raw| raw.parse().ok())
        .expect("session id");

    let req = test::TestRequest::post()
        .uri(&format!("/api/sessions/{id}/cancel"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::ACCEPTED);
    state.controller.wait(id).await.expect("record");

    let req = test::TestRequest::post()
        .uri(&format!("/api/sessions/{id}/resume"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: ServerMessage = test::read_body_json(resp).await;
    assert_eq!(body.message_type, "error");

    let req = test::TestRequest::get()
        .uri(&format!("/api/sessions/{id}"))
        .to_request();
    let view: ServerMessage = test::call_and_read_body_json(&app, req).await;
    assert_eq!(view.game_status.as_deref(), Some("aborted"));
}

#[actix_web::test]
async fn unknown_session_is_not_found() {
    let state = app_state(Config::default());
    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .configure(configure_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri(&format!("/api/sessions/{}/pause", Uuid::new_v4()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: ServerMessage = test::read_body_json(resp).await;
    assert!(body.error.expect("error text").contains("not found"));
}

#[actix_web::test]
async fn index_serves_the_static_page_when_present() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("index.html"), "<h1>board</h1>").expect("write index");
    let mut config = Config::default();
    config.server.static_dir = dir.path().to_path_buf();

    let app = test::init_service(
        App::new()
            .app_data(app_state(config))
            .configure(configure_routes),
    )
    .await;
    let req = test::TestRequest::get().uri("/").to_request();
    let body = test::call_and_read_body(&app, req).await;
    assert_eq!(body, "<h1>board</h1>".as_bytes());

    let mut config = Config::default();
    config.server.static_dir = dir.path().join("missing");
    let app = test::init_service(
        App::new()
            .app_data(app_state(config))
            .configure(configure_routes),
    )
    .await;
    let req = test::TestRequest::get().uri("/").to_request();
    let body = test::call_and_read_body(&app, req).await;
    assert_eq!(body, "Chess referee".as_bytes());
}
