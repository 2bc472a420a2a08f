use actix_files as fs;
use actix_web::{web, App, HttpServer};
use log::info;
use std::sync::Arc;

use crate::config::Config;
use crate::game::ChessEngine;
use crate::gateway::ConfiguredGateways;
use crate::models::AppState;
use crate::routes;
use crate::session::SessionController;

/// Run the web server until it is stopped, then cancel every session.
pub async fn serve(config: Config) -> std::io::Result<()> {
    let controller = Arc::new(
        SessionController::new(
            Arc::new(ChessEngine),
            Arc::new(ConfiguredGateways::new(config.agents.clone())),
        )
        .with_finished_retention(config.server.finished_retention),
    );
    let bind = config.server.bind.clone();
    let static_dir = config.server.static_dir.clone();

    // Create shared application state
    let app_state = web::Data::new(AppState::new(
        Arc::clone(&controller),
        Arc::new(config),
    ));

    info!("Starting chess referee at http://{}", bind);
    if !static_dir.is_dir() {
        info!("Static directory {} not found, not serving /static", static_dir.display());
    }

    HttpServer::new(move || {
        let app = App::new()
            .app_data(app_state.clone())
            .configure(routes::configure_routes);
        if static_dir.is_dir() {
            app.service(fs::Files::new("/static", static_dir.clone()))
        } else {
            app
        }
    })
    .bind(&bind)?
    .run()
    .await?;

    controller.shutdown().await;
    Ok(())
}
