//! Headless game: play one session in the terminal.

use futures::StreamExt;
use log::{debug, error, info, warn};
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::game::utils::color_to_string;
use crate::game::ChessEngine;
use crate::gateway::ConfiguredGateways;
use crate::models::{GameRecord, SessionConfig};
use crate::session::{Event, SessionController, SessionError, SessionEvent};
use chess::Color;

/// Start a session, log its events until it ends and return the record.
pub async fn play_game(
    controller: &SessionController,
    config: SessionConfig,
) -> Result<GameRecord, SessionError> {
    let mut events = controller.subscribe();
    let id = controller.start(config);
    while let Some(event) = events.next().await {
        if event.session_id != id {
            continue;
        }
        log_event(&event);
        if matches!(event.event, Event::GameEnded { .. }) {
            break;
        }
    }
    controller.wait(id).await
}

/// Play one game with the agents from `config`.
pub async fn run(config: &Config, session: SessionConfig) -> Result<GameRecord, SessionError> {
    info!(
        "Agents: white {} / black {}",
        session.seats.white, session.seats.black
    );
    let controller = SessionController::new(
        Arc::new(ChessEngine),
        Arc::new(ConfiguredGateways::new(config.agents.clone())),
    );
    play_game(&controller, session).await
}

fn log_event(event: &SessionEvent) {
    match &event.event {
        Event::StateChanged(state) => debug!("state: {:?}", state),
        Event::ClockTick(clocks) => debug!(
            "clocks: white {:?} black {:?} system {:?}",
            clocks.white, clocks.black, clocks.system
        ),
        Event::MoveCommitted(committed) => info!(
            "ply {}: {} played {} ({:.2}s)",
            committed.ply,
            color_to_string(committed.color),
            committed.intent,
            committed.player_elapsed.as_secs_f64()
        ),
        Event::RetryPrompted {
            color,
            attempts_left,
            failure,
        } => warn!(
            "{} gave an invalid response ({}), {} attempt(s) left",
            color_to_string(*color),
            failure.reason,
            attempts_left
        ),
        Event::Diagnostic(message) => error!("{}", message),
        Event::GameEnded { outcome, .. } => info!("game over: {}", outcome),
    }
}

fn average(record: &GameRecord, color: Color) -> Option<Duration> {
    let count = record.moves.iter().filter(|m| m.color == color).count() as u32;
    (count > 0).then(|| record.player_time(color) / count)
}

/// Human-readable summary of a finished game.
pub fn summary(record: &GameRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Game completed!");
    let _ = writeln!(out, "Final board: {}", record.position.fen());
    match &record.outcome {
        Some(outcome) => {
            let _ = writeln!(out, "Result: {}", outcome);
            let winner = match outcome.winner() {
                Some(color) => color_to_string(color),
                None if outcome.is_draw() => "none (draw)".to_string(),
                None => "none".to_string(),
            };
            let _ = writeln!(out, "Winner: {}", winner);
        }
        None => {
            let _ = writeln!(out, "Result: unfinished");
        }
    }

    let _ = writeln!(out, "\nGame log:");
    for committed in &record.moves {
        let _ = writeln!(
            out,
            "  Ply {}: {} played {} ({:.2}s, {} retries)",
            committed.ply,
            color_to_string(committed.color),
            committed.intent,
            committed.player_elapsed.as_secs_f64(),
            committed.retries
        );
    }

    for color in [Color::White, Color::Black] {
        if let Some(avg) = average(record, color) {
            let _ = writeln!(
                out,
                "{} average response time: {:.2}s",
                color_to_string(color),
                avg.as_secs_f64()
            );
        }
    }
    let _ = write!(
        out,
        "Clocks: white {:.1}s, black {:.1}s, system {:.1}s",
        record.clocks.white.as_secs_f64(),
        record.clocks.black.as_secs_f64(),
        record.clocks.system.as_secs_f64()
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::clock::ClockBank;
    use crate::game::codec::Intent;
    use crate::game::engine::Position;
    use crate::models::{AbortReason, AgentIdentity, CommittedMove, Outcome, Seats};
    use actix_rt::time::Instant;
    use uuid::Uuid;

    #[test]
    fn summary_lists_plies_and_result() {
        let seats = Seats {
            white: AgentIdentity::mock(),
            black: AgentIdentity::mock(),
        };
        let clocks = ClockBank::new(Duration::from_secs(60)).snapshot(Instant::now());
        let mut record = GameRecord::new(Uuid::nil(), seats, Position::default(), clocks);
        record.moves.push(CommittedMove {
            color: Color::White,
            ply: 1,
            raw: "e2e4".into(),
            intent: Intent::Move("e2e4".into()),
            position: Arc::clone(&record.position),
            player_elapsed: Duration::from_millis(1500),
            retries: 1,
        });
        record.outcome = Some(Outcome::Resignation { loser: Color::Black });

        let text = summary(&record);
        assert!(text.contains("Result: black resigns"));
        assert!(text.contains("Winner: white"));
        assert!(text.contains("Ply 1: white played e2e4 (1.50s, 1 retries)"));
        assert!(text.contains("white average response time: 1.50s"));
        assert!(!text.contains("black average"));

        record.outcome = Some(Outcome::DrawAgreed);
        assert!(summary(&record).contains("Winner: none (draw)"));

        record.outcome = Some(Outcome::Aborted(AbortReason::Cancelled));
        assert!(summary(&record).contains("Winner: none\n"));
    }
}
