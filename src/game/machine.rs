//! Turn state machine: drives one game from the first prompt to an outcome.
//!
//! The machine owns the clocks, the record and the control channel of its
//! session. Observers only see published copies and emitted events.

use actix_rt::time::{interval_at, sleep_until, Instant};
use chess::Color;
use futures::channel::mpsc::{TryRecvError, UnboundedReceiver};
use futures::future::BoxFuture;
use futures::{pin_mut, select_biased, FutureExt, StreamExt};
use log::{debug, error, info, warn};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::game::clock::{ClockBank, ClockError, Timer};
use crate::game::codec::{
    decode, render_retry_prompt, render_turn_prompt, resolve_move, DecodeFailure, FailureReason,
    Intent, MoveRejection, PromptContext,
};
use crate::game::engine::{EngineError, Position, PositionEngine};
use crate::game::utils::color_to_string;
use crate::gateway::{AgentRequest, GatewayFailure, PromptKind, SeatGateways};
use crate::models::{
    AbortReason, CommittedMove, GameRecord, MachineState, Outcome, SessionConfig, SessionId,
    TimeoutCause,
};
use crate::session::events::{Broadcaster, Event, EventEmitter};

/// Requests from the session controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Take effect at the next ply boundary.
    Pause,
    Resume,
    Cancel,
}

/// Latest published state of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub state: MachineState,
    pub record: GameRecord,
}

pub type SharedView = Arc<RwLock<SessionView>>;

/// Stand-in deadline for waits too long to represent as an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline_after(now: Instant, wait: Duration) -> Instant {
    now.checked_add(wait).unwrap_or_else(|| now + FAR_FUTURE)
}

#[derive(Debug, thiserror::Error)]
enum Fatal {
    #[error("clock invariant violated: {0}")]
    Clock(#[from] ClockError),

    #[error("engine invariant violated: {0}")]
    Engine(String),
}

impl Fatal {
    fn into_outcome(self) -> Outcome {
        match self {
            Fatal::Clock(err) => Outcome::Aborted(AbortReason::ClockInvariant(err.to_string())),
            Fatal::Engine(msg) => Outcome::Aborted(AbortReason::EngineInvariant(msg)),
        }
    }
}

enum Ply {
    Continue(Color),
    Over(Outcome),
}

enum Verdict {
    Done(Ply),
    Failed(DecodeFailure),
}

enum Wait {
    Response(Result<String, GatewayFailure>),
    Expired,
    Cancelled,
}

enum Step {
    Response(Result<String, GatewayFailure>),
    Control(Option<Control>),
    Expired,
    Tick,
}

pub struct TurnMachine {
    record: GameRecord,
    clocks: ClockBank,
    state: MachineState,
    config: SessionConfig,
    engine: Arc<dyn PositionEngine>,
    gateways: SeatGateways,
    control: UnboundedReceiver<Control>,
    events: EventEmitter,
    shared: SharedView,
    pause_requested: bool,
}

impl TurnMachine {
    pub fn new(
        id: SessionId,
        config: SessionConfig,
        engine: Arc<dyn PositionEngine>,
        gateways: SeatGateways,
        control: UnboundedReceiver<Control>,
        broadcaster: Broadcaster,
    ) -> Self {
        let clocks = ClockBank::new(config.initial_clock);
        let record = GameRecord::new(
            id,
            config.seats.clone(),
            Position::default(),
            clocks.snapshot(Instant::now()),
        );
        let shared = Arc::new(RwLock::new(SessionView {
            state: MachineState::Init,
            record: record.clone(),
        }));

        Self {
            record,
            clocks,
            state: MachineState::Init,
            config,
            engine,
            gateways,
            control,
            events: EventEmitter::new(id, broadcaster),
            shared,
            pause_requested: false,
        }
    }

    /// Start from `position` instead of the initial position.
    pub fn with_position(mut self, position: Position) -> Self {
        self.record.position = Arc::new(position);
        self.publish();
        self
    }

    pub fn shared_view(&self) -> SharedView {
        Arc::clone(&self.shared)
    }

    /// Play until an outcome is reached and return the final record.
    pub async fn run(mut self) -> GameRecord {
        info!(
            "Session {} started: {} (white) vs {} (black)",
            self.record.id, self.record.seats.white, self.record.seats.black
        );
        self.set_state(MachineState::Init);

        let outcome = match self.play().await {
            Ok(outcome) => outcome,
            Err(fatal) => {
                error!("Session {} aborted: {}", self.record.id, fatal);
                self.events.emit(Event::Diagnostic(fatal.to_string()));
                fatal.into_outcome()
            }
        };
        self.finish(outcome)
    }

    async fn play(&mut self) -> Result<Outcome, Fatal> {
        let mut color = self.record.position.side_to_move();
        loop {
            if let Some(outcome) = self.boundary(color).await {
                return Ok(outcome);
            }
            match self.play_ply(color).await? {
                Ply::Continue(next) => color = next,
                Ply::Over(outcome) => return Ok(outcome),
            }
        }
    }

    /// Safe point between plies. No clock runs here.
    async fn boundary(&mut self, color: Color) -> Option<Outcome> {
        loop {
            match self.control.try_recv() {
                Ok(Control::Pause) => self.pause_requested = true,
                Ok(Control::Resume) => self.pause_requested = false,
                Ok(Control::Cancel) | Err(TryRecvError::Closed) => {
                    return Some(Outcome::Aborted(AbortReason::Cancelled))
                }
                Err(TryRecvError::Empty) => break,
            }
        }

        if self.pause_requested {
            info!("Session {} paused", self.record.id);
            self.set_state(MachineState::Paused);
            loop {
                match self.control.next().await {
                    Some(Control::Resume) => break,
                    Some(Control::Pause) => {}
                    Some(Control::Cancel) | None => {
                        return Some(Outcome::Aborted(AbortReason::Cancelled))
                    }
                }
            }
            self.pause_requested = false;
            info!("Session {} resumed", self.record.id);
        }

        if let Some(limit) = self.config.policy.max_plies {
            if self.record.moves.len() >= limit as usize {
                warn!("Session {} reached the ply limit ({})", self.record.id, limit);
                return Some(Outcome::Aborted(AbortReason::PlyLimit));
            }
        }

        if self.clocks.is_exhausted(color, Instant::now()) {
            return Some(Outcome::Timeout {
                loser: color,
                cause: TimeoutCause::ClockExhausted,
            });
        }
        None
    }

    async fn play_ply(&mut self, color: Color) -> Result<Ply, Fatal> {
        let position = Arc::clone(&self.record.position);
        let opponent_last = self
            .record
            .moves
            .iter()
            .rev()
            .find(|committed| committed.color != color)
            .map(|committed| committed.intent.clone());
        let context = PromptContext::new(
            self.engine.as_ref(),
            &position,
            color,
            opponent_last,
            self.record.pending_draw,
        );
        let gateway = Arc::clone(self.gateways.get(color));
        let request = AgentRequest::new(
            PromptKind::YourTurn,
            render_turn_prompt(&context),
            context.clone(),
        );

        let now = Instant::now();
        self.clocks.start(Timer::Player(color), now)?;
        self.set_state(MachineState::ToMove(color));
        let deadline = deadline_after(now, self.clocks.remaining(color, now));

        let first = match self.await_response(gateway.request(request), deadline).await {
            Wait::Response(result) => result,
            Wait::Expired => return self.flag_fall(color),
            Wait::Cancelled => return Ok(Ply::Over(Outcome::Aborted(AbortReason::Cancelled))),
        };

        let now = Instant::now();
        let player_elapsed = self.clocks.stop(Timer::Player(color), now)?;
        if self.clocks.is_exhausted(color, now) {
            return Ok(Ply::Over(Outcome::Timeout {
                loser: color,
                cause: TimeoutCause::ClockExhausted,
            }));
        }
        self.clocks.start(Timer::System, now)?;
        self.set_state(MachineState::Validating(color));

        let mut attempts_left = self.config.retry_budget;
        let mut response = first;
        loop {
            let verdict = self.interpret(
                color,
                &position,
                &context,
                response,
                player_elapsed,
                attempts_left,
            )?;
            let failure = match verdict {
                Verdict::Done(ply) => return Ok(ply),
                Verdict::Failed(failure) => failure,
            };
            warn!(
                "Session {}: invalid response from {}: {}",
                self.record.id,
                color_to_string(color),
                failure
            );

            if attempts_left == 0 {
                self.clocks.stop(Timer::System, Instant::now())?;
                return Ok(Ply::Over(Outcome::Timeout {
                    loser: color,
                    cause: TimeoutCause::RetryBudgetExhausted,
                }));
            }
            attempts_left -= 1;

            self.events.emit(Event::RetryPrompted {
                color,
                attempts_left,
                failure: failure.clone(),
            });
            self.set_state(MachineState::AwaitingRetry {
                color,
                attempts_left,
            });

            let retry = AgentRequest::new(
                PromptKind::InvalidResponseRetry,
                render_retry_prompt(&failure, &context),
                context.clone(),
            );
            let retry_timeout = self.config.policy.retry_timeout;
            let deadline = deadline_after(Instant::now(), retry_timeout);
            response = match self.await_response(gateway.request(retry), deadline).await {
                Wait::Response(result) => result,
                Wait::Expired => Err(GatewayFailure::Timeout(retry_timeout)),
                Wait::Cancelled => {
                    return Ok(Ply::Over(Outcome::Aborted(AbortReason::Cancelled)))
                }
            };
            self.set_state(MachineState::Validating(color));
        }
    }

    fn flag_fall(&mut self, color: Color) -> Result<Ply, Fatal> {
        self.clocks.stop(Timer::Player(color), Instant::now())?;
        info!("Session {}: {} ran out of time", self.record.id, color_to_string(color));
        Ok(Ply::Over(Outcome::Timeout {
            loser: color,
            cause: TimeoutCause::ClockExhausted,
        }))
    }

    /// Race an agent request against its deadline, control messages and
    /// clock ticks.
    async fn await_response(
        &mut self,
        request: BoxFuture<'static, Result<String, GatewayFailure>>,
        deadline: Instant,
    ) -> Wait {
        let mut response = request.fuse();
        let expiry = sleep_until(deadline).fuse();
        pin_mut!(expiry);
        let period = self.config.policy.tick_interval;
        let mut ticks = interval_at(deadline_after(Instant::now(), period), period);

        loop {
            let step = select_biased! {
                () = expiry => Step::Expired,
                control = self.control.next() => Step::Control(control),
                result = response => Step::Response(result),
                _ = ticks.tick().fuse() => Step::Tick,
            };

            match step {
                Step::Expired => return Wait::Expired,
                Step::Response(result) => return Wait::Response(result),
                Step::Control(Some(Control::Pause)) => {
                    debug!("Session {}: pause deferred to the next ply", self.record.id);
                    self.pause_requested = true;
                }
                Step::Control(Some(Control::Resume)) => self.pause_requested = false,
                Step::Control(Some(Control::Cancel)) | Step::Control(None) => {
                    return Wait::Cancelled
                }
                Step::Tick => {
                    let now = Instant::now();
                    let snapshot = self.clocks.snapshot(now);
                    self.record.clocks = snapshot;
                    self.events.emit(Event::ClockTick(snapshot));
                    self.publish();
                    if let Some(Timer::Player(color)) = self.clocks.running() {
                        if self.clocks.is_exhausted(color, now) {
                            return Wait::Expired;
                        }
                    }
                }
            }
        }
    }

    fn interpret(
        &mut self,
        color: Color,
        position: &Position,
        context: &PromptContext,
        response: Result<String, GatewayFailure>,
        player_elapsed: Duration,
        attempts_left: u32,
    ) -> Result<Verdict, Fatal> {
        let raw = match response {
            Ok(raw) => raw,
            Err(err) => return Ok(Verdict::Failed(DecodeFailure::gateway(err.to_string()))),
        };
        let intent = match decode(&raw, context) {
            Ok(intent) => intent,
            Err(failure) => return Ok(Verdict::Failed(failure)),
        };
        let retries = self.config.retry_budget - attempts_left;

        let ply = match &intent {
            Intent::Move(candidate) => {
                let applied = match resolve_move(self.engine.as_ref(), position, &raw, candidate) {
                    Ok(applied) => applied,
                    Err(MoveRejection::Illegal(failure)) => return Ok(Verdict::Failed(failure)),
                    Err(MoveRejection::InvariantViolation(msg)) => return Err(Fatal::Engine(msg)),
                };
                self.commit(
                    color,
                    raw,
                    intent.clone(),
                    Some(applied.position),
                    player_elapsed,
                    retries,
                )?;
                match applied.terminal {
                    Some(flag) => Ply::Over(flag.into()),
                    None => Ply::Continue(!color),
                }
            }
            Intent::RequestDraw => {
                let applied = match self.engine.pass(position) {
                    Ok(applied) => applied,
                    Err(EngineError::PassInCheck) => {
                        let failure = DecodeFailure::new(raw, FailureReason::CannotPass);
                        return Ok(Verdict::Failed(failure));
                    }
                    Err(err) => return Err(Fatal::Engine(err.to_string())),
                };
                self.commit(
                    color,
                    raw,
                    intent.clone(),
                    Some(applied.position),
                    player_elapsed,
                    retries,
                )?;
                match applied.terminal {
                    Some(flag) => Ply::Over(flag.into()),
                    None => Ply::Continue(!color),
                }
            }
            Intent::Resign => {
                self.commit(color, raw, intent.clone(), None, player_elapsed, retries)?;
                Ply::Over(Outcome::Resignation { loser: color })
            }
            Intent::DrawAccepted => {
                self.commit(color, raw, intent.clone(), None, player_elapsed, retries)?;
                Ply::Over(Outcome::DrawAgreed)
            }
            Intent::DrawRefused => {
                self.commit(color, raw, intent.clone(), None, player_elapsed, retries)?;
                Ply::Continue(color)
            }
        };
        Ok(Verdict::Done(ply))
    }

    /// Append an accepted response to the record and stop the system clock.
    fn commit(
        &mut self,
        color: Color,
        raw: String,
        intent: Intent,
        position: Option<Position>,
        player_elapsed: Duration,
        retries: u32,
    ) -> Result<(), Fatal> {
        let now = Instant::now();
        if let Some(next) = position {
            self.record.position = Arc::new(next);
        }
        self.clocks.stop(Timer::System, now)?;

        match intent {
            Intent::RequestDraw => self.record.pending_draw = Some(color),
            _ if self.record.pending_draw == Some(!color) => self.record.pending_draw = None,
            _ => {}
        }
        if matches!(intent, Intent::Move(_)) && !self.config.increment.is_zero() {
            self.clocks.credit(color, self.config.increment)?;
        }

        let committed = CommittedMove {
            color,
            ply: self.record.moves.len() as u32 + 1,
            raw,
            intent,
            position: Arc::clone(&self.record.position),
            player_elapsed,
            retries,
        };
        info!(
            "Session {} ply {}: {} plays {}",
            self.record.id,
            committed.ply,
            color_to_string(color),
            committed.intent
        );
        self.record.moves.push(committed.clone());
        self.record.clocks = self.clocks.snapshot(now);
        self.events.emit(Event::MoveCommitted(committed));
        self.publish();
        Ok(())
    }

    fn finish(mut self, outcome: Outcome) -> GameRecord {
        let now = Instant::now();
        if let Some((timer, elapsed)) = self.clocks.stop_any(now) {
            debug!("Session {}: stopped {} clock after {:?}", self.record.id, timer, elapsed);
        }
        self.record.pending_draw = None;
        self.record.clocks = self.clocks.snapshot(now);
        self.record.outcome = Some(outcome.clone());
        info!("Session {} over: {}", self.record.id, outcome);

        self.set_state(MachineState::Terminal(outcome.clone()));
        self.events.emit(Event::GameEnded {
            outcome,
            clocks: self.record.clocks,
        });
        self.record
    }

    fn set_state(&mut self, state: MachineState) {
        self.state = state.clone();
        self.events.emit(Event::StateChanged(state));
        self.publish();
    }

    fn publish(&self) {
        let mut view = self.shared.write().unwrap_or_else(PoisonError::into_inner);
        view.state = self.state.clone();
        view.record = self.record.clone();
    }
}
