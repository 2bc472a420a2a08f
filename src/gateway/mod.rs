//! Agent gateway: how the referee talks to the agents occupying the seats.
//!
//! A gateway answers one prompt at a time and never retries on its own;
//! retries belong to the turn machine. Dropping the returned future cancels
//! the request.

use chess::Color;
use futures::future::BoxFuture;
use log::warn;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AgentsConfig;
use crate::game::codec::{PromptContext, SYSTEM_PROMPT};
use crate::models::{AgentIdentity, Seats};

pub mod chat;
pub mod mock;

pub use chat::ChatAgent;
pub use mock::MockAgent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    YourTurn,
    InvalidResponseRetry,
}

/// A single prompt for the agent sitting at `color`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRequest {
    pub color: Color,
    pub kind: PromptKind,
    pub system: &'static str,
    pub prompt: String,
    pub context: PromptContext,
}

impl AgentRequest {
    pub fn new(kind: PromptKind, prompt: String, context: PromptContext) -> Self {
        Self {
            color: context.color,
            kind,
            system: SYSTEM_PROMPT,
            prompt,
            context,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayFailure {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("agent endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("agent returned no content")]
    EmptyResponse,

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("API key not found in environment variable {0}")]
    MissingApiKey(String),

    #[error("unknown provider or model: {0}")]
    UnknownAgent(String),
}

pub trait AgentGateway: Send + Sync {
    fn identity(&self) -> AgentIdentity;

    fn request(&self, request: AgentRequest) -> BoxFuture<'static, Result<String, GatewayFailure>>;
}

/// The gateways bound to the two seats of one game.
#[derive(Clone)]
pub struct SeatGateways {
    pub white: Arc<dyn AgentGateway>,
    pub black: Arc<dyn AgentGateway>,
}

impl SeatGateways {
    pub fn new(white: Arc<dyn AgentGateway>, black: Arc<dyn AgentGateway>) -> Self {
        Self { white, black }
    }

    pub fn get(&self, color: Color) -> &Arc<dyn AgentGateway> {
        match color {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }
}

/// Builds the gateways for a new session.
pub trait GatewayFactory: Send + Sync {
    fn seat_gateways(&self, seats: &Seats) -> SeatGateways;
}

impl<F> GatewayFactory for F
where
    F: Fn(&Seats) -> SeatGateways + Send + Sync,
{
    fn seat_gateways(&self, seats: &Seats) -> SeatGateways {
        self(seats)
    }
}

/// Gateways built from the `[agents]` and `[providers]` configuration.
///
/// A seat whose provider cannot be set up (unknown model, missing API key)
/// falls back to the mock agent so a game can still be played.
pub struct ConfiguredGateways {
    config: AgentsConfig,
    client: reqwest::Client,
}

impl ConfiguredGateways {
    pub fn new(config: AgentsConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn build(&self, identity: &AgentIdentity) -> Result<Arc<dyn AgentGateway>, GatewayFailure> {
        if identity.provider == "mock" || identity.model == "mock" {
            return Ok(Arc::new(MockAgent::new(identity.clone(), self.config.mock.clone())));
        }
        let agent = ChatAgent::from_config(identity, &self.config, self.client.clone())?;
        Ok(Arc::new(agent))
    }

    fn build_or_mock(&self, identity: &AgentIdentity, seat: &str) -> Arc<dyn AgentGateway> {
        match self.build(identity) {
            Ok(gateway) => gateway,
            Err(err) => {
                warn!("Failed to init {} agent {}: {}, using mock", seat, identity, err);
                Arc::new(MockAgent::new(
                    AgentIdentity::new("mock", format!("mock-{seat}")),
                    self.config.mock.clone(),
                ))
            }
        }
    }
}

impl GatewayFactory for ConfiguredGateways {
    fn seat_gateways(&self, seats: &Seats) -> SeatGateways {
        SeatGateways::new(
            self.build_or_mock(&seats.white, "white"),
            self.build_or_mock(&seats.black, "black"),
        )
    }
}
