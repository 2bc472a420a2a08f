use actix_rt::time::sleep;
use futures::future::BoxFuture;
use futures::FutureExt;
use log::debug;
use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Duration;

use super::{AgentGateway, AgentRequest, GatewayFailure};
use crate::config::MockConfig;
use crate::game::codec::{DRAW_ACCEPTED, DRAW_REFUSED, REQUEST_DRAW, RESIGN};
use crate::models::AgentIdentity;

/// Agent that plays random legal moves after a random thinking delay.
///
/// Now and then it resigns or offers a draw, and it answers draw offers at
/// random, so every branch of the protocol gets exercised.
#[derive(Debug, Clone)]
pub struct MockAgent {
    identity: AgentIdentity,
    config: MockConfig,
}

impl MockAgent {
    pub fn new(identity: AgentIdentity, config: MockConfig) -> Self {
        Self { identity, config }
    }

    fn choose(&self, request: &AgentRequest) -> String {
        let mut rng = rand::thread_rng();
        let context = &request.context;

        if context.offer_to_answer() {
            return if rng.gen_bool(self.config.draw_accept_rate.clamp(0.0, 1.0)) {
                DRAW_ACCEPTED.to_string()
            } else {
                DRAW_REFUSED.to_string()
            };
        }
        if rng.gen_bool(self.config.resign_rate.clamp(0.0, 1.0)) {
            return RESIGN.to_string();
        }
        if rng.gen_bool(self.config.draw_offer_rate.clamp(0.0, 1.0)) {
            return REQUEST_DRAW.to_string();
        }
        context
            .legal_moves
            .choose(&mut rng)
            .cloned()
            .unwrap_or_else(|| RESIGN.to_string())
    }

    fn thinking_time(&self) -> Duration {
        let (min, max) = (self.config.min_delay_ms, self.config.max_delay_ms);
        if max <= min {
            return Duration::from_millis(min);
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

impl AgentGateway for MockAgent {
    fn identity(&self) -> AgentIdentity {
        self.identity.clone()
    }

    fn request(&self, request: AgentRequest) -> BoxFuture<'static, Result<String, GatewayFailure>> {
        let answer = self.choose(&request);
        let delay = self.thinking_time();
        let identity = self.identity.clone();

        async move {
            sleep(delay).await;
            debug!("{} answers {:?} after {:?}", identity, answer, delay);
            Ok(answer)
        }
        .boxed()
    }
}
