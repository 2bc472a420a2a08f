//! Referee for chess games played between LLM agents.

pub mod cli;
pub mod config;
pub mod game;
pub mod gateway;
pub mod models;
pub mod play;
pub mod routes;
pub mod server;
pub mod session;
pub mod websocket;
