pub mod clock;
pub mod codec;
pub mod engine;
pub mod machine;
pub mod utils;

pub use clock::{ClockBank, ClockError, ClockSnapshot, Timer};
pub use codec::{DecodeFailure, FailureReason, Intent, PromptContext};
pub use engine::{ChessEngine, DrawRule, EngineError, Position, PositionEngine};
pub use machine::{Control, SessionView, SharedView, TurnMachine};
