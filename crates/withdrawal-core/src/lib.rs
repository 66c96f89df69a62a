//! Core engine for the withdrawal processor.
//!
//! This crate holds the state machines for withdrawals and raw broadcasts,
//! the processors that drive them on every broker delivery, their
//! terminal-failure handlers, the intake and cancel operations, and the
//! engine whose dispatch loop ties the broker to the processors. Components
//! are built once by [`WithdrawalBuilder`] and shared by `Arc`.

pub mod builder;
pub mod engine;
pub mod handlers;
pub mod lock;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::{BuilderError, WithdrawalBuilder, WithdrawalFactories};
pub use engine::{EngineError, WithdrawalEngine};
pub use handlers::{
	BroadcastProcessor, IntakeHandler, ProcessingError, RequestError, WithdrawalProcessor,
};
pub use state::{BroadcastStateMachine, StateError, WithdrawalStateMachine};
