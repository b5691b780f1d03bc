//! Decision-driven task pipeline for turning building models into simulation
//! inputs.
//!
//! Tasks run on a [`playground::Playground`] and suspend with batches of
//! [`decision::Decision`]s whenever they need a human answer. Answers come
//! from a [`frontend::Frontend`] and are persisted across runs by
//! [`persistence::DecisionStore`].

pub mod cli;
pub mod config;
pub mod decision;
pub mod error;
pub mod frontend;
pub mod persistence;
pub mod playground;
pub mod tasks;
pub mod ui;
