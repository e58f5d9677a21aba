// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Area engine.
//!
//! A tick-driven scheduler feeds due Areas through a bounded queue to a fixed
//! pool of workers. Each worker leases one Area, polls its action, delivers
//! reactions for new events, and commits the outcome in a single transaction.

pub mod evaluator;
pub mod scheduler;
pub mod settings;
pub mod shutdown;
pub mod template;

pub use evaluator::{Evaluation, Evaluator, RetryStats};
pub use scheduler::{DispatchReport, Engine, TickReport};
pub use settings::EngineSettings;
pub use shutdown::{drain, install_signal_handler};
