// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pollers and executors shipped with the broker.

pub mod discord;
pub mod github;
pub mod google;
pub mod timer;
