// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Service catalog for the Area automation broker.
//!
//! Declares which services exist, what their actions and reactions accept,
//! and wires each capability to the poller or executor that runs it.

pub mod builtin;
pub mod catalog;
pub mod http;
pub mod registry;
pub mod schema;

pub use catalog::{BUILTIN_SERVICES, CapabilityDef, ServiceDef, reaction_name_to_key};
pub use http::HttpSettings;
pub use registry::{ServiceRegistry, ServiceRegistryBuilder};
pub use schema::{ExtraKeys, ParamSpec, validate_params};
