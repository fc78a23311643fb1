//! # Registry Infrastructure
//!
//! Process-wide wiring built once at start-up:
//!
//! - **ClientFactory**: collaborators and checkpoint store from settings
//! - **HandlerRegistry**: operation name → handler, shared by HTTP and CLI

pub mod client_factory;
pub mod handler_registry;

pub use client_factory::ClientFactory;
pub use handler_registry::HandlerRegistry;
