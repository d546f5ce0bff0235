//! Twind
//!
//! Digital-twin server: an HTTP API over a [`twin_core::Registry`] that
//! announces every change on a [`twin_core::EventBus`].

pub mod config;
pub mod events;
pub mod server;
