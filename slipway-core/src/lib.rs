//! Slipway Core
//!
//! Core types and abstractions for the Slipway deployment pipeline.
//!
//! This crate contains:
//! - Domain types: tenants, deployment attempts, script identities, file sets
//! - Routing: hostname resolution shared by the edge and the publisher
//! - DTOs: Data transfer objects for inter-service communication

pub mod domain;
pub mod dto;
pub mod routing;
