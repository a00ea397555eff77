//! Solemend order funnel service
//!
//! Backend for a shoe-restoration quote/checkout funnel.
//!
//! ## Features
//! - Flat-file order store with merge-on-upsert reconciliation
//! - Payment-provider webhook intake (checkout completion)
//! - Shipping-label creation and status polling with append-only history
//! - Abandoned-checkout follow-up staging (three escalation tiers)

use thiserror::Error;

pub mod config;
pub mod domain;
pub mod sendcloud;
pub mod store;
pub mod webhook;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum OrderFlowError {
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("{0}")]
    Precondition(String),

    #[error("Upstream request failed ({status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("Store error: {0}")]
    Store(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, OrderFlowError>;
