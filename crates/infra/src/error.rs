//! Storage and application-level error types.

use thiserror::Error;

use kart_core::{CartId, DomainError};

use crate::config::ConfigError;

/// Repository operation error.
///
/// These are **storage errors** (missing rows, duplicate keys, backend
/// failures) as opposed to domain errors (validation, invariants).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("record already exists: {0}")]
    AlreadyExists(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Error surfaced by order operations and the lifecycle reactor.
///
/// Domain and storage errors pass through unchanged so callers can tell a
/// rejected operation from a failed write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrdersError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cart not found: {0}")]
    CartNotFound(CartId),
    #[error("order not found: {0}")]
    OrderNotFound(String),
    #[error("product purchase not found: {0}")]
    PurchaseNotFound(String),
}

pub type OrdersResult<T> = Result<T, OrdersError>;
