//! # Service Error Type
//!
//! One error type for every operation this crate exposes.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Tally POS                              │
//! │                                                                         │
//! │  ValidationError / CoreError        DbError                             │
//! │  (tally-core)                       (tally-db)                          │
//! │        │                               │                                │
//! │        └──────────────┬────────────────┘                                │
//! │                       ▼                                                 │
//! │                 ServiceError  ──── code() ───►  ErrorCode               │
//! │                       │                                                 │
//! │                       ▼                                                 │
//! │              ErrorPayload { code, message }   (what a UI receives)     │
//! │              {"code":"INSUFFICIENT_STOCK","message":"..."}             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Partial Effects
//! Sale completion either changes everything or nothing. Payment application
//! is a sequence of independent sale updates, so a failure half way through
//! is reported as [`ServiceError::PartialApplication`] with the allocations
//! that did commit.

use serde::Serialize;
use thiserror::Error;
use tracing::error;

use tally_core::{Allocation, CoreError, Money, SaleId, ValidationError};
use tally_db::DbError;

/// Result type alias for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    // =========================================================================
    // Input Errors (nothing was read or written)
    // =========================================================================
    /// A field or record failed validation.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("No client selected")]
    NoClientSelected,

    #[error("Payment amount must be positive, got {0}")]
    NonPositiveAmount(Money),

    #[error("Invalid quantity {quantity} for {product}")]
    InvalidQuantity { product: String, quantity: i64 },

    // =========================================================================
    // Sale Errors (nothing was written)
    // =========================================================================
    #[error("Insufficient stock for {product}: available {available}, requested {requested}")]
    InsufficientStock {
        product: String,
        available: i64,
        requested: i64,
    },

    /// A product in the cart was deleted from the catalog.
    #[error("Product no longer exists: {0}")]
    ProductGone(String),

    /// Every attempt lost to a concurrent writer.
    #[error("Gave up after {attempts} conflicting attempt(s)")]
    Conflict { attempts: u32 },

    // =========================================================================
    // Payment Errors (some writes may have happened)
    // =========================================================================
    /// A payment stopped part way.
    ///
    /// `applied` lists the sale updates that committed. `failed_sale` is the
    /// sale whose update failed, or `None` when every sale update succeeded
    /// and writing the payment record failed.
    #[error(
        "Payment partly applied: {} sale update(s) committed, then {}",
        .applied.len(),
        failed_step(.failed_sale)
    )]
    PartialApplication {
        applied: Vec<Allocation>,
        failed_sale: Option<SaleId>,
        #[source]
        source: DbError,
    },

    // =========================================================================
    // Store Errors
    // =========================================================================
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Any other store failure.
    #[error("Store error: {0}")]
    Store(#[source] DbError),

    /// A business rule from tally-core without a more specific variant.
    #[error("{0}")]
    Rule(#[source] CoreError),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),
}

fn failed_step(failed_sale: &Option<SaleId>) -> String {
    match failed_sale {
        Some(id) => format!("sale {} failed", id),
        None => "the payment record failed".to_string(),
    }
}

impl ServiceError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        ServiceError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Machine-readable category.
    pub fn code(&self) -> ErrorCode {
        match self {
            ServiceError::Validation(_)
            | ServiceError::EmptyCart
            | ServiceError::NoClientSelected
            | ServiceError::NonPositiveAmount(_)
            | ServiceError::InvalidQuantity { .. } => ErrorCode::ValidationError,
            ServiceError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            ServiceError::ProductGone(_) => ErrorCode::ProductGone,
            ServiceError::Conflict { .. } => ErrorCode::Conflict,
            ServiceError::PartialApplication { .. } => ErrorCode::PartialApplication,
            ServiceError::NotFound { .. } => ErrorCode::NotFound,
            ServiceError::StoreUnavailable(_) => ErrorCode::StoreUnavailable,
            ServiceError::Store(_) => ErrorCode::DatabaseError,
            ServiceError::Rule(_) => ErrorCode::BusinessLogic,
            ServiceError::InvalidConfig(_)
            | ServiceError::ConfigLoadFailed(_)
            | ServiceError::ConfigSaveFailed(_) => ErrorCode::ConfigError,
        }
    }

    /// True for rejected input.
    pub fn is_validation(&self) -> bool {
        self.code() == ErrorCode::ValidationError
    }

    /// True if a concurrent writer caused the failure.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ServiceError::Conflict { .. })
    }

    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

// =============================================================================
// Error Payload
// =============================================================================

/// Error codes for UI layers.
///
/// ## Usage in a Frontend
/// ```typescript
/// switch (e.code) {
///   case 'INSUFFICIENT_STOCK': refreshCart(); break;
///   case 'PARTIAL_APPLICATION': reloadDebts(); break;
///   case 'CONFLICT': retryLater(); break;
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    InsufficientStock,
    ProductGone,
    Conflict,
    PartialApplication,
    NotFound,
    StoreUnavailable,
    DatabaseError,
    BusinessLogic,
    ConfigError,
}

/// What a UI receives when an operation fails.
///
/// ```json
/// { "code": "NOT_FOUND", "message": "Client not found: 1b4e..." }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&ServiceError> for ErrorPayload {
    fn from(err: &ServiceError) -> Self {
        err.to_payload()
    }
}

impl From<ServiceError> for ErrorPayload {
    fn from(err: ServiceError) -> Self {
        err.to_payload()
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<DbError> for ServiceError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ServiceError::NotFound { entity, id },
            DbError::Conflict { .. } => ServiceError::Conflict { attempts: 1 },
            DbError::UniqueViolation { field, value } => {
                ServiceError::Validation(ValidationError::Duplicate { field, value })
            }
            DbError::Unavailable(msg) | DbError::ConnectionFailed(msg) => {
                ServiceError::StoreUnavailable(msg)
            }
            DbError::PoolExhausted => {
                ServiceError::StoreUnavailable("connection pool exhausted".to_string())
            }
            other => {
                error!(error = %other, "Store operation failed");
                ServiceError::Store(other)
            }
        }
    }
}

impl From<CoreError> for ServiceError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(e) => ServiceError::Validation(e),
            CoreError::InsufficientStock {
                product,
                available,
                requested,
            } => ServiceError::InsufficientStock {
                product,
                available,
                requested,
            },
            CoreError::ProductNotFound(id) => ServiceError::not_found("Product", id),
            other => ServiceError::Rule(other),
        }
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for ServiceError {
    fn from(err: toml::de::Error) -> Self {
        ServiceError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for ServiceError {
    fn from(err: toml::ser::Error) -> Self {
        ServiceError::ConfigSaveFailed(err.to_string())
    }
}
