//! # tally-core: Pure Business Logic for Tally POS
//!
//! Everything in here is deterministic and free of I/O. The store and the
//! service layer build on these types; nothing in this crate knows that a
//! database exists.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally POS Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 tally-service (orchestration)                   │   │
//! │  │   SaleCoordinator · DebtLedger · CatalogService · LiveView      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌───────┐ ┌───────┐ ┌────────┐ ┌────────┐        │   │
//! │  │   │  types  │ │ money │ │ cart  │ │ ledger │ │ report │        │   │
//! │  │   │ Product │ │ Money │ │ Cart  │ │  plan  │ │ totals │        │   │
//! │  │   │  Sale   │ │       │ │       │ │        │ │        │        │   │
//! │  │   └─────────┘ └───────┘ └───────┘ └────────┘ └────────┘        │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    tally-db (Catalog Store)                     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Records (Product, Client, Sale, Payment) with validating constructors
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`cart`] - Ephemeral cart with stock-clamped quantities
//! - [`ledger`] - Oldest-first payment allocation
//! - [`report`] - Sales, debt and dashboard aggregations
//! - [`validation`] - Field-level rules
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use tally_core::money::Money;
//!
//! let price = Money::from_cents(1099); // $10.99
//! let line = price * 3_i64;
//! assert_eq!(line.cents(), 3297);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod error;
pub mod ledger;
pub mod money;
pub mod report;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cart::{Cart, CartItem};
pub use error::{CoreError, CoreResult, ValidationError};
pub use ledger::{allocate_payment, Allocation, AllocationPlan};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Products at or below this stock level show up as "low stock".
pub const LOW_STOCK_THRESHOLD: i64 = 10;

/// Maximum distinct lines allowed in a single cart.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single line.
///
/// ## Business Reason
/// Catches typos like 1000 instead of 10 before they reach the register.
pub const MAX_ITEM_QUANTITY: i64 = 999;
