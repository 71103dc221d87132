//! # Domain Types
//!
//! Records of the Tally POS domain.
//!
//! ## Entity Relationship
//! ```text
//! ┌──────────────┐         ┌──────────────┐         ┌──────────────┐
//! │   Product    │         │     Sale     │         │    Client    │
//! │──────────────│         │──────────────│         │──────────────│
//! │ id           │◄────┐   │ id           │   ┌────►│ id           │
//! │ name         │     │   │ client_id    │───┘     │ name, phone  │
//! │ sku          │     │   │ client_name  │ frozen  │ email?       │
//! │ price        │     │   │ lines[]      │         │ created_at   │
//! │ stock ≥ 0    │     └───│  product_id  │         └──────▲───────┘
//! └──────────────┘  frozen │  name, qty   │                │
//!                   copy   │  unit_price  │         ┌──────┴───────┐
//!                          │ total        │         │   Payment    │
//!                          │ amount_paid  │         │──────────────│
//!                          │ status       │         │ client_id    │
//!                          └──────────────┘         │ amount > 0   │
//!                                                   └──────────────┘
//! ```
//!
//! Records with invariants (`Product`, `Client`, `Sale`, `Payment`) keep their
//! fields private and are only built through validating constructors. The
//! `restore` constructors are what the store uses when loading a record back;
//! they run the same checks so a corrupt row never becomes a live value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError, ValidationResult};
use crate::money::Money;
use crate::validation::{
    validate_client_name, validate_email, validate_payment_amount, validate_phone,
    validate_price, validate_product_name, validate_sku, validate_stock,
};

// =============================================================================
// Identifiers
// =============================================================================

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
        #[ts(export)]
        pub struct $name(String);

        impl $name {
            /// Generates a fresh UUID v4 identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

record_id!(
    /// Identifier of a [`Product`].
    ProductId
);
record_id!(
    /// Identifier of a [`Client`].
    ClientId
);
record_id!(
    /// Identifier of a [`Sale`].
    SaleId
);
record_id!(
    /// Identifier of a [`Payment`].
    PaymentId
);

// =============================================================================
// Product
// =============================================================================

/// A product available for sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct Product {
    id: ProductId,
    /// Display name shown on the register and frozen into sale lines.
    name: String,
    /// Free-text stock keeping code.
    sku: String,
    /// Unit price in cents.
    price: Money,
    /// Units on hand. Never negative.
    stock: i64,
}

/// Input for creating a product.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewProduct {
    pub name: String,
    pub sku: String,
    pub price: Money,
    pub stock: i64,
}

impl NewProduct {
    pub fn validate(&self) -> ValidationResult<()> {
        validate_product_name(&self.name)?;
        validate_sku(&self.sku)?;
        validate_price(self.price)?;
        validate_stock(self.stock)?;
        Ok(())
    }
}

/// Editable product fields. Stock is not here: it only moves
/// through store transactions.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductDetails {
    pub name: String,
    pub sku: String,
    pub price: Money,
}

impl ProductDetails {
    pub fn validate(&self) -> ValidationResult<()> {
        validate_product_name(&self.name)?;
        validate_sku(&self.sku)?;
        validate_price(self.price)?;
        Ok(())
    }
}

impl Product {
    pub fn new(id: ProductId, input: NewProduct) -> ValidationResult<Self> {
        input.validate()?;
        Ok(Self {
            id,
            name: input.name.trim().to_string(),
            sku: input.sku.trim().to_string(),
            price: input.price,
            stock: input.stock,
        })
    }

    /// Rebuilds a product loaded from the store.
    pub fn restore(
        id: ProductId,
        name: String,
        sku: String,
        price: Money,
        stock: i64,
    ) -> ValidationResult<Self> {
        Self::new(
            id,
            NewProduct {
                name,
                sku,
                price,
                stock,
            },
        )
    }

    /// Returns a copy with new name/sku/price and the same stock.
    pub fn with_details(&self, details: ProductDetails) -> ValidationResult<Self> {
        details.validate()?;
        Ok(Self {
            id: self.id.clone(),
            name: details.name.trim().to_string(),
            sku: details.sku.trim().to_string(),
            price: details.price,
            stock: self.stock,
        })
    }

    /// Returns a copy with a different stock level.
    pub fn with_stock(&self, stock: i64) -> ValidationResult<Self> {
        validate_stock(stock)?;
        Ok(Self {
            stock,
            ..self.clone()
        })
    }

    #[inline]
    pub fn id(&self) -> &ProductId {
        &self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn sku(&self) -> &str {
        &self.sku
    }

    #[inline]
    pub fn price(&self) -> Money {
        self.price
    }

    #[inline]
    pub fn stock(&self) -> i64 {
        self.stock
    }

    pub fn can_sell(&self, quantity: i64) -> bool {
        quantity > 0 && self.stock >= quantity
    }
}

// =============================================================================
// Client
// =============================================================================

/// A customer who can buy on credit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct Client {
    id: ClientId,
    name: String,
    phone: String,
    email: Option<String>,
    #[ts(as = "String")]
    created_at: DateTime<Utc>,
}

/// Editable contact fields of a client (also the creation input).
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ClientContact {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
}

/// Input for creating a client.
pub type NewClient = ClientContact;

impl ClientContact {
    pub fn validate(&self) -> ValidationResult<()> {
        validate_client_name(&self.name)?;
        validate_phone(&self.phone)?;
        validate_email(self.email.as_deref())?;
        Ok(())
    }

    fn normalized_email(&self) -> Option<String> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string)
    }
}

impl Client {
    pub fn new(id: ClientId, input: NewClient, created_at: DateTime<Utc>) -> ValidationResult<Self> {
        input.validate()?;
        Ok(Self {
            id,
            name: input.name.trim().to_string(),
            phone: input.phone.trim().to_string(),
            email: input.normalized_email(),
            created_at,
        })
    }

    /// Rebuilds a client loaded from the store.
    pub fn restore(
        id: ClientId,
        name: String,
        phone: String,
        email: Option<String>,
        created_at: DateTime<Utc>,
    ) -> ValidationResult<Self> {
        Self::new(id, ClientContact { name, phone, email }, created_at)
    }

    /// Returns a copy with new contact fields. Identity and `created_at`
    /// are kept.
    pub fn with_contact(&self, contact: ClientContact) -> ValidationResult<Self> {
        Self::new(self.id.clone(), contact, self.created_at)
    }

    #[inline]
    pub fn id(&self) -> &ClientId {
        &self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn phone(&self) -> &str {
        &self.phone
    }

    #[inline]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    #[inline]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The (id, name) pair frozen into sales and payments.
    pub fn to_ref(&self) -> ClientRef {
        ClientRef::from(self)
    }
}

/// A client as referenced from a sale or payment: id plus the name at the
/// time of the event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ClientRef {
    pub id: ClientId,
    pub name: String,
}

impl From<&Client> for ClientRef {
    fn from(client: &Client) -> Self {
        Self {
            id: client.id.clone(),
            name: client.name.clone(),
        }
    }
}

// =============================================================================
// Sale Status / Payment Mode
// =============================================================================

/// Settlement state of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// amount_paid ≥ total.
    Paid,
    /// Something is still owed.
    Pending,
}

impl SaleStatus {
    /// The only way a status is ever derived.
    #[inline]
    pub fn from_amounts(amount_paid: Money, total: Money) -> Self {
        if amount_paid >= total {
            SaleStatus::Paid
        } else {
            SaleStatus::Pending
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Paid => "paid",
            SaleStatus::Pending => "pending",
        }
    }
}

/// How the customer settles a new sale at the register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    /// Paid in full now.
    Paid,
    /// On credit; the whole total becomes debt.
    Pending,
}

// =============================================================================
// Sale Line
// =============================================================================

/// A line of a sale. Name and price are frozen at the time of sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price: Money,
}

impl SaleLine {
    #[inline]
    pub fn line_total(&self) -> CoreResult<Money> {
        self.unit_price.multiply_quantity(self.quantity)
    }

    fn validate(&self) -> ValidationResult<()> {
        if self.quantity <= 0 {
            return Err(ValidationError::must_be_positive("quantity"));
        }
        validate_price(self.unit_price)
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A recorded sale.
///
/// ## Invariants
/// - `lines` is non-empty
/// - `total` = Σ unit_price × quantity, fixed at creation
/// - 0 ≤ `amount_paid` ≤ `total`
/// - `status` is Paid iff `amount_paid` ≥ `total`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct Sale {
    id: SaleId,
    client_id: ClientId,
    client_name: String,
    lines: Vec<SaleLine>,
    total: Money,
    amount_paid: Money,
    status: SaleStatus,
    #[ts(as = "String")]
    created_at: DateTime<Utc>,
}

impl Sale {
    pub fn new(
        id: SaleId,
        client: &ClientRef,
        lines: Vec<SaleLine>,
        mode: PaymentMode,
        created_at: DateTime<Utc>,
    ) -> CoreResult<Self> {
        if lines.is_empty() {
            return Err(ValidationError::required("lines").into());
        }
        for line in &lines {
            line.validate()?;
        }

        let total = Self::total_of(&lines)?;
        let amount_paid = match mode {
            PaymentMode::Paid => total,
            PaymentMode::Pending => Money::zero(),
        };

        Ok(Self {
            id,
            client_id: client.id.clone(),
            client_name: client.name.clone(),
            lines,
            total,
            amount_paid,
            status: SaleStatus::from_amounts(amount_paid, total),
            created_at,
        })
    }

    /// Σ unit_price × quantity, failing if it does not fit in cents.
    pub fn total_of(lines: &[SaleLine]) -> CoreResult<Money> {
        lines.iter().try_fold(Money::zero(), |acc, line| {
            Money::checked_sum([acc, line.line_total()?])
        })
    }

    /// Rebuilds a sale loaded from the store, checking every invariant.
    pub fn restore(
        id: SaleId,
        client: ClientRef,
        lines: Vec<SaleLine>,
        total: Money,
        amount_paid: Money,
        created_at: DateTime<Utc>,
    ) -> CoreResult<Self> {
        let corrupt = |reason: String| CoreError::CorruptRecord {
            entity: "sale",
            id: id.to_string(),
            reason,
        };

        if lines.is_empty() {
            return Err(corrupt("sale has no lines".to_string()));
        }
        for line in &lines {
            line.validate()
                .map_err(|e| corrupt(format!("bad line: {}", e)))?;
        }

        let computed = Self::total_of(&lines).map_err(|e| corrupt(e.to_string()))?;
        if computed != total {
            return Err(corrupt(format!(
                "total {} does not match lines {}",
                total, computed
            )));
        }
        if amount_paid.is_negative() || amount_paid > total {
            return Err(corrupt(format!(
                "amount paid {} outside 0..={}",
                amount_paid, total
            )));
        }

        Ok(Self {
            id,
            client_id: client.id,
            client_name: client.name,
            lines,
            total,
            amount_paid,
            status: SaleStatus::from_amounts(amount_paid, total),
            created_at,
        })
    }

    /// Records `amount` against this sale.
    ///
    /// Returns the new paid amount and status. Fails without changing
    /// anything if `amount` is not positive or exceeds the outstanding debt.
    pub fn apply_payment(&mut self, amount: Money) -> CoreResult<(Money, SaleStatus)> {
        validate_payment_amount(amount)?;
        let debt = self.debt();
        if amount > debt {
            return Err(CoreError::overpayment(amount, debt));
        }

        self.amount_paid += amount;
        self.status = SaleStatus::from_amounts(self.amount_paid, self.total);
        Ok((self.amount_paid, self.status))
    }

    /// Outstanding amount (total − amount_paid).
    #[inline]
    pub fn debt(&self) -> Money {
        self.total - self.amount_paid
    }

    #[inline]
    pub fn id(&self) -> &SaleId {
        &self.id
    }

    #[inline]
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    #[inline]
    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    pub fn client(&self) -> ClientRef {
        ClientRef {
            id: self.client_id.clone(),
            name: self.client_name.clone(),
        }
    }

    #[inline]
    pub fn lines(&self) -> &[SaleLine] {
        &self.lines
    }

    #[inline]
    pub fn total(&self) -> Money {
        self.total
    }

    #[inline]
    pub fn amount_paid(&self) -> Money {
        self.amount_paid
    }

    #[inline]
    pub fn status(&self) -> SaleStatus {
        self.status
    }

    #[inline]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.status == SaleStatus::Pending
    }
}

// =============================================================================
// Payment
// =============================================================================

/// One settlement action by a client. Always recorded for the full amount
/// handed over, even when part of it could not be applied to any sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct Payment {
    id: PaymentId,
    client_id: ClientId,
    client_name: String,
    amount: Money,
    #[ts(as = "String")]
    created_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(
        id: PaymentId,
        client: &ClientRef,
        amount: Money,
        created_at: DateTime<Utc>,
    ) -> ValidationResult<Self> {
        validate_payment_amount(amount)?;
        Ok(Self {
            id,
            client_id: client.id.clone(),
            client_name: client.name.clone(),
            amount,
            created_at,
        })
    }

    #[inline]
    pub fn id(&self) -> &PaymentId {
        &self.id
    }

    #[inline]
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    #[inline]
    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    #[inline]
    pub fn amount(&self) -> Money {
        self.amount
    }

    #[inline]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ClientRef {
        ClientRef {
            id: ClientId::from("c-1"),
            name: "Ana".to_string(),
        }
    }

    fn line(qty: i64, cents: i64) -> SaleLine {
        SaleLine {
            product_id: ProductId::new(),
            product_name: "Arroz".to_string(),
            quantity: qty,
            unit_price: Money::from_cents(cents),
        }
    }

    #[test]
    fn test_product_rejects_bad_input() {
        let ok = NewProduct {
            name: "Arroz".into(),
            sku: "ARZ".into(),
            price: Money::from_cents(150),
            stock: 3,
        };
        assert!(Product::new(ProductId::new(), ok.clone()).is_ok());

        let no_name = NewProduct { name: " ".into(), ..ok.clone() };
        assert!(Product::new(ProductId::new(), no_name).is_err());

        let negative_price = NewProduct { price: Money::from_cents(-1), ..ok.clone() };
        assert!(Product::new(ProductId::new(), negative_price).is_err());

        let negative_stock = NewProduct { stock: -1, ..ok };
        assert!(Product::new(ProductId::new(), negative_stock).is_err());
    }

    #[test]
    fn test_product_details_keep_stock() {
        let product = Product::restore(
            ProductId::new(),
            "Arroz".into(),
            "ARZ".into(),
            Money::from_cents(150),
            7,
        )
        .unwrap();
        let edited = product
            .with_details(ProductDetails {
                name: "Arroz Integral".into(),
                sku: "ARZ-I".into(),
                price: Money::from_cents(180),
            })
            .unwrap();
        assert_eq!(edited.stock(), 7);
        assert_eq!(edited.id(), product.id());
        assert!(product.with_stock(-1).is_err());
    }

    #[test]
    fn test_client_validation() {
        let now = Utc::now();
        let contact = ClientContact {
            name: "Ana".into(),
            phone: "555-0101".into(),
            email: Some("  ".into()),
        };
        let client = Client::new(ClientId::new(), contact.clone(), now).unwrap();
        assert_eq!(client.email(), None);

        let bad_email = ClientContact { email: Some("ana".into()), ..contact.clone() };
        assert!(Client::new(ClientId::new(), bad_email, now).is_err());

        let no_phone = ClientContact { phone: "".into(), ..contact };
        assert!(client.with_contact(no_phone).is_err());
    }

    #[test]
    fn test_sale_total_and_status() {
        let lines = vec![line(2, 500), line(1, 250)];
        let pending = Sale::new(SaleId::new(), &client(), lines.clone(), PaymentMode::Pending, Utc::now())
            .unwrap();
        assert_eq!(pending.total().cents(), 1250);
        assert_eq!(pending.amount_paid(), Money::zero());
        assert_eq!(pending.status(), SaleStatus::Pending);

        let paid = Sale::new(SaleId::new(), &client(), lines, PaymentMode::Paid, Utc::now()).unwrap();
        assert_eq!(paid.amount_paid(), paid.total());
        assert_eq!(paid.status(), SaleStatus::Paid);
    }

    #[test]
    fn test_sale_total_overflow_is_an_error() {
        let huge = line(2, i64::MAX / 2 + 1);
        assert!(matches!(
            Sale::new(SaleId::new(), &client(), vec![huge], PaymentMode::Paid, Utc::now()),
            Err(CoreError::AmountOverflow(_))
        ));

        let lines = vec![line(1, i64::MAX), line(1, 1)];
        assert!(matches!(
            Sale::total_of(&lines),
            Err(CoreError::AmountOverflow(_))
        ));
    }

    #[test]
    fn test_sale_requires_lines_with_positive_quantity() {
        assert!(Sale::new(SaleId::new(), &client(), vec![], PaymentMode::Paid, Utc::now()).is_err());
        assert!(
            Sale::new(SaleId::new(), &client(), vec![line(0, 100)], PaymentMode::Paid, Utc::now())
                .is_err()
        );
    }

    #[test]
    fn test_apply_payment_flips_status_only_when_settled() {
        let mut sale =
            Sale::new(SaleId::new(), &client(), vec![line(1, 1000)], PaymentMode::Pending, Utc::now())
                .unwrap();

        let (paid, status) = sale.apply_payment(Money::from_cents(400)).unwrap();
        assert_eq!(paid.cents(), 400);
        assert_eq!(status, SaleStatus::Pending);

        assert!(sale.apply_payment(Money::from_cents(700)).is_err());
        assert_eq!(sale.amount_paid().cents(), 400);

        let (paid, status) = sale.apply_payment(Money::from_cents(600)).unwrap();
        assert_eq!(paid, sale.total());
        assert_eq!(status, SaleStatus::Paid);
        assert_eq!(sale.debt(), Money::zero());
    }

    #[test]
    fn test_restore_rejects_corrupt_rows() {
        let lines = vec![line(2, 500)];
        let wrong_total = Sale::restore(
            SaleId::new(),
            client(),
            lines.clone(),
            Money::from_cents(999),
            Money::zero(),
            Utc::now(),
        );
        assert!(matches!(wrong_total, Err(CoreError::CorruptRecord { .. })));

        let overpaid = Sale::restore(
            SaleId::new(),
            client(),
            lines.clone(),
            Money::from_cents(1000),
            Money::from_cents(1001),
            Utc::now(),
        );
        assert!(overpaid.is_err());

        let ok = Sale::restore(
            SaleId::new(),
            client(),
            lines,
            Money::from_cents(1000),
            Money::from_cents(1000),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(ok.status(), SaleStatus::Paid);
    }

    #[test]
    fn test_payment_amount_must_be_positive() {
        assert!(Payment::new(PaymentId::new(), &client(), Money::zero(), Utc::now()).is_err());
        let payment = Payment::new(PaymentId::new(), &client(), Money::from_cents(50), Utc::now()).unwrap();
        assert_eq!(payment.client_name(), "Ana");
    }

    #[test]
    fn test_ids_are_uuids() {
        let id = SaleId::new();
        assert!(crate::validation::validate_uuid("id", id.as_str()).is_ok());
        assert_ne!(id, SaleId::new());
    }
}
