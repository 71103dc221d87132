//! # Cart
//!
//! The register's ephemeral cart. It never touches the store: quantities are
//! clamped to the stock the product had when it was last seen, which is only
//! a hint. The real check happens inside the sale transaction.
//!
//! ## Cart Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  add_item(product, n)       stock ≤ 0        → OutOfStock              │
//! │                             already present  → qty += n (clamped)      │
//! │                             new              → push (clamped)          │
//! │                                                                         │
//! │  update_quantity(id, n)     n ≤ 0            → line removed            │
//! │                             otherwise        → qty = min(n, snapshot)  │
//! │                                                                         │
//! │  remove_item(id) / clear()                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{Product, ProductId, SaleLine};
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY};

// =============================================================================
// Cart Item
// =============================================================================

/// A line in the cart. Product fields are a frozen snapshot taken when the
/// product was added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartItem {
    pub product_id: ProductId,
    pub name: String,
    pub sku: String,
    pub unit_price: Money,
    /// Stock the product had when last seen. Upper bound for `quantity`.
    pub stock_snapshot: i64,
    pub quantity: i64,
}

impl CartItem {
    pub fn from_product(product: &Product, quantity: i64) -> Self {
        Self {
            product_id: product.id().clone(),
            name: product.name().to_string(),
            sku: product.sku().to_string(),
            unit_price: product.price(),
            stock_snapshot: product.stock(),
            quantity,
        }
    }

    #[inline]
    pub fn line_total(&self) -> CoreResult<Money> {
        self.unit_price.multiply_quantity(self.quantity)
    }

    /// Freezes this item into a sale line.
    pub fn to_sale_line(&self) -> SaleLine {
        SaleLine {
            product_id: self.product_id.clone(),
            product_name: self.name.clone(),
            quantity: self.quantity,
            unit_price: self.unit_price,
        }
    }
}

fn clamp_quantity(requested: i64, stock: i64) -> CoreResult<i64> {
    let qty = requested.min(stock);
    if qty > MAX_ITEM_QUANTITY {
        return Err(CoreError::QuantityTooLarge {
            requested: qty,
            max: MAX_ITEM_QUANTITY,
        });
    }
    Ok(qty)
}

// =============================================================================
// Cart
// =============================================================================

/// The register's cart.
///
/// ## Invariants
/// - Lines are unique by `product_id`
/// - Every quantity is > 0
/// - At most MAX_CART_ITEMS lines
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Cart {
    items: Vec<CartItem>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `quantity` units of `product`, merging with an existing line.
    ///
    /// Returns the resulting line quantity, which may be lower than asked
    /// for when the stock snapshot is the limit.
    pub fn add_item(&mut self, product: &Product, quantity: i64) -> CoreResult<i64> {
        if quantity <= 0 {
            return Err(ValidationError::must_be_positive("quantity").into());
        }
        if product.stock() <= 0 {
            return Err(CoreError::OutOfStock(product.name().to_string()));
        }

        if let Some(item) = self
            .items
            .iter_mut()
            .find(|i| &i.product_id == product.id())
        {
            let qty = clamp_quantity(item.quantity.saturating_add(quantity), product.stock())?;
            item.stock_snapshot = product.stock();
            item.quantity = qty;
            return Ok(qty);
        }

        if self.items.len() >= MAX_CART_ITEMS {
            return Err(CoreError::CartTooLarge {
                max: MAX_CART_ITEMS,
            });
        }

        let qty = clamp_quantity(quantity, product.stock())?;
        self.items.push(CartItem::from_product(product, qty));
        Ok(qty)
    }

    /// Sets the quantity of a line.
    ///
    /// A quantity ≤ 0 removes the line and returns `None`; otherwise returns
    /// the clamped quantity.
    pub fn update_quantity(
        &mut self,
        product_id: &ProductId,
        quantity: i64,
    ) -> CoreResult<Option<i64>> {
        if quantity <= 0 {
            self.remove_item(product_id)?;
            return Ok(None);
        }

        let item = self
            .items
            .iter_mut()
            .find(|i| &i.product_id == product_id)
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;

        let qty = clamp_quantity(quantity, item.stock_snapshot)?;
        item.quantity = qty;
        Ok(Some(qty))
    }

    pub fn remove_item(&mut self, product_id: &ProductId) -> CoreResult<()> {
        let before = self.items.len();
        self.items.retain(|i| &i.product_id != product_id);
        if self.items.len() == before {
            return Err(CoreError::ProductNotFound(product_id.to_string()));
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    #[inline]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// Number of distinct lines.
    #[inline]
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn total_quantity(&self) -> i64 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    pub fn total(&self) -> CoreResult<Money> {
        self.items.iter().try_fold(Money::zero(), |acc, item| {
            Money::checked_sum([acc, item.line_total()?])
        })
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewProduct;

    fn product(name: &str, cents: i64, stock: i64) -> Product {
        Product::new(
            ProductId::new(),
            NewProduct {
                name: name.to_string(),
                sku: format!("SKU-{}", name),
                price: Money::from_cents(cents),
                stock,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_add_item_and_total() {
        let mut cart = Cart::new();
        let rice = product("rice", 999, 10);

        assert_eq!(cart.add_item(&rice, 2).unwrap(), 2);
        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.total().unwrap().cents(), 1998);
    }

    #[test]
    fn test_add_same_product_merges_and_clamps() {
        let mut cart = Cart::new();
        let rice = product("rice", 100, 4);

        cart.add_item(&rice, 3).unwrap();
        let qty = cart.add_item(&rice, 3).unwrap();

        assert_eq!(qty, 4);
        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.total_quantity(), 4);
    }

    #[test]
    fn test_out_of_stock_cannot_be_added() {
        let mut cart = Cart::new();
        let empty = product("beans", 100, 0);
        assert!(matches!(cart.add_item(&empty, 1), Err(CoreError::OutOfStock(_))));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_update_quantity_removes_on_zero_or_less() {
        let mut cart = Cart::new();
        let rice = product("rice", 100, 5);
        cart.add_item(&rice, 2).unwrap();

        assert_eq!(cart.update_quantity(rice.id(), 50).unwrap(), Some(5));
        assert_eq!(cart.update_quantity(rice.id(), -1).unwrap(), None);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_update_unknown_product_fails() {
        let mut cart = Cart::new();
        assert!(cart.update_quantity(&ProductId::new(), 2).is_err());
        assert!(cart.remove_item(&ProductId::new()).is_err());
    }

    #[test]
    fn test_non_positive_add_is_rejected() {
        let mut cart = Cart::new();
        let rice = product("rice", 100, 5);
        assert!(cart.add_item(&rice, 0).is_err());
    }

    #[test]
    fn test_to_sale_line_freezes_snapshot() {
        let mut cart = Cart::new();
        let rice = product("rice", 250, 5);
        cart.add_item(&rice, 2).unwrap();

        let line = cart.items()[0].to_sale_line();
        assert_eq!(line.product_name, "rice");
        assert_eq!(line.line_total().unwrap().cents(), 500);
    }
}
