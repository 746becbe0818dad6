//! The storefront objects the payment flow reads and updates: orders,
//! baskets and payment sources.

use futures::future::BoxFuture;
use futures::FutureExt;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::storage::StorageError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Customer {
    pub id: i64,
    pub full_name: String,
    pub email: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BillingAddress {
    pub title: Option<String>,
    pub line1: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    /// ISO 3166-1 alpha-2
    pub country: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ShippingAddress {
    pub salutation: String,
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub country: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BasketStatus {
    Open,
    Frozen,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Basket {
    pub id: i64,
    pub status: BasketStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceType {
    pub code: String,
    pub name: String,
}

impl SourceType {
    pub fn systempay() -> Self {
        Self {
            code: "systempay".to_string(),
            name: "SystemPay".to_string(),
        }
    }
}

/// Money taken from (or given back to) the customer for an order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentSource {
    pub source_type: SourceType,
    pub currency: Option<String>,
    pub amount_allocated: Decimal,
    pub amount_debited: Decimal,
    pub amount_refunded: Decimal,
    pub reference: String,
}

/// Order data posted by the storefront when the shopper places an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDraft {
    pub basket_id: i64,
    pub currency: String,
    pub total_incl_tax: Decimal,
    pub user: Option<Customer>,
    pub billing_address: Option<BillingAddress>,
    pub shipping_address: Option<ShippingAddress>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: i64,
    pub number: String,
    pub basket_id: i64,
    pub currency: String,
    pub total_incl_tax: Decimal,
    pub user: Option<Customer>,
    pub billing_address: Option<BillingAddress>,
    pub shipping_address: Option<ShippingAddress>,
    pub status: String,
    pub sources: Vec<PaymentSource>,
}

pub const INITIAL_ORDER_STATUS: &str = "Pending";

/// Order numbers start here and follow the order id.
const ORDER_NUMBER_OFFSET: i64 = 100_000;

pub trait OrderStore: Send + Sync {
    /// Freezes the draft's basket and records the order.
    fn place_order<'a>(&'a self, draft: OrderDraft) -> BoxFuture<'a, Result<Order, StorageError>>;

    fn get_order<'a>(&'a self, id: i64) -> BoxFuture<'a, Result<Option<Order>, StorageError>>;

    fn get_order_by_number<'a>(
        &'a self,
        number: &'a str,
    ) -> BoxFuture<'a, Result<Option<Order>, StorageError>>;

    fn set_status<'a>(
        &'a self,
        order_id: i64,
        status: &'a str,
    ) -> BoxFuture<'a, Result<(), StorageError>>;

    fn delete_order<'a>(&'a self, order_id: i64) -> BoxFuture<'a, Result<(), StorageError>>;

    /// Appends payment sources to an order, skipping any whose reference
    /// the order already carries. Returns how many were added.
    fn save_payment_details<'a>(
        &'a self,
        order_id: i64,
        sources: Vec<PaymentSource>,
    ) -> BoxFuture<'a, Result<usize, StorageError>>;

    fn get_basket<'a>(&'a self, basket_id: i64) -> BoxFuture<'a, Result<Option<Basket>, StorageError>>;

    fn thaw_basket<'a>(&'a self, basket_id: i64) -> BoxFuture<'a, Result<(), StorageError>>;
}

#[derive(Debug, Default)]
struct ShopState {
    next_order_id: i64,
    orders: HashMap<i64, Order>,
    baskets: HashMap<i64, Basket>,
}

#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    state: RwLock<ShopState>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OrderStore for InMemoryOrderStore {
    fn place_order<'a>(&'a self, draft: OrderDraft) -> BoxFuture<'a, Result<Order, StorageError>> {
        async move {
            let mut state = self.state.write().await;
            state.next_order_id += 1;
            let id = state.next_order_id;
            state.baskets.insert(
                draft.basket_id,
                Basket {
                    id: draft.basket_id,
                    status: BasketStatus::Frozen,
                },
            );
            let order = Order {
                id,
                number: (ORDER_NUMBER_OFFSET + id).to_string(),
                basket_id: draft.basket_id,
                currency: draft.currency,
                total_incl_tax: draft.total_incl_tax,
                user: draft.user,
                billing_address: draft.billing_address,
                shipping_address: draft.shipping_address,
                status: INITIAL_ORDER_STATUS.to_string(),
                sources: Vec::new(),
            };
            state.orders.insert(id, order.clone());
            Ok(order)
        }
        .boxed()
    }

    fn get_order<'a>(&'a self, id: i64) -> BoxFuture<'a, Result<Option<Order>, StorageError>> {
        async move { Ok(self.state.read().await.orders.get(&id).cloned()) }.boxed()
    }

    fn get_order_by_number<'a>(
        &'a self,
        number: &'a str,
    ) -> BoxFuture<'a, Result<Option<Order>, StorageError>> {
        async move {
            let state = self.state.read().await;
            Ok(state.orders.values().find(|o| o.number == number).cloned())
        }
        .boxed()
    }

    fn set_status<'a>(
        &'a self,
        order_id: i64,
        status: &'a str,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        async move {
            let mut state = self.state.write().await;
            let order = state
                .orders
                .get_mut(&order_id)
                .ok_or(StorageError::NotFound(order_id))?;
            order.status = status.to_string();
            Ok(())
        }
        .boxed()
    }

    fn delete_order<'a>(&'a self, order_id: i64) -> BoxFuture<'a, Result<(), StorageError>> {
        async move {
            self.state
                .write()
                .await
                .orders
                .remove(&order_id)
                .map(|_| ())
                .ok_or(StorageError::NotFound(order_id))
        }
        .boxed()
    }

    fn save_payment_details<'a>(
        &'a self,
        order_id: i64,
        sources: Vec<PaymentSource>,
    ) -> BoxFuture<'a, Result<usize, StorageError>> {
        async move {
            let mut state = self.state.write().await;
            let order = state
                .orders
                .get_mut(&order_id)
                .ok_or(StorageError::NotFound(order_id))?;
            let mut added = 0;
            for source in sources {
                if order.sources.iter().any(|s| s.reference == source.reference) {
                    continue;
                }
                order.sources.push(source);
                added += 1;
            }
            Ok(added)
        }
        .boxed()
    }

    fn get_basket<'a>(&'a self, basket_id: i64) -> BoxFuture<'a, Result<Option<Basket>, StorageError>> {
        async move { Ok(self.state.read().await.baskets.get(&basket_id).cloned()) }.boxed()
    }

    fn thaw_basket<'a>(&'a self, basket_id: i64) -> BoxFuture<'a, Result<(), StorageError>> {
        async move {
            let mut state = self.state.write().await;
            let basket = state
                .baskets
                .get_mut(&basket_id)
                .ok_or(StorageError::NotFound(basket_id))?;
            basket.status = BasketStatus::Open;
            Ok(())
        }
        .boxed()
    }
}
