//! Postgres-backed order and product purchase repositories.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `AlreadyExists` |
//! | Database (other) | Any other | `Storage` |
//! | RowNotFound | N/A | `NotFound` |
//! | Other | N/A | `Storage` |
//!
//! ## Sync Access
//!
//! The repository traits are synchronous. The trait impls drive the async
//! methods on the current tokio runtime, so they must be called from a worker
//! thread of a multi-threaded runtime.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use kart_core::{BillingProfileId, CartId, Money, OrderId, ProductPurchaseId};
use kart_orders::{
    Order, OrderNumber, OrderRecord, OrderStatus, ProductPurchase, ProductPurchaseRecord,
};

use super::{OrderRepository, ProductPurchaseRepository};
use crate::error::StoreError;

macro_rules! order_columns {
    () => {
        r#"id, order_id, billing_profile_id, shipping_address_id, billing_address_id, cart_id,
           status, shipping_total, total, active, "timestamp", updated"#
    };
}

macro_rules! purchase_columns {
    () => {
        r#"id, user_id, billing_profile_id, product_id, refunded, updated, "timestamp""#
    };
}

/// Postgres-backed order repository over the `orders` table.
#[derive(Debug, Clone)]
pub struct PostgresOrderRepository {
    pool: Arc<PgPool>,
}

impl PostgresOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    #[instrument(skip(self, order), fields(order_id = %order.id_typed()), err)]
    pub async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(concat!(
            "INSERT INTO orders (",
            order_columns!(),
            ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        ))
        .bind(*order.id_typed().as_uuid())
        .bind(order.order_number().map(OrderNumber::as_str).unwrap_or(""))
        .bind(order.billing_profile().map(Uuid::from))
        .bind(order.shipping_address().map(Uuid::from))
        .bind(order.billing_address().map(Uuid::from))
        .bind(*order.cart().as_uuid())
        .bind(order.status().as_str())
        .bind(order.shipping_total().amount())
        .bind(order.total().amount())
        .bind(order.is_active())
        .bind(order.timestamp())
        .bind(order.updated())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;

        Ok(())
    }

    #[instrument(skip(self, order), fields(order_id = %order.id_typed()), err)]
    pub async fn update_order(&self, order: &Order) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE orders SET
                order_id = $2,
                billing_profile_id = $3,
                shipping_address_id = $4,
                billing_address_id = $5,
                cart_id = $6,
                status = $7,
                shipping_total = $8,
                total = $9,
                active = $10,
                updated = $11
            WHERE id = $1
            "#,
        )
        .bind(*order.id_typed().as_uuid())
        .bind(order.order_number().map(OrderNumber::as_str).unwrap_or(""))
        .bind(order.billing_profile().map(Uuid::from))
        .bind(order.shipping_address().map(Uuid::from))
        .bind(order.billing_address().map(Uuid::from))
        .bind(*order.cart().as_uuid())
        .bind(order.status().as_str())
        .bind(order.shipping_total().amount())
        .bind(order.total().amount())
        .bind(order.is_active())
        .bind(order.updated())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_order", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(order.id_typed().to_string()));
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    pub async fn load_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(concat!("SELECT ", order_columns!(), " FROM orders WHERE id = $1"))
            .bind(*id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_order", e))?;

        row.map(|r| order_from_row(&r)).transpose()
    }

    #[instrument(skip(self), fields(order_number = %number), err)]
    pub async fn load_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(concat!(
            "SELECT ",
            order_columns!(),
            r#" FROM orders WHERE order_id = $1 ORDER BY "timestamp" DESC, updated DESC LIMIT 1"#
        ))
        .bind(number.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_by_number", e))?;

        row.map(|r| order_from_row(&r)).transpose()
    }

    #[instrument(skip(self), fields(order_number = %number), err)]
    pub async fn number_exists(&self, number: &OrderNumber) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM orders WHERE order_id = $1) AS taken")
            .bind(number.as_str())
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("number_exists", e))?;

        row.try_get::<bool, _>("taken")
            .map_err(|e| map_sqlx_error("number_exists", e))
    }

    #[instrument(skip(self), err)]
    pub async fn load_by_billing_profile(
        &self,
        billing_profile: BillingProfileId,
    ) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            order_columns!(),
            r#" FROM orders WHERE billing_profile_id = $1 ORDER BY "timestamp" DESC, updated DESC"#
        ))
        .bind(*billing_profile.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_by_billing_profile", e))?;

        rows.iter().map(order_from_row).collect()
    }

    #[instrument(skip(self), err)]
    pub async fn load_by_cart(&self, cart: CartId) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            order_columns!(),
            r#" FROM orders WHERE cart_id = $1 ORDER BY "timestamp" DESC, updated DESC"#
        ))
        .bind(*cart.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_by_cart", e))?;

        rows.iter().map(order_from_row).collect()
    }

    #[instrument(skip(self), err)]
    pub async fn load_open(
        &self,
        billing_profile: BillingProfileId,
        cart: CartId,
    ) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            order_columns!(),
            r#" FROM orders
                WHERE billing_profile_id = $1 AND cart_id = $2 AND active AND status = 'created'
                ORDER BY "timestamp" DESC, updated DESC"#
        ))
        .bind(*billing_profile.as_uuid())
        .bind(*cart.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_open", e))?;

        rows.iter().map(order_from_row).collect()
    }

    #[instrument(skip(self), err)]
    pub async fn load_submitted(&self) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            order_columns!(),
            r#" FROM orders WHERE status <> 'created' ORDER BY "timestamp" DESC, updated DESC"#
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_submitted", e))?;

        rows.iter().map(order_from_row).collect()
    }

    #[instrument(skip(self), err)]
    pub async fn deactivate_others(
        &self,
        cart: CartId,
        owner: Option<BillingProfileId>,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET active = FALSE, updated = $3
            WHERE cart_id = $1 AND active AND billing_profile_id IS DISTINCT FROM $2
            "#,
        )
        .bind(*cart.as_uuid())
        .bind(owner.map(Uuid::from))
        .bind(now)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("deactivate_others", e))?;

        Ok(result.rows_affected() as usize)
    }
}

impl OrderRepository for PostgresOrderRepository {
    fn insert(&self, order: &Order) -> Result<(), StoreError> {
        block_on(self.insert_order(order))?
    }

    fn update(&self, order: &Order) -> Result<(), StoreError> {
        block_on(self.update_order(order))?
    }

    fn get(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        block_on(self.load_order(id))?
    }

    fn find_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, StoreError> {
        block_on(self.load_by_number(number))?
    }

    fn number_taken(&self, number: &OrderNumber) -> Result<bool, StoreError> {
        block_on(self.number_exists(number))?
    }

    fn list_by_billing_profile(
        &self,
        billing_profile: BillingProfileId,
    ) -> Result<Vec<Order>, StoreError> {
        block_on(self.load_by_billing_profile(billing_profile))?
    }

    fn list_by_cart(&self, cart: CartId) -> Result<Vec<Order>, StoreError> {
        block_on(self.load_by_cart(cart))?
    }

    fn list_open(
        &self,
        billing_profile: BillingProfileId,
        cart: CartId,
    ) -> Result<Vec<Order>, StoreError> {
        block_on(self.load_open(billing_profile, cart))?
    }

    fn list_submitted(&self) -> Result<Vec<Order>, StoreError> {
        block_on(self.load_submitted())?
    }

    fn deactivate_other_owners(
        &self,
        cart: CartId,
        owner: Option<BillingProfileId>,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        block_on(self.deactivate_others(cart, owner, now))?
    }
}

/// Postgres-backed product purchase repository over the `product_purchases` table.
#[derive(Debug, Clone)]
pub struct PostgresProductPurchaseRepository {
    pool: Arc<PgPool>,
}

impl PostgresProductPurchaseRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    #[instrument(skip(self, purchase), fields(purchase_id = %purchase.id_typed()), err)]
    pub async fn insert_purchase(&self, purchase: &ProductPurchase) -> Result<(), StoreError> {
        sqlx::query(concat!(
            "INSERT INTO product_purchases (",
            purchase_columns!(),
            ") VALUES ($1, $2, $3, $4, $5, $6, $7)"
        ))
        .bind(*purchase.id_typed().as_uuid())
        .bind(purchase.user().map(Uuid::from))
        .bind(*purchase.billing_profile().as_uuid())
        .bind(*purchase.product().as_uuid())
        .bind(purchase.is_refunded())
        .bind(purchase.updated())
        .bind(purchase.timestamp())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_purchase", e))?;

        Ok(())
    }

    #[instrument(skip(self), err)]
    pub async fn load_purchase(
        &self,
        id: ProductPurchaseId,
    ) -> Result<Option<ProductPurchase>, StoreError> {
        let row = sqlx::query(concat!(
            "SELECT ",
            purchase_columns!(),
            " FROM product_purchases WHERE id = $1"
        ))
        .bind(*id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_purchase", e))?;

        row.map(|r| purchase_from_row(&r)).transpose()
    }

    #[instrument(skip(self), err)]
    pub async fn load_active(
        &self,
        billing_profile: Option<BillingProfileId>,
    ) -> Result<Vec<ProductPurchase>, StoreError> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            purchase_columns!(),
            r#" FROM product_purchases
                WHERE NOT refunded AND ($1::uuid IS NULL OR billing_profile_id = $1)
                ORDER BY "timestamp" DESC"#
        ))
        .bind(billing_profile.map(Uuid::from))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_active", e))?;

        rows.iter().map(purchase_from_row).collect()
    }

    #[instrument(skip(self), err)]
    pub async fn refund(
        &self,
        id: ProductPurchaseId,
        now: DateTime<Utc>,
    ) -> Result<ProductPurchase, StoreError> {
        let row = sqlx::query(concat!(
            r#"UPDATE product_purchases
               SET updated = CASE WHEN refunded THEN updated ELSE $2 END, refunded = TRUE
               WHERE id = $1
               RETURNING "#,
            purchase_columns!()
        ))
        .bind(*id.as_uuid())
        .bind(now)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("refund", e))?;

        match row {
            Some(row) => purchase_from_row(&row),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }
}

impl ProductPurchaseRepository for PostgresProductPurchaseRepository {
    fn insert(&self, purchase: &ProductPurchase) -> Result<(), StoreError> {
        block_on(self.insert_purchase(purchase))?
    }

    fn get(&self, id: ProductPurchaseId) -> Result<Option<ProductPurchase>, StoreError> {
        block_on(self.load_purchase(id))?
    }

    fn list_active(&self) -> Result<Vec<ProductPurchase>, StoreError> {
        block_on(self.load_active(None))?
    }

    fn list_active_for_billing_profile(
        &self,
        billing_profile: BillingProfileId,
    ) -> Result<Vec<ProductPurchase>, StoreError> {
        block_on(self.load_active(Some(billing_profile)))?
    }

    fn mark_refunded(
        &self,
        id: ProductPurchaseId,
        now: DateTime<Utc>,
    ) -> Result<ProductPurchase, StoreError> {
        block_on(self.refund(id, now))?
    }
}

/// Run `fut` to completion from synchronous code inside a tokio runtime.
fn block_on<F: Future>(fut: F) -> Result<F::Output, StoreError> {
    let handle = tokio::runtime::Handle::try_current().map_err(|_| {
        StoreError::Storage(
            "Postgres repositories require a tokio runtime; call them from within one".to_string(),
        )
    })?;
    Ok(tokio::task::block_in_place(|| handle.block_on(fut)))
}

fn order_from_row(row: &sqlx::postgres::PgRow) -> Result<Order, StoreError> {
    let read = |e| map_sqlx_error("decode_order", e);

    let order_number: String = row.try_get("order_id").map_err(read)?;
    let order_number = if order_number.is_empty() {
        None
    } else {
        Some(OrderNumber::parse(order_number).map_err(|e| StoreError::Storage(e.to_string()))?)
    };
    let status: String = row.try_get("status").map_err(read)?;
    let status = status
        .parse::<OrderStatus>()
        .map_err(|e| StoreError::Storage(e.to_string()))?;

    Ok(Order::from_record(OrderRecord {
        id: OrderId::from_uuid(row.try_get("id").map_err(read)?),
        order_number,
        billing_profile: row
            .try_get::<Option<Uuid>, _>("billing_profile_id")
            .map_err(read)?
            .map(Into::into),
        shipping_address: row
            .try_get::<Option<Uuid>, _>("shipping_address_id")
            .map_err(read)?
            .map(Into::into),
        billing_address: row
            .try_get::<Option<Uuid>, _>("billing_address_id")
            .map_err(read)?
            .map(Into::into),
        cart: CartId::from_uuid(row.try_get("cart_id").map_err(read)?),
        status,
        shipping_total: Money::new(row.try_get::<Decimal, _>("shipping_total").map_err(read)?),
        total: Money::new(row.try_get::<Decimal, _>("total").map_err(read)?),
        active: row.try_get("active").map_err(read)?,
        timestamp: row.try_get("timestamp").map_err(read)?,
        updated: row.try_get("updated").map_err(read)?,
    }))
}

fn purchase_from_row(row: &sqlx::postgres::PgRow) -> Result<ProductPurchase, StoreError> {
    let read = |e| map_sqlx_error("decode_purchase", e);

    Ok(ProductPurchase::from_record(ProductPurchaseRecord {
        id: ProductPurchaseId::from_uuid(row.try_get("id").map_err(read)?),
        user: row
            .try_get::<Option<Uuid>, _>("user_id")
            .map_err(read)?
            .map(Into::into),
        billing_profile: BillingProfileId::from_uuid(
            row.try_get("billing_profile_id").map_err(read)?,
        ),
        product: row.try_get::<Uuid, _>("product_id").map_err(read)?.into(),
        refunded: row.try_get("refunded").map_err(read)?,
        updated: row.try_get("updated").map_err(read)?,
        timestamp: row.try_get("timestamp").map_err(read)?,
    }))
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code() {
                Some(code) if code.as_ref() == "23505" => StoreError::AlreadyExists(msg),
                _ => StoreError::Storage(msg),
            }
        }
        sqlx::Error::RowNotFound => {
            StoreError::NotFound(format!("unexpected row not found in {}", operation))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}
