use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kart_core::{
    AddressId, BillingProfileId, CartId, DomainError, DomainResult, Entity, Money, OrderId,
};

use crate::cart::Cart;
use crate::order_number::OrderNumber;

/// Flat shipping charge applied to new orders, in minor units (50.00).
pub const DEFAULT_SHIPPING_TOTAL_MINOR: i64 = 50_00;

/// Order status lifecycle.
///
/// `Created` → `Paid` → one of the fulfilment outcomes. Only the move to `Paid`
/// is guarded (see [`Order::mark_paid`]); the outcomes are display labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Created,
    Paid,
    Shipped,
    Refunded,
    Cancelled,
    Delivered,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Created,
        OrderStatus::Paid,
        OrderStatus::Shipped,
        OrderStatus::Refunded,
        OrderStatus::Cancelled,
        OrderStatus::Delivered,
    ];

    /// Stored representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::Paid => "paid",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Refunded => "refunded",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Delivered => "delivered",
        }
    }

    /// Name of the status itself, e.g. for back-office listings.
    pub fn display_name(&self) -> &'static str {
        match self {
            OrderStatus::Created => "Created",
            OrderStatus::Paid => "Paid",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Refunded => "Refunded",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Delivered => "Delivered",
        }
    }
}

impl core::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown order status {s:?}")))
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flat persisted form of an [`Order`], one field per column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub order_number: Option<OrderNumber>,
    pub billing_profile: Option<BillingProfileId>,
    pub shipping_address: Option<AddressId>,
    pub billing_address: Option<AddressId>,
    pub cart: CartId,
    pub status: OrderStatus,
    pub shipping_total: Money,
    pub total: Money,
    pub active: bool,
    pub timestamp: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// A checkout transaction derived from a cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    id: OrderId,
    order_number: Option<OrderNumber>,
    billing_profile: Option<BillingProfileId>,
    shipping_address: Option<AddressId>,
    billing_address: Option<AddressId>,
    cart: CartId,
    status: OrderStatus,
    shipping_total: Money,
    total: Money,
    active: bool,
    timestamp: DateTime<Utc>,
    updated: DateTime<Utc>,
}

impl Order {
    /// A fresh, unnumbered order for `cart`. Its total stays zero until recomputed.
    pub fn new(
        id: OrderId,
        cart: CartId,
        billing_profile: Option<BillingProfileId>,
        shipping_total: Money,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            order_number: None,
            billing_profile,
            shipping_address: None,
            billing_address: None,
            cart,
            status: OrderStatus::Created,
            shipping_total,
            total: Money::zero(),
            active: true,
            timestamp: now,
            updated: now,
        }
    }

    pub fn from_record(record: OrderRecord) -> Self {
        Self {
            id: record.id,
            order_number: record.order_number,
            billing_profile: record.billing_profile,
            shipping_address: record.shipping_address,
            billing_address: record.billing_address,
            cart: record.cart,
            status: record.status,
            shipping_total: record.shipping_total,
            total: record.total,
            active: record.active,
            timestamp: record.timestamp,
            updated: record.updated,
        }
    }

    pub fn to_record(&self) -> OrderRecord {
        OrderRecord {
            id: self.id,
            order_number: self.order_number.clone(),
            billing_profile: self.billing_profile,
            shipping_address: self.shipping_address,
            billing_address: self.billing_address,
            cart: self.cart,
            status: self.status,
            shipping_total: self.shipping_total,
            total: self.total,
            active: self.active,
            timestamp: self.timestamp,
            updated: self.updated,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn order_number(&self) -> Option<&OrderNumber> {
        self.order_number.as_ref()
    }

    pub fn billing_profile(&self) -> Option<BillingProfileId> {
        self.billing_profile
    }

    pub fn shipping_address(&self) -> Option<AddressId> {
        self.shipping_address
    }

    pub fn billing_address(&self) -> Option<AddressId> {
        self.billing_address
    }

    pub fn cart(&self) -> CartId {
        self.cart
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn shipping_total(&self) -> Money {
        self.shipping_total
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn updated(&self) -> DateTime<Utc> {
        self.updated
    }

    /// Active and not yet submitted: the order a checkout would resume.
    pub fn is_open(&self) -> bool {
        self.active && self.status == OrderStatus::Created
    }

    /// Customer-facing progress label.
    pub fn status_label(&self) -> &'static str {
        match self.status {
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Refunded => "Refunded",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Created | OrderStatus::Paid => "Shipping Soon",
        }
    }

    /// Canonical detail path, once the order has a number.
    pub fn absolute_path(&self) -> Option<String> {
        self.order_number
            .as_ref()
            .map(|number| format!("/orders/{number}/"))
    }

    /// Set the order number. It can be set once and never replaced.
    pub fn assign_order_number(&mut self, number: OrderNumber) -> DomainResult<()> {
        if let Some(existing) = &self.order_number {
            return Err(DomainError::conflict(format!(
                "order {} already numbered {existing}",
                self.id
            )));
        }
        self.order_number = Some(number);
        Ok(())
    }

    /// Mark this order as superseded by a newer one on the same cart.
    pub fn deactivate(&mut self, now: DateTime<Utc>) {
        if self.active {
            self.active = false;
            self.updated = now;
        }
    }

    /// Attach checkout addresses; `None` leaves the current value untouched.
    pub fn attach_addresses(
        &mut self,
        shipping: Option<AddressId>,
        billing: Option<AddressId>,
        now: DateTime<Utc>,
    ) {
        if let Some(address) = shipping {
            self.shipping_address = Some(address);
        }
        if let Some(address) = billing {
            self.billing_address = Some(address);
        }
        self.updated = now;
    }

    /// Change the shipping charge. The total is not refreshed until the next recompute.
    pub fn set_shipping_total(&mut self, shipping_total: Money, now: DateTime<Utc>) {
        self.shipping_total = shipping_total;
        self.updated = now;
    }

    /// Recompute `total = cart total + shipping`, rounded to cents.
    pub fn recompute_total(&mut self, cart: &Cart, now: DateTime<Utc>) -> DomainResult<Money> {
        self.ensure_cart(cart)?;
        self.total = (cart.total() + self.shipping_total).rounded();
        self.updated = now;
        Ok(self.total)
    }

    /// Shipping is needed unless everything in the cart is digital.
    pub fn requires_shipping(&self, cart: &Cart) -> bool {
        !cart.is_digital()
    }

    /// Whether the order has everything needed to take payment.
    ///
    /// Always false for a cart that is not this order's cart.
    pub fn is_fulfillable(&self, cart: &Cart) -> bool {
        if cart.id_typed() != self.cart {
            return false;
        }
        let shipping_done = !self.requires_shipping(cart) || self.shipping_address.is_some();
        self.billing_profile.is_some()
            && shipping_done
            && self.billing_address.is_some()
            && self.total.is_positive()
    }

    /// Move a created order to `Paid` if it is fulfillable; return the resulting status.
    ///
    /// Any other status is returned unchanged, so repeated calls never move a
    /// paid or later order backwards.
    pub fn mark_paid(&mut self, cart: &Cart, now: DateTime<Utc>) -> DomainResult<OrderStatus> {
        self.ensure_cart(cart)?;
        if self.status == OrderStatus::Created && self.is_fulfillable(cart) {
            self.status = OrderStatus::Paid;
            self.updated = now;
        }
        Ok(self.status)
    }

    /// Record a fulfilment outcome for a paid order.
    pub fn advance_status(&mut self, next: OrderStatus, now: DateTime<Utc>) -> DomainResult<()> {
        match next {
            OrderStatus::Created => {
                return Err(DomainError::invariant("orders cannot return to created"));
            }
            OrderStatus::Paid => {
                return Err(DomainError::invariant(
                    "paid is only reachable through payment",
                ));
            }
            _ => {}
        }
        if self.status == OrderStatus::Created {
            return Err(DomainError::invariant(format!(
                "order must be paid before it is {next}"
            )));
        }
        self.status = next;
        self.updated = now;
        Ok(())
    }

    fn ensure_cart(&self, cart: &Cart) -> DomainResult<()> {
        if cart.id_typed() != self.cart {
            return Err(DomainError::invariant(format!(
                "cart {} does not belong to order {}",
                cart.id_typed(),
                self.id
            )));
        }
        Ok(())
    }
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl core::fmt::Display for Order {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.order_number {
            Some(number) => core::fmt::Display::fmt(number, f),
            None => Ok(()),
        }
    }
}

/// Drop orders still in `created` status.
pub fn exclude_unsubmitted(orders: impl IntoIterator<Item = Order>) -> Vec<Order> {
    orders
        .into_iter()
        .filter(|order| order.status != OrderStatus::Created)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn money(s: &str) -> Money {
        Money::parse(s).unwrap()
    }

    fn cart_with_total(total: &str, digital: bool) -> Cart {
        Cart::new(CartId::new(), test_time())
            .with_total(money(total))
            .with_digital(digital)
    }

    fn order_for(cart: &Cart) -> Order {
        Order::new(
            OrderId::new(),
            cart.id_typed(),
            Some(BillingProfileId::new()),
            Money::from_minor(DEFAULT_SHIPPING_TOTAL_MINOR),
            test_time(),
        )
    }

    /// An order with every checkout field filled except the shipping address.
    fn checkout_ready(cart: &Cart) -> Order {
        let mut order = order_for(cart);
        order.attach_addresses(None, Some(AddressId::new()), test_time());
        order.recompute_total(cart, test_time()).unwrap();
        order
    }

    #[test]
    fn new_order_defaults() {
        let cart = cart_with_total("10.00", false);
        let order = order_for(&cart);
        assert_eq!(order.status(), OrderStatus::Created);
        assert_eq!(order.shipping_total().to_string(), "50.00");
        assert_eq!(order.total(), Money::zero());
        assert!(order.is_active());
        assert!(order.is_open());
        assert!(order.order_number().is_none());
        assert_eq!(order.timestamp(), order.updated());
    }

    #[test]
    fn recompute_adds_cart_and_shipping() {
        let cart = cart_with_total("100.00", false);
        let mut order = order_for(&cart);
        let total = order.recompute_total(&cart, test_time()).unwrap();
        assert_eq!(total.to_string(), "150.00");
        assert_eq!(order.total(), total);
    }

    #[test]
    fn recompute_rejects_foreign_cart() {
        let cart = cart_with_total("100.00", false);
        let other = cart_with_total("1.00", false);
        let mut order = order_for(&cart);
        let err = order.recompute_total(&other, test_time()).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(order.total(), Money::zero());
    }

    #[test]
    fn status_labels() {
        let cart = cart_with_total("1.00", true);
        let mut order = checkout_ready(&cart);
        assert_eq!(order.status_label(), "Shipping Soon");
        order.mark_paid(&cart, test_time()).unwrap();
        assert_eq!(order.status_label(), "Shipping Soon");
        order.advance_status(OrderStatus::Shipped, test_time()).unwrap();
        assert_eq!(order.status_label(), "Shipped");
        order.advance_status(OrderStatus::Delivered, test_time()).unwrap();
        assert_eq!(order.status_label(), "Delivered");
    }

    #[test]
    fn digital_cart_is_fulfillable_without_shipping_address() {
        let cart = cart_with_total("100.00", true);
        let mut order = checkout_ready(&cart);
        assert_eq!(order.total().to_string(), "150.00");
        assert!(order.is_fulfillable(&cart));
        assert_eq!(order.mark_paid(&cart, test_time()).unwrap(), OrderStatus::Paid);
    }

    #[test]
    fn physical_cart_needs_shipping_address() {
        let cart = cart_with_total("100.00", false);
        let mut order = checkout_ready(&cart);
        assert!(!order.is_fulfillable(&cart));
        assert_eq!(order.mark_paid(&cart, test_time()).unwrap(), OrderStatus::Created);

        order.attach_addresses(Some(AddressId::new()), None, test_time());
        assert_eq!(order.mark_paid(&cart, test_time()).unwrap(), OrderStatus::Paid);
    }

    #[test]
    fn missing_billing_profile_blocks_payment() {
        let cart = cart_with_total("100.00", true);
        let mut order = Order::new(OrderId::new(), cart.id_typed(), None, Money::zero(), test_time());
        order.attach_addresses(None, Some(AddressId::new()), test_time());
        order.recompute_total(&cart, test_time()).unwrap();
        assert!(!order.is_fulfillable(&cart));
    }

    #[test]
    fn mark_paid_is_idempotent() {
        let cart = cart_with_total("20.00", true);
        let mut order = checkout_ready(&cart);
        assert_eq!(order.mark_paid(&cart, test_time()).unwrap(), OrderStatus::Paid);
        let updated = order.updated();
        assert_eq!(order.mark_paid(&cart, test_time()).unwrap(), OrderStatus::Paid);
        assert_eq!(order.updated(), updated);
    }

    #[test]
    fn mark_paid_does_not_regress_later_statuses() {
        let cart = cart_with_total("20.00", true);
        let mut order = checkout_ready(&cart);
        order.mark_paid(&cart, test_time()).unwrap();
        order.advance_status(OrderStatus::Refunded, test_time()).unwrap();
        assert_eq!(order.mark_paid(&cart, test_time()).unwrap(), OrderStatus::Refunded);
    }

    #[test]
    fn advance_status_guards() {
        let cart = cart_with_total("20.00", true);
        let mut order = checkout_ready(&cart);
        assert!(order.advance_status(OrderStatus::Shipped, test_time()).is_err());
        assert!(order.advance_status(OrderStatus::Paid, test_time()).is_err());
        order.mark_paid(&cart, test_time()).unwrap();
        assert!(order.advance_status(OrderStatus::Created, test_time()).is_err());
        assert_eq!(order.status(), OrderStatus::Paid);
    }

    #[test]
    fn order_number_is_assigned_once() {
        let cart = cart_with_total("1.00", false);
        let mut order = order_for(&cart);
        order.assign_order_number(OrderNumber::parse("abc123").unwrap()).unwrap();
        let err = order
            .assign_order_number(OrderNumber::parse("zzz999").unwrap())
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
        assert_eq!(order.to_string(), "abc123");
        assert_eq!(order.absolute_path().as_deref(), Some("/orders/abc123/"));
    }

    #[test]
    fn record_round_trip_preserves_state() {
        let cart = cart_with_total("12.34", false);
        let mut order = checkout_ready(&cart);
        order.assign_order_number(OrderNumber::parse("q1w2e3r4t5").unwrap()).unwrap();
        order.deactivate(test_time());
        assert_eq!(Order::from_record(order.to_record()), order);
    }

    #[test]
    fn status_parses_stored_values() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("lost".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn exclude_unsubmitted_keeps_only_progressed_orders() {
        let cart = cart_with_total("5.00", true);
        let mut paid = checkout_ready(&cart);
        paid.mark_paid(&cart, test_time()).unwrap();
        let created = order_for(&cart);

        let kept = exclude_unsubmitted(vec![created, paid.clone()]);
        assert_eq!(kept, vec![paid]);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: the recomputed total is cart + shipping at cent precision,
        /// whichever of the two changed last.
        #[test]
        fn total_is_cart_plus_shipping(
            cart_minor in 0i64..10_000_000,
            shipping_minor in 0i64..100_000,
            shipping_changed_last in any::<bool>(),
        ) {
            let mut cart = Cart::new(CartId::new(), test_time());
            let mut order = order_for(&cart);

            if shipping_changed_last {
                cart.set_total(Money::from_minor(cart_minor), test_time());
                order.set_shipping_total(Money::from_minor(shipping_minor), test_time());
            } else {
                order.set_shipping_total(Money::from_minor(shipping_minor), test_time());
                cart.set_total(Money::from_minor(cart_minor), test_time());
            }

            let total = order.recompute_total(&cart, test_time()).unwrap();
            prop_assert_eq!(total, Money::from_minor(cart_minor + shipping_minor));
            prop_assert_eq!(total.to_string().split('.').nth(1).map(str::len), Some(2));
        }

        /// Property: no billing address means never fulfillable.
        #[test]
        fn no_billing_address_is_never_fulfillable(
            cart_minor in 0i64..1_000_000,
            digital in any::<bool>(),
            has_shipping in any::<bool>(),
            has_profile in any::<bool>(),
        ) {
            let cart = Cart::new(CartId::new(), test_time())
                .with_total(Money::from_minor(cart_minor))
                .with_digital(digital);
            let profile = has_profile.then(BillingProfileId::new);
            let mut order = Order::new(OrderId::new(), cart.id_typed(), profile, Money::from_minor(50_00), test_time());
            if has_shipping {
                order.attach_addresses(Some(AddressId::new()), None, test_time());
            }
            order.recompute_total(&cart, test_time()).unwrap();
            prop_assert!(!order.is_fulfillable(&cart));
        }

        /// Property: a non-positive total is never fulfillable.
        #[test]
        fn non_positive_total_is_never_fulfillable(
            cart_minor in -1_000_000i64..=0,
            digital in any::<bool>(),
        ) {
            let cart = Cart::new(CartId::new(), test_time())
                .with_total(Money::from_minor(cart_minor))
                .with_digital(digital);
            let mut order = Order::new(OrderId::new(), cart.id_typed(), Some(BillingProfileId::new()), Money::zero(), test_time());
            order.attach_addresses(Some(AddressId::new()), Some(AddressId::new()), test_time());
            order.recompute_total(&cart, test_time()).unwrap();
            prop_assert!(!order.is_fulfillable(&cart));
        }
    }
}
