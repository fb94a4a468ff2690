pub mod coupon;
pub mod order;
pub mod return_request;

pub use coupon::{Coupon, CouponKind, DiscountType};
pub use order::{
    CustomerInfo, ItemReturnStatus, Order, OrderItem, OrderStatus, PaymentDetails, PaymentMethod,
    ShippingAddress,
};
pub use return_request::{
    RefundMethod, Return, ReturnItem, ReturnMethod, ReturnReason, ReturnStatus, TimelineEntry,
};
