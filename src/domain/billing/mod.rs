//! Billing module - payments, subscriptions, refunds and pricing rules.

mod customer;
mod errors;
mod payment;
mod pricing;
mod product_type;
mod promo_code;
mod purchase_context;
mod refund;
mod subscription;

pub use customer::CustomerProfile;
pub use errors::BillingError;
pub use payment::{Payment, PaymentStatus};
pub use pricing::{installment_amount, PriceBreakdown, TaxPolicy, INSTALLMENT_COUNTS};
pub use product_type::ProductType;
pub use promo_code::{
    normalize_code, validate_promo, Discount, PromoCode, PromoRejection, PromoValidation,
};
pub use purchase_context::{
    GiftItem, Installment, PurchaseContext, PURCHASE_TYPE_KEY, USER_ID_KEY,
};
pub use refund::{Dispute, DisputeStatus, Refund};
pub use subscription::{Subscription, SubscriptionSnapshot, SubscriptionStatus};
