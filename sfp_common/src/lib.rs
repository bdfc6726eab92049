//! Primitive types shared by every crate in the storefront payment workspace.
//!
//! * [`Money`] is an amount in minor currency units (cents).
//! * [`Secret`] wraps credentials so that they never end up in logs.
//! * [`PaymentStatus`] and [`OrderStatusType`] are the two state machines the pipeline drives.
mod helpers;
mod money;
pub mod op;
mod secret;
mod status;

pub use helpers::parse_boolean_flag;
pub use money::{Money, MoneyConversionError, BASIS_POINTS, DEFAULT_CURRENCY_CODE};
pub use secret::Secret;
pub use status::{OrderStatusType, PaymentStatus, StatusConversionError};
