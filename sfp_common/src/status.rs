use std::{fmt::Display, str::FromStr};

use log::error;
use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid status: {0}")]
pub struct StatusConversionError(String);

//--------------------------------------    PaymentStatus     ---------------------------------------------------------
/// The lifecycle of a payment intent.
///
/// ```text
///   Pending ──► Confirming ──► Completed ──► Refunded
///      ├──► Failed
///      └──► Expired
/// ```
///
/// `Completed`, `Failed`, `Expired` and `Refunded` are absorbing. The single exception is `Completed ─► Refunded`.
/// Once a payment is `Confirming` it can only complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// The intent exists, but the processor has not yet seen funds.
    Pending,
    /// Funds were seen and are awaiting final confirmation (e.g. block confirmations).
    Confirming,
    /// Funds are settled.
    Completed,
    /// The processor declined or the buyer abandoned the payment.
    Failed,
    /// The payment window closed before funds arrived.
    Expired,
    /// A completed payment was returned to the buyer.
    Refunded,
}

impl PaymentStatus {
    pub fn is_absorbing(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Expired | Self::Refunded)
    }

    /// Whether `self -> next` is an edge of the payment state machine. Self-transitions are not edges.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (*self, next),
            (Pending, Confirming | Failed | Expired) | (Confirming, Completed) | (Completed, Refunded)
        )
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Confirming => write!(f, "Confirming"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
            Self::Expired => write!(f, "Expired"),
            Self::Refunded => write!(f, "Refunded"),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = StatusConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Confirming" => Ok(Self::Confirming),
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            "Expired" => Ok(Self::Expired),
            "Refunded" => Ok(Self::Refunded),
            s => Err(StatusConversionError(format!("Invalid payment status: {s}"))),
        }
    }
}

//--------------------------------------   OrderStatusType    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// The order has been created and is waiting for its payment to settle.
    New,
    /// Payment has settled and credentials are being provisioned.
    Processing,
    /// Every line item has been provisioned. Confirmed orders are frozen.
    Confirmed,
    /// The order will never be fulfilled.
    Cancelled,
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "New"),
            Self::Processing => write!(f, "Processing"),
            Self::Confirmed => write!(f, "Confirmed"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl FromStr for OrderStatusType {
    type Err = StatusConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "New" => Ok(Self::New),
            "Processing" => Ok(Self::Processing),
            "Confirmed" => Ok(Self::Confirmed),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(StatusConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

impl From<String> for OrderStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to New");
            OrderStatusType::New
        })
    }
}
