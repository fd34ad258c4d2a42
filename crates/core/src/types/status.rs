//! Status enums and their transition rules.
//!
//! Database enums live in the `shop` schema. The transition tables here are
//! the single source of truth; repositories check them before writing.

use serde::{Deserialize, Serialize};

/// A status change that the state machine does not allow.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot move from {from} to {to}")]
pub struct TransitionError<S: std::fmt::Display + std::fmt::Debug> {
    /// Current status.
    pub from: S,
    /// Requested status.
    pub to: S,
}

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.user_role", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Shopper.
    #[default]
    User,
    /// Store administrator.
    Admin,
}

impl Role {
    /// Whether this role may use admin endpoints.
    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "USER"),
            Self::Admin => write!(f, "ADMIN"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USER" => Ok(Self::User),
            "ADMIN" => Ok(Self::Admin),
            _ => Err(format!("invalid role: {s}")),
        }
    }
}

/// Order lifecycle status.
///
/// ```text
/// PENDING -> PAID -> PROCESSING -> SHIPPED -> DELIVERED
///                 \______________/
/// any non-terminal -> CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.order_status", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Paid,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::Pending,
        Self::Paid,
        Self::Processing,
        Self::Shipped,
        Self::Delivered,
        Self::Cancelled,
    ];

    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Whether orders in this status count towards sales totals.
    #[must_use]
    pub const fn counts_as_revenue(self) -> bool {
        matches!(
            self,
            Self::Paid | Self::Processing | Self::Shipped | Self::Delivered
        )
    }

    /// Whether moving from `self` to `next` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (from, Self::Cancelled) => !from.is_terminal(),
            (Self::Pending, Self::Paid)
            | (Self::Paid, Self::Processing | Self::Shipped)
            | (Self::Processing, Self::Shipped)
            | (Self::Shipped, Self::Delivered) => true,
            _ => false,
        }
    }

    /// Validate a transition.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError` if the move is not allowed.
    pub fn transition_to(self, next: Self) -> Result<Self, TransitionError<Self>> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Processing => "PROCESSING",
            Self::Shipped => "SHIPPED",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// Payment attempt status.
///
/// ```text
/// pending -> verifying -> verified -> fulfilled
///    ^          |            |
///    +----------+            v
///               +-------> failed
/// ```
///
/// `verifying -> pending` happens when the provider could not be reached,
/// so the attempt can be verified again later. `verified -> failed` is the
/// compensation path when stock cannot be reserved after a successful charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.payment_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Verifying,
    Verified,
    Failed,
    Fulfilled,
}

impl PaymentStatus {
    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Fulfilled)
    }

    /// Whether moving from `self` to `next` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Verifying | Self::Failed)
                | (
                    Self::Verifying,
                    Self::Pending | Self::Verified | Self::Failed
                )
                | (Self::Verified, Self::Fulfilled | Self::Failed)
        )
    }

    /// Validate a transition.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError` if the move is not allowed.
    pub fn transition_to(self, next: Self) -> Result<Self, TransitionError<Self>> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Verifying => "verifying",
            Self::Verified => "verified",
            Self::Failed => "failed",
            Self::Fulfilled => "fulfilled",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse_and_display() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("USER".parse::<Role>().unwrap(), Role::User);
        assert!("owner".parse::<Role>().is_err());
        assert_eq!(Role::Admin.to_string(), "ADMIN");
        assert!(Role::Admin.is_admin());
        assert!(!Role::User.is_admin());
    }

    #[test]
    fn test_order_status_serde() {
        let json = serde_json::to_string(&OrderStatus::Delivered).unwrap();
        assert_eq!(json, "\"DELIVERED\"");
        let parsed: OrderStatus = serde_json::from_str("\"SHIPPED\"").unwrap();
        assert_eq!(parsed, OrderStatus::Shipped);
    }

    #[test]
    fn test_order_forward_transitions() {
        assert!(OrderStatus::Paid.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::Paid.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Delivered));
        assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::Delivered));
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Paid));
    }

    #[test]
    fn test_order_cancellation() {
        assert!(OrderStatus::Paid.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn test_order_transition_error() {
        let err = OrderStatus::Delivered
            .transition_to(OrderStatus::Paid)
            .unwrap_err();
        assert_eq!(err.to_string(), "cannot move from DELIVERED to PAID");
    }

    #[test]
    fn test_revenue_statuses() {
        let revenue: Vec<_> = OrderStatus::ALL
            .into_iter()
            .filter(|s| s.counts_as_revenue())
            .collect();
        assert_eq!(
            revenue,
            vec![
                OrderStatus::Paid,
                OrderStatus::Processing,
                OrderStatus::Shipped,
                OrderStatus::Delivered
            ]
        );
    }

    #[test]
    fn test_payment_happy_path() {
        let status = PaymentStatus::Pending
            .transition_to(PaymentStatus::Verifying)
            .and_then(|s| s.transition_to(PaymentStatus::Verified))
            .and_then(|s| s.transition_to(PaymentStatus::Fulfilled))
            .unwrap();
        assert_eq!(status, PaymentStatus::Fulfilled);
        assert!(status.is_terminal());
    }

    #[test]
    fn test_payment_retry_and_compensation() {
        assert!(PaymentStatus::Verifying.can_transition_to(PaymentStatus::Pending));
        assert!(PaymentStatus::Verified.can_transition_to(PaymentStatus::Failed));
    }

    #[test]
    fn test_payment_terminal_states_are_final() {
        for next in [
            PaymentStatus::Pending,
            PaymentStatus::Verifying,
            PaymentStatus::Verified,
            PaymentStatus::Fulfilled,
        ] {
            assert!(!PaymentStatus::Failed.can_transition_to(next));
            assert!(!PaymentStatus::Fulfilled.can_transition_to(next));
        }
    }

    #[test]
    fn test_payment_cannot_skip_verification() {
        assert!(!PaymentStatus::Pending.can_transition_to(PaymentStatus::Verified));
        assert!(!PaymentStatus::Pending.can_transition_to(PaymentStatus::Fulfilled));
    }
}
