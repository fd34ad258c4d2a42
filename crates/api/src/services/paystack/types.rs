//! Paystack request and response bodies.

use serde::{Deserialize, Serialize};

/// Status Paystack reports for a completed charge.
pub const SUCCESS_STATUS: &str = "success";

/// Webhook event for a completed charge.
pub const CHARGE_SUCCESS_EVENT: &str = "charge.success";

/// Envelope every Paystack response shares.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub status: bool,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

/// Extra field shown on the Paystack dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct CustomField {
    pub display_name: &'static str,
    pub variable_name: &'static str,
    pub value: String,
}

/// Metadata echoed back on verification.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionMetadata {
    pub user_id: String,
    pub cart_id: String,
    pub shipping_address_id: String,
    pub custom_fields: Vec<CustomField>,
}

/// `POST /transaction/initialize` body.
#[derive(Debug, Clone, Serialize)]
pub struct InitializeTransaction {
    pub email: String,
    /// Minor units (kobo).
    pub amount: i64,
    pub reference: String,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    pub metadata: TransactionMetadata,
}

/// `data` of a successful initialize call.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializedTransaction {
    pub authorization_url: String,
    #[serde(default)]
    pub access_code: String,
    pub reference: String,
}

/// `data` of a verify call. The raw JSON is kept for the audit column.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifiedTransaction {
    pub status: String,
    pub reference: String,
    /// Minor units (kobo).
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub gateway_response: Option<String>,
}

impl VerifiedTransaction {
    /// Whether the charge went through.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == SUCCESS_STATUS
    }

    /// Classify the provider status.
    ///
    /// Only `failed` and `reversed` are final refusals. `abandoned`,
    /// `ongoing`, `pending`, `processing` and `queued` are reported while the
    /// customer is still on the checkout page and can still turn into a
    /// charge.
    #[must_use]
    pub fn outcome(&self) -> ChargeOutcome {
        match self.status.as_str() {
            SUCCESS_STATUS => ChargeOutcome::Charged,
            "failed" | "reversed" => ChargeOutcome::Declined,
            _ => ChargeOutcome::Open,
        }
    }
}

/// Where a transaction stands, as far as checkout is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeOutcome {
    /// The customer was charged.
    Charged,
    /// The charge was refused or reversed and will not complete.
    Declined,
    /// No charge yet; asking again later may give a different answer.
    Open,
}

/// Webhook body. Only the fields the checkout workflow needs.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    pub data: WebhookData,
}

/// `data` of a webhook event.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookData {
    #[serde(default)]
    pub reference: Option<String>,
}
