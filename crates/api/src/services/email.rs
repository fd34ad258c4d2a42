//! Email service for order notifications and account emails.
//!
//! Uses SMTP via lettre for delivery with Askama HTML and text templates.
//! Without SMTP configuration the service runs disabled: messages are
//! logged and reported as sent.

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use rand::Rng;
use rand::distr::Alphanumeric;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use thiserror::Error;

use tradepost_core::{OrderId, OrderStatus, ProductId};

use crate::config::EmailConfig;

/// One order line as shown in emails.
#[derive(Debug, Clone)]
pub struct EmailLine {
    pub name: String,
    pub quantity: i32,
    pub price: Decimal,
}

#[derive(Template)]
#[template(path = "email/order_confirmation.html")]
struct OrderConfirmationHtml<'a> {
    name: &'a str,
    order_id: OrderId,
    items: &'a [EmailLine],
    total: Decimal,
    orders_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct OrderConfirmationText<'a> {
    name: &'a str,
    order_id: OrderId,
    items: &'a [EmailLine],
    total: Decimal,
    orders_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/order_status.html")]
struct OrderStatusHtml<'a> {
    name: &'a str,
    order_id: OrderId,
    status: OrderStatus,
    orders_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/order_status.txt")]
struct OrderStatusText<'a> {
    name: &'a str,
    order_id: OrderId,
    status: OrderStatus,
    orders_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/low_stock.html")]
struct LowStockHtml<'a> {
    product_name: &'a str,
    product_id: ProductId,
    stock: i32,
}

#[derive(Template)]
#[template(path = "email/low_stock.txt")]
struct LowStockText<'a> {
    product_name: &'a str,
    product_id: ProductId,
    stock: i32,
}

#[derive(Template)]
#[template(path = "email/refund_required.html")]
struct RefundRequiredHtml<'a> {
    reference: &'a str,
    amount: Decimal,
    currency: &'a str,
    reason: &'a str,
}

#[derive(Template)]
#[template(path = "email/refund_required.txt")]
struct RefundRequiredText<'a> {
    reference: &'a str,
    amount: Decimal,
    currency: &'a str,
    reason: &'a str,
}

#[derive(Template)]
#[template(path = "email/password_reset.html")]
struct PasswordResetHtml<'a> {
    reset_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/password_reset.txt")]
struct PasswordResetText<'a> {
    reset_url: &'a str,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

#[derive(Clone)]
struct Smtp {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    smtp: Option<Smtp>,
    app_url: String,
}

impl EmailService {
    /// Create an email service. `None` config gives a disabled service.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be set up.
    pub fn new(config: Option<&EmailConfig>, app_url: &str) -> Result<Self, SmtpError> {
        let smtp = match config {
            Some(config) => {
                let credentials = Credentials::new(
                    config.smtp_username.clone(),
                    config.smtp_password.expose_secret().to_string(),
                );

                let mailer =
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
                        .port(config.smtp_port)
                        .credentials(credentials)
                        .build();

                Some(Smtp {
                    mailer,
                    from_address: config.from_address.clone(),
                })
            }
            None => {
                tracing::warn!("SMTP not configured, emails will be logged and skipped");
                None
            }
        };

        Ok(Self {
            smtp,
            app_url: app_url.trim_end_matches('/').to_owned(),
        })
    }

    /// A service that never talks to SMTP.
    #[must_use]
    pub fn disabled(app_url: &str) -> Self {
        Self {
            smtp: None,
            app_url: app_url.trim_end_matches('/').to_owned(),
        }
    }

    /// Whether messages are actually delivered.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.smtp.is_some()
    }

    fn orders_url(&self) -> String {
        format!("{}/orders", self.app_url)
    }

    /// Send an order confirmation to the customer.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_order_confirmation(
        &self,
        to: &str,
        name: &str,
        order_id: OrderId,
        items: &[EmailLine],
        total: Decimal,
    ) -> Result<(), EmailError> {
        let orders_url = self.orders_url();
        let html = OrderConfirmationHtml {
            name,
            order_id,
            items,
            total,
            orders_url: &orders_url,
        }
        .render()?;
        let text = OrderConfirmationText {
            name,
            order_id,
            items,
            total,
            orders_url: &orders_url,
        }
        .render()?;

        self.send_multipart_email(to, "Order Confirmation", &text, &html)
            .await
    }

    /// Tell the customer their order moved to a new status.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_order_status_update(
        &self,
        to: &str,
        name: &str,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<(), EmailError> {
        let orders_url = self.orders_url();
        let html = OrderStatusHtml {
            name,
            order_id,
            status,
            orders_url: &orders_url,
        }
        .render()?;
        let text = OrderStatusText {
            name,
            order_id,
            status,
            orders_url: &orders_url,
        }
        .render()?;

        self.send_multipart_email(to, &format!("Order Status Update: {status}"), &text, &html)
            .await
    }

    /// Warn an admin that a product is nearly sold out.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_low_stock_alert(
        &self,
        to: &str,
        product_id: ProductId,
        product_name: &str,
        stock: i32,
    ) -> Result<(), EmailError> {
        let html = LowStockHtml {
            product_name,
            product_id,
            stock,
        }
        .render()?;
        let text = LowStockText {
            product_name,
            product_id,
            stock,
        }
        .render()?;

        self.send_multipart_email(to, "Low Stock Alert", &text, &html)
            .await
    }

    /// Ask an admin to refund a charge that produced no order.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_refund_required(
        &self,
        to: &str,
        reference: &str,
        amount: Decimal,
        currency: &str,
        reason: &str,
    ) -> Result<(), EmailError> {
        let html = RefundRequiredHtml {
            reference,
            amount,
            currency,
            reason,
        }
        .render()?;
        let text = RefundRequiredText {
            reference,
            amount,
            currency,
            reason,
        }
        .render()?;

        self.send_multipart_email(to, &format!("Refund Required: {reference}"), &text, &html)
            .await
    }

    /// Send a password reset link carrying `token`.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_password_reset(&self, to: &str, token: &str) -> Result<(), EmailError> {
        let reset_url = format!("{}/reset-password?token={token}", self.app_url);
        let html = PasswordResetHtml {
            reset_url: &reset_url,
        }
        .render()?;
        let text = PasswordResetText {
            reset_url: &reset_url,
        }
        .render()?;

        self.send_multipart_email(to, "Password Reset Request", &text, &html)
            .await
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<(), EmailError> {
        let Some(smtp) = &self.smtp else {
            tracing::info!(to = %to, subject = %subject, "Email disabled, skipping send");
            return Ok(());
        };

        let email = Message::builder()
            .from(
                smtp.from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(smtp.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| EmailError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        smtp.mailer.send(email).await?;

        tracing::info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

/// Generate a 48-character URL-safe reset token.
#[must_use]
pub fn generate_reset_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(48)
        .map(char::from)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_generate_reset_token_format() {
        let token = generate_reset_token();
        assert_eq!(token.len(), 48);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(token, generate_reset_token());
    }

    #[test]
    fn test_order_confirmation_text_lists_items() {
        let items = vec![EmailLine {
            name: "Linen Shirt".to_owned(),
            quantity: 2,
            price: Decimal::from_str("19.99").unwrap(),
        }];
        let text = OrderConfirmationText {
            name: "Ada",
            order_id: OrderId::new(),
            items: &items,
            total: Decimal::from_str("39.98").unwrap(),
            orders_url: "https://shop.example/orders",
        }
        .render()
        .unwrap();
        assert!(text.contains("Linen Shirt x2 @ 19.99"));
        assert!(text.contains("Total: 39.98"));
    }

    #[test]
    fn test_html_escapes_product_names() {
        let html = LowStockHtml {
            product_name: "<b>Mug</b>",
            product_id: ProductId::new(),
            stock: 1,
        }
        .render()
        .unwrap();
        assert!(!html.contains("<b>Mug</b>"));
        assert!(html.contains("&#60;b&#62;Mug") || html.contains("&lt;b&gt;Mug"));
    }

    #[test]
    fn test_refund_required_text() {
        let text = RefundRequiredText {
            reference: "tp_abc",
            amount: Decimal::from_str("2500.00").unwrap(),
            currency: "NGN",
            reason: "insufficient stock after payment",
        }
        .render()
        .unwrap();
        assert!(text.contains("Reference: tp_abc"));
        assert!(text.contains("Amount: 2500.00 NGN"));
        assert!(text.contains("Reason: insufficient stock after payment"));
    }

    #[tokio::test]
    async fn test_disabled_service_reports_success() {
        let service = EmailService::disabled("https://shop.example/");
        assert!(!service.is_enabled());
        service
            .send_password_reset("ada@example.com", "token123")
            .await
            .unwrap();
    }
}
