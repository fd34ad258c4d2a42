//! Business logic services for the API.
//!
//! # Services
//!
//! - `auth` - Registration, login and account updates (argon2 passwords)
//! - `google` - Google sign-in (OAuth authorization code flow)
//! - `checkout` - Payment initiation, verification and order fulfilment
//! - `paystack` - Paystack REST client and webhook signatures
//! - `outbox` - Background delivery of emails and admin alerts
//! - `email` - Transactional email over SMTP
//! - `alerts` - Broadcast hub behind the admin alert websocket
//! - `catalog` - Cached size and color lists
//! - `uploads` - Product image storage

pub mod alerts;
pub mod auth;
pub mod catalog;
pub mod checkout;
pub mod email;
pub mod google;
pub mod outbox;
pub mod paystack;
pub mod uploads;

pub use alerts::{AlertEvent, AlertHub};
pub use auth::{AuthError, AuthService};
pub use catalog::CatalogCache;
pub use checkout::{CheckoutError, CheckoutService};
pub use email::EmailService;
pub use google::GoogleOAuthClient;
pub use outbox::OutboxWorker;
pub use paystack::{PaystackClient, PaystackError};
pub use uploads::{ImageStore, UploadError};
