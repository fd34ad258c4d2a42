//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::Notify;

use crate::config::ApiConfig;
use crate::services::{
    AlertHub, CatalogCache, CheckoutService, EmailService, GoogleOAuthClient, ImageStore,
    OutboxWorker, PaystackClient, PaystackError,
};

/// Error building application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("payment client: {0}")]
    Paystack(#[from] PaystackError),
    #[error("smtp: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ApiConfig,
    pool: PgPool,
    paystack: PaystackClient,
    email: EmailService,
    alerts: AlertHub,
    outbox_notify: Arc<Notify>,
    catalog: CatalogCache,
    images: ImageStore,
    google: Option<GoogleOAuthClient>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if the payment or SMTP client cannot be built.
    pub fn new(config: ApiConfig, pool: PgPool) -> Result<Self, StateError> {
        let paystack = PaystackClient::new(&config.paystack)?;
        let email = EmailService::new(config.email.as_ref(), &config.app_url)?;
        let images = ImageStore::new(&config.upload_dir, &config.base_url);
        let google = config
            .google
            .as_ref()
            .map(|g| GoogleOAuthClient::new(g, &config.base_url, reqwest::Client::new()));

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                paystack,
                email,
                alerts: AlertHub::new(),
                outbox_notify: Arc::new(Notify::new()),
                catalog: CatalogCache::new(),
                images,
                google,
            }),
        })
    }

    /// Get a reference to the API configuration.
    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    #[must_use]
    pub fn paystack(&self) -> &PaystackClient {
        &self.inner.paystack
    }

    #[must_use]
    pub fn email(&self) -> &EmailService {
        &self.inner.email
    }

    /// Admin alert hub.
    #[must_use]
    pub fn alerts(&self) -> &AlertHub {
        &self.inner.alerts
    }

    /// Wake the outbox worker after committing events.
    pub fn wake_outbox(&self) {
        self.inner.outbox_notify.notify_one();
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogCache {
        &self.inner.catalog
    }

    #[must_use]
    pub fn images(&self) -> &ImageStore {
        &self.inner.images
    }

    /// Google sign-in client, when configured.
    #[must_use]
    pub fn google(&self) -> Option<&GoogleOAuthClient> {
        self.inner.google.as_ref()
    }

    /// Checkout workflow bound to this state.
    #[must_use]
    pub fn checkout(&self) -> CheckoutService<'_> {
        CheckoutService::new(
            &self.inner.pool,
            &self.inner.paystack,
            &self.inner.config.paystack,
            self.inner.config.low_stock_threshold,
            &self.inner.outbox_notify,
        )
    }

    /// Outbox worker sharing this state's pool, mailer, hub and wake-up.
    #[must_use]
    pub fn outbox_worker(&self) -> OutboxWorker {
        OutboxWorker::new(
            self.inner.pool.clone(),
            self.inner.email.clone(),
            self.inner.alerts.clone(),
            Arc::clone(&self.inner.outbox_notify),
            self.inner.config.outbox,
        )
    }
}
