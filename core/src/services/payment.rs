use std::{str::FromStr, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::MarketError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    Paypal,
    BankTransfer,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::Paypal => "paypal",
            PaymentMethod::BankTransfer => "bank_transfer",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit_card" => Ok(PaymentMethod::CreditCard),
            "paypal" => Ok(PaymentMethod::Paypal),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            other => Err(MarketError::invalid(format!("unknown payment method {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChargeRequest {
    pub method: PaymentMethod,
    pub amount: f64,
    pub currency: String,
    pub token: String,
    pub description: String,
}

impl ChargeRequest {
    /// Amount in the currency's minor unit.
    pub fn amount_minor(&self) -> i64 {
        (self.amount * 100.0).round() as i64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeOutcome {
    pub success: bool,
    pub transaction_id: Option<String>,
    pub message: String,
}

/// A third-party payment processor.
///
/// `Err` means the gateway could not be reached; a reachable gateway that
/// refuses the charge answers `Ok` with `success == false`.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &'static str;

    async fn charge(&self, req: &ChargeRequest) -> anyhow::Result<ChargeOutcome>;
}

/// Offline gateway: approves every token except those starting with `tok_fail`.
#[derive(Debug, Clone, Default)]
pub struct SandboxGateway;

#[async_trait]
impl PaymentGateway for SandboxGateway {
    fn name(&self) -> &'static str {
        "sandbox"
    }

    async fn charge(&self, req: &ChargeRequest) -> anyhow::Result<ChargeOutcome> {
        if req.token.starts_with("tok_fail") {
            return Ok(ChargeOutcome {
                success: false,
                transaction_id: None,
                message: "card declined".into(),
            });
        }
        let txn = format!("sbx_{}", Uuid::new_v4().simple());
        info!(
            method = req.method.as_str(),
            amount_minor = req.amount_minor(),
            currency = %req.currency,
            transaction = %txn,
            "sandbox charge approved"
        );
        Ok(ChargeOutcome {
            success: true,
            transaction_id: Some(txn),
            message: "Payment successful".into(),
        })
    }
}

/// Select the configured payment processor by name.
pub fn gateway_for(processor: &str) -> anyhow::Result<Arc<dyn PaymentGateway>> {
    match processor {
        "sandbox" => Ok(Arc::new(SandboxGateway)),
        other => anyhow::bail!("invalid payment processor configured: {other}"),
    }
}
