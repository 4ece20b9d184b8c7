//! Seams to outbound collaborators: email and payment gateways.

pub mod mailer;
pub mod payment;

use std::future::Future;

use tracing::warn;

pub use mailer::{Email, LogMailer, Mailer};
pub use payment::{
    gateway_for, ChargeOutcome, ChargeRequest, PaymentGateway, PaymentMethod, SandboxGateway,
};

/// Run `task` in the background. Failures are logged and never reach the
/// caller, whose operation has already committed.
pub fn dispatch<F>(name: &'static str, task: F)
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(err) = task.await {
            warn!(task = name, error = %err, "background task failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn dispatch_runs_detached() {
        let (tx, rx) = oneshot::channel();
        dispatch("probe", async move {
            let _ = tx.send(42);
            Ok(())
        });
        assert_eq!(rx.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn dispatch_swallows_errors() {
        let (tx, rx) = oneshot::channel::<()>();
        dispatch("failing", async move {
            drop(tx);
            anyhow::bail!("smtp unreachable")
        });
        assert!(rx.await.is_err());
    }
}
