use async_trait::async_trait;
use tracing::info;

use crate::error::Result;
use crate::provider::transactions::Transaction;

/// Downstream consumer of filtered transactions. Delivery guarantees are
/// the publisher's own business.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, account_code: &str, transactions: &[Transaction]) -> Result<()>;
}

/// Stand-in until the message bus is wired: logs and reports success.
#[derive(Debug, Clone, Default)]
pub struct LogPublisher;

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(&self, account_code: &str, transactions: &[Transaction]) -> Result<()> {
        info!(account = account_code, transactions = transactions.len(), "transactions ready for publishing");
        Ok(())
    }
}
