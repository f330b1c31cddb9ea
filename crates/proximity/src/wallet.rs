use async_trait::async_trait;
use rust_decimal::Decimal;

/// Wallet collaborator that actually moves funds.
///
/// Signing and settlement live behind this trait.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Send `amount` to `recipient` and return the transaction hash
    async fn send_transaction(&self, amount: Decimal, recipient: &str) -> anyhow::Result<String>;

    /// Address of the local wallet, if one is connected
    fn current_address(&self) -> Option<String>;
}
