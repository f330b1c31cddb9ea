use async_trait::async_trait;
use proximity::WalletProvider;
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

/// Wallet that settles instantly with a random transaction hash
pub struct DemoWallet {
    address: String,
}

impl DemoWallet {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

#[async_trait]
impl WalletProvider for DemoWallet {
    async fn send_transaction(&self, amount: Decimal, recipient: &str) -> anyhow::Result<String> {
        if amount <= Decimal::ZERO {
            anyhow::bail!("amount must be positive");
        }
        let hash = format!("0x{}", Uuid::new_v4().simple());
        info!(%amount, recipient, tx = %hash, "Demo transaction settled");
        Ok(hash)
    }

    fn current_address(&self) -> Option<String> {
        Some(self.address.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_demo_wallet_returns_unique_hashes() {
        let wallet = DemoWallet::new("0xdemo");
        let a = wallet.send_transaction(Decimal::ONE, "0xmerchant").await.unwrap();
        let b = wallet.send_transaction(Decimal::ONE, "0xmerchant").await.unwrap();
        assert!(a.starts_with("0x"));
        assert_ne!(a, b);
        assert!(wallet.send_transaction(Decimal::ZERO, "0xmerchant").await.is_err());
        assert_eq!(wallet.current_address().as_deref(), Some("0xdemo"));
    }
}
