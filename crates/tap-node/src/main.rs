mod logging;
mod wallet;

use anyhow::Result;
use proximity::{
    BtleplugRadio, HandshakeConfig, LoopbackMedium, PaymentEvent, ProximityService,
    ServiceHandle,
};
use rust_decimal::Decimal;
use shared::config::{Config, DecisionPolicy, RadioBackend};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};
use wallet::DemoWallet;

/// How often the loopback medium reports advertisers to scanners
const LOOPBACK_DISCOVERY_PERIOD: Duration = Duration::from_millis(100);

const DEMO_MERCHANT_ADDRESS: &str = "0xMERCHANT00000000000000000000000000000001";

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    logging::init_logging(config.node.log_format);

    info!(radio = ?config.node.radio, decision = ?config.node.decision, "Starting tap node");
    let handshake = HandshakeConfig::from(&config.proximity);

    match config.node.radio {
        RadioBackend::Loopback => run_loopback(&config, handshake).await,
        RadioBackend::Btleplug => run_ble(&config, handshake).await,
    }
}

/// Merchant and customer on one in-memory medium
async fn run_loopback(config: &Config, handshake: HandshakeConfig) -> Result<()> {
    let medium = LoopbackMedium::new();
    let discovery = medium.spawn_discovery(LOOPBACK_DISCOVERY_PERIOD);

    let (merchant_radio, merchant_radio_events) = medium.endpoint("merchant").await;
    let (merchant, mut merchant_events) = ProximityService::spawn(
        Arc::new(merchant_radio),
        merchant_radio_events,
        Arc::new(DemoWallet::new(DEMO_MERCHANT_ADDRESS)),
        handshake.clone(),
    );

    let (customer_radio, customer_radio_events) = medium.endpoint("customer").await;
    let (customer, customer_events) = ProximityService::spawn(
        Arc::new(customer_radio),
        customer_radio_events,
        Arc::new(DemoWallet::new(config.node.wallet_address.clone())),
        handshake,
    );
    let decisions = tokio::spawn(drive_decisions(
        customer.clone(),
        customer_events,
        config.node.decision,
    ));

    let request = merchant
        .broadcast_payment_request(Decimal::new(150, 2), None, Some("Coffee".to_string()))
        .await?;
    info!(request_id = ?request.request_id, "Merchant is broadcasting");
    customer.start_scanning().await?;

    tokio::select! {
        _ = wait_for_response(&mut merchant_events) => {}
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    customer.shutdown().await;
    merchant.shutdown().await;
    decisions.abort();
    discovery.abort();
    Ok(())
}

/// Customer role on the host Bluetooth adapter
async fn run_ble(config: &Config, handshake: HandshakeConfig) -> Result<()> {
    let (radio, radio_events) = BtleplugRadio::new(handshake.connect_timeout).await?;
    let (customer, events) = ProximityService::spawn(
        Arc::new(radio),
        radio_events,
        Arc::new(DemoWallet::new(config.node.wallet_address.clone())),
        handshake,
    );
    let decisions = tokio::spawn(drive_decisions(
        customer.clone(),
        events,
        config.node.decision,
    ));

    customer.start_scanning().await?;
    info!("Scanning for merchants, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    customer.shutdown().await;
    decisions.abort();
    Ok(())
}

/// Answer every surfaced request according to `policy`
async fn drive_decisions(
    handle: ServiceHandle,
    mut events: UnboundedReceiver<PaymentEvent>,
    policy: DecisionPolicy,
) {
    while let Some(event) = events.recv().await {
        log_event("customer", &event);
        if let PaymentEvent::RequestReceived { .. } = event {
            let approve = policy == DecisionPolicy::Approve;
            match handle.send_payment_response(approve).await {
                Ok(outcome) => info!(?outcome, "Decision sent"),
                Err(e) => warn!(category = %e.category(), "{}", e.user_message()),
            }
        }
    }
}

async fn wait_for_response(events: &mut UnboundedReceiver<PaymentEvent>) {
    while let Some(event) = events.recv().await {
        log_event("merchant", &event);
        if let PaymentEvent::ResponseReceived { .. } = event {
            return;
        }
    }
}

fn log_event(role: &str, event: &PaymentEvent) {
    match serde_json::to_string(event) {
        Ok(json) => info!(role, event = %json, "Payment event"),
        Err(e) => warn!(role, error = %e, "Failed to serialize payment event"),
    }
}
