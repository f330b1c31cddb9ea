//! Single-owner task that serializes every input to the session.
//!
//! User commands, radio events and timers are all handled on one task, so
//! the session state machine never sees two inputs at once. UI code talks
//! to it through a cloneable [`ServiceHandle`].

use crate::codec::Frame;
use crate::config::HandshakeConfig;
use crate::error::{ProximityError, Result};
use crate::radio::{Radio, RadioEvent};
use crate::session::{session_channels, PaymentSessionManager, SessionTimer};
use crate::types::{ConnectionState, PaymentEvent, PaymentOutcome, PaymentRequestFrame};
use crate::wallet::WalletProvider;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    StartScanning(Reply<()>),
    StopScanning(Reply<()>),
    StartAdvertising(Reply<()>),
    StopAdvertising(Reply<()>),
    Broadcast {
        amount: Decimal,
        wallet_address: Option<String>,
        note: Option<String>,
        reply: Reply<PaymentRequestFrame>,
    },
    Respond {
        approved: bool,
        reply: Reply<PaymentOutcome>,
    },
    Disconnect(Reply<()>),
    Shutdown(oneshot::Sender<()>),
}

pub struct ProximityService {
    session: PaymentSessionManager,
    wallet: Arc<dyn WalletProvider>,
    commands: mpsc::UnboundedReceiver<Command>,
    radio_events: mpsc::UnboundedReceiver<RadioEvent>,
    timers: mpsc::UnboundedReceiver<SessionTimer>,
}

impl ProximityService {
    /// Start the service task.
    ///
    /// Returns the handle for issuing commands and the stream of payment
    /// events for the UI.
    pub fn spawn(
        radio: Arc<dyn Radio>,
        radio_events: mpsc::UnboundedReceiver<RadioEvent>,
        wallet: Arc<dyn WalletProvider>,
        config: HandshakeConfig,
    ) -> (ServiceHandle, mpsc::UnboundedReceiver<PaymentEvent>) {
        let (outputs, watchers) = session_channels();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let session =
            PaymentSessionManager::new(config, radio, Arc::clone(&wallet), outputs, timer_tx);
        let service = Self {
            session,
            wallet,
            commands: command_rx,
            radio_events,
            timers: timer_rx,
        };
        tokio::spawn(service.run());

        let handle = ServiceHandle {
            commands: command_tx,
            received_message: watchers.received_message,
            connection_state: watchers.connection_state,
            in_range: watchers.in_range,
        };
        (handle, watchers.events)
    }

    async fn run(mut self) {
        info!("Proximity service started");
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown(done)) => {
                        self.session.shutdown().await;
                        let _ = done.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("All service handles dropped");
                        self.session.shutdown().await;
                        break;
                    }
                },
                Some(event) = self.radio_events.recv() => {
                    self.session.handle_radio_event(event).await;
                }
                Some(timer) = self.timers.recv() => {
                    self.session.handle_timer(timer).await;
                }
            }
        }
        info!("Proximity service stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::StartScanning(reply) => {
                let _ = reply.send(self.session.start_scanning().await);
            }
            Command::StopScanning(reply) => {
                let _ = reply.send(self.session.stop_scanning().await);
            }
            Command::StartAdvertising(reply) => {
                let _ = reply.send(self.session.start_advertising().await);
            }
            Command::StopAdvertising(reply) => {
                let _ = reply.send(self.session.stop_advertising().await);
            }
            Command::Broadcast {
                amount,
                wallet_address,
                note,
                reply,
            } => {
                let result = match wallet_address.or_else(|| self.wallet.current_address()) {
                    Some(address) => {
                        self.session
                            .broadcast_payment_request(amount, &address, note)
                            .await
                    }
                    None => Err(ProximityError::WalletUnavailable),
                };
                let _ = reply.send(result);
            }
            Command::Respond { approved, reply } => {
                let _ = reply.send(self.session.send_payment_response(approved).await);
            }
            Command::Disconnect(reply) => {
                let _ = reply.send(self.session.disconnect().await);
            }
            Command::Shutdown(done) => {
                let _ = done.send(());
            }
        }
    }
}

/// Cloneable front door to a running [`ProximityService`]
#[derive(Clone)]
pub struct ServiceHandle {
    commands: mpsc::UnboundedSender<Command>,
    received_message: watch::Receiver<Option<Frame>>,
    connection_state: watch::Receiver<ConnectionState>,
    in_range: watch::Receiver<bool>,
}

impl ServiceHandle {
    pub async fn start_scanning(&self) -> Result<()> {
        self.request(Command::StartScanning).await
    }

    pub async fn stop_scanning(&self) -> Result<()> {
        self.request(Command::StopScanning).await
    }

    pub async fn start_advertising(&self) -> Result<()> {
        self.request(Command::StartAdvertising).await
    }

    pub async fn stop_advertising(&self) -> Result<()> {
        self.request(Command::StopAdvertising).await
    }

    /// Broadcast a request paid to `wallet_address`, or to the wallet's own
    /// address when `None`
    pub async fn broadcast_payment_request(
        &self,
        amount: Decimal,
        wallet_address: Option<String>,
        note: Option<String>,
    ) -> Result<PaymentRequestFrame> {
        self.request(|reply| Command::Broadcast {
            amount,
            wallet_address,
            note,
            reply,
        })
        .await
    }

    pub async fn send_payment_response(&self, approved: bool) -> Result<PaymentOutcome> {
        self.request(|reply| Command::Respond { approved, reply })
            .await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.request(Command::Disconnect).await
    }

    /// Stop both roles and end the service task. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        let (done, wait) = oneshot::channel();
        if self.commands.send(Command::Shutdown(done)).is_ok() {
            let _ = wait.await;
        }
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    /// Last decoded frame: the pending request on the scanner, the response
    /// on the advertiser
    pub fn received_message(&self) -> watch::Receiver<Option<Frame>> {
        self.received_message.clone()
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection_state.clone()
    }

    pub fn in_range(&self) -> watch::Receiver<bool> {
        self.in_range.clone()
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .map_err(|_| ProximityError::ServiceStopped)?;
        response.await.map_err(|_| ProximityError::ServiceStopped)?
    }
}
