// Connection Controller - scanner-side link state machine

use crate::signal::{SignalConfig, SignalFilter};
use crate::types::{ConnectionState, PeerId, ProximitySample};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Radio-level inputs relevant to the scanner link
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Discovered { peer: PeerId, sample: ProximitySample },
    Connected { peer: PeerId },
    ConnectFailed { peer: PeerId },
    ServicesDiscovered { peer: PeerId, characteristic_found: bool },
    Disconnected { peer: PeerId },
}

/// Side effects requested by the controller, in the order they must run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAction {
    StartScan,
    StopScan,
    /// Restart discovery after the link went away
    ResumeScan,
    Connect(PeerId),
    DiscoverServices(PeerId),
    Subscribe(PeerId),
    Disconnect(PeerId),
    /// The payment characteristic is subscribed and frames can flow
    LinkReady(PeerId),
    /// The link to this peer is gone
    LinkClosed(PeerId),
    ProximityEntered(PeerId),
    InRangeChanged(bool),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Link {
    Idle,
    Connecting { peer: PeerId },
    Discovering { peer: PeerId },
    Ready { peer: PeerId },
}

impl Link {
    fn peer(&self) -> Option<&PeerId> {
        match self {
            Link::Idle => None,
            Link::Connecting { peer } | Link::Discovering { peer } | Link::Ready { peer } => {
                Some(peer)
            }
        }
    }
}

pub struct ConnectionController {
    config: SignalConfig,
    /// One filter per advertiser so a candidate is judged on its own readings
    filters: HashMap<PeerId, SignalFilter>,
    link: Link,
    scanning: bool,
}

impl ConnectionController {
    pub fn new(config: SignalConfig) -> Self {
        Self {
            config,
            filters: HashMap::new(),
            link: Link::Idle,
            scanning: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        match self.link {
            Link::Idle => ConnectionState::Disconnected,
            Link::Connecting { .. } => ConnectionState::Connecting,
            Link::Discovering { .. } | Link::Ready { .. } => ConnectionState::Connected,
        }
    }

    pub fn peer(&self) -> Option<&PeerId> {
        self.link.peer()
    }

    /// True once the payment characteristic has been located
    pub fn is_ready(&self) -> bool {
        matches!(self.link, Link::Ready { .. })
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// True while any discovered peer is within the proximity threshold
    pub fn is_in_range(&self) -> bool {
        self.filters.values().any(SignalFilter::is_in_range)
    }

    pub fn start_scanning(&mut self) -> Vec<LinkAction> {
        if self.scanning {
            return Vec::new();
        }
        info!("Continuous scanning requested");
        self.scanning = true;
        match self.link {
            Link::Idle => vec![LinkAction::StartScan],
            _ => Vec::new(),
        }
    }

    pub fn stop_scanning(&mut self) -> Vec<LinkAction> {
        if !self.scanning {
            return Vec::new();
        }
        info!("Continuous scanning stopped");
        self.scanning = false;
        match self.link {
            Link::Idle => {
                let mut actions = vec![LinkAction::StopScan];
                if self.clear_filters() {
                    actions.push(LinkAction::InRangeChanged(false));
                }
                actions
            }
            _ => Vec::new(),
        }
    }

    /// Tear down the current link, if any
    pub fn disconnect(&mut self) -> Vec<LinkAction> {
        match self.link.peer().cloned() {
            Some(peer) => {
                info!(peer = %peer, "Disconnecting link");
                let mut actions = vec![LinkAction::Disconnect(peer.clone())];
                actions.extend(self.close_link(peer));
                actions
            }
            None => Vec::new(),
        }
    }

    pub fn handle(&mut self, event: LinkEvent) -> Vec<LinkAction> {
        match event {
            LinkEvent::Discovered { peer, sample } => self.on_discovered(peer, sample),
            LinkEvent::Connected { peer } => self.on_connected(peer),
            LinkEvent::ConnectFailed { peer } => self.on_connect_failed(peer),
            LinkEvent::ServicesDiscovered {
                peer,
                characteristic_found,
            } => self.on_services_discovered(peer, characteristic_found),
            LinkEvent::Disconnected { peer } => self.on_disconnected(peer),
        }
    }

    fn on_discovered(&mut self, peer: PeerId, sample: ProximitySample) -> Vec<LinkAction> {
        let was_in_range = self.is_in_range();
        let config = &self.config;
        let decision = match self
            .filters
            .entry(peer.clone())
            .or_insert_with(|| SignalFilter::new(config.clone()))
            .observe(sample)
        {
            Some(decision) => decision,
            None => return Vec::new(),
        };

        let mut actions = Vec::new();
        if decision.entered {
            actions.push(LinkAction::ProximityEntered(peer.clone()));
        }
        let in_range = self.is_in_range();
        if in_range != was_in_range {
            actions.push(LinkAction::InRangeChanged(in_range));
        }

        if decision.connect_ready && self.scanning && self.link == Link::Idle {
            info!(
                peer = %peer,
                rssi = decision.smoothed,
                "Peer is connect-ready, initiating connection"
            );
            self.link = Link::Connecting { peer: peer.clone() };
            actions.push(LinkAction::StopScan);
            actions.push(LinkAction::Connect(peer));
        }

        actions
    }

    fn on_connected(&mut self, peer: PeerId) -> Vec<LinkAction> {
        match &self.link {
            Link::Connecting { peer: expected } if *expected == peer => {
                debug!(peer = %peer, "Link established, discovering services");
                self.link = Link::Discovering { peer: peer.clone() };
                vec![LinkAction::DiscoverServices(peer)]
            }
            Link::Idle => {
                // Connect completed after we gave up on it
                debug!(peer = %peer, "Dropping late connection");
                vec![LinkAction::Disconnect(peer)]
            }
            _ => Vec::new(),
        }
    }

    fn on_connect_failed(&mut self, peer: PeerId) -> Vec<LinkAction> {
        match &self.link {
            Link::Connecting { peer: expected } if *expected == peer => {
                warn!(peer = %peer, "Connection attempt failed");
                self.close_link(peer)
            }
            _ => Vec::new(),
        }
    }

    fn on_services_discovered(&mut self, peer: PeerId, found: bool) -> Vec<LinkAction> {
        match &self.link {
            Link::Discovering { peer: expected } if *expected == peer => {
                if found {
                    info!(peer = %peer, "Payment characteristic located");
                    self.link = Link::Ready { peer: peer.clone() };
                    vec![
                        LinkAction::Subscribe(peer.clone()),
                        LinkAction::LinkReady(peer),
                    ]
                } else {
                    warn!(peer = %peer, "Payment characteristic missing, dropping link");
                    let mut actions = vec![LinkAction::Disconnect(peer.clone())];
                    actions.extend(self.close_link(peer));
                    actions
                }
            }
            _ => Vec::new(),
        }
    }

    fn on_disconnected(&mut self, peer: PeerId) -> Vec<LinkAction> {
        if self.link.peer() != Some(&peer) {
            return Vec::new();
        }
        info!(peer = %peer, "Link dropped");
        self.close_link(peer)
    }

    fn close_link(&mut self, peer: PeerId) -> Vec<LinkAction> {
        self.link = Link::Idle;
        let was_in_range = self.clear_filters();

        let mut actions = vec![LinkAction::LinkClosed(peer)];
        if was_in_range {
            actions.push(LinkAction::InRangeChanged(false));
        }
        if self.scanning {
            actions.push(LinkAction::ResumeScan);
        }
        actions
    }

    /// Forget every peer's history; returns whether any peer was in range
    fn clear_filters(&mut self) -> bool {
        let was_in_range = self.is_in_range();
        self.filters.clear();
        was_in_range
    }
}
