//! # Network Monitor
//!
//! Connectivity signal for the sync layer.
//!
//! ## Features
//!
//! - **Connectivity Detection**: reported online/offline status, checked
//!   synchronously before every mutation
//! - **Forced Offline**: a client-side gate that makes the app behave as
//!   offline regardless of the reported status
//! - **Real-time Updates**: effective status changes are broadcast on a
//!   `watch` channel, which drives replay on reconnect

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Online,
    /// Connectivity is reported but the client is forced offline
    ForcedOffline,
    Offline,
}

#[derive(Debug)]
pub struct NetworkMonitor {
    reported: AtomicBool,
    forced_offline: AtomicBool,
    sender: watch::Sender<bool>,
}

impl NetworkMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (sender, _receiver) = watch::channel(initially_online);
        Self {
            reported: AtomicBool::new(initially_online),
            forced_offline: AtomicBool::new(false),
            sender,
        }
    }

    /// Effective connectivity used to route mutations
    pub fn is_online(&self) -> bool {
        self.reported.load(Ordering::SeqCst) && !self.forced_offline.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> NetworkStatus {
        match (
            self.reported.load(Ordering::SeqCst),
            self.forced_offline.load(Ordering::SeqCst),
        ) {
            (true, false) => NetworkStatus::Online,
            (true, true) => NetworkStatus::ForcedOffline,
            (false, _) => NetworkStatus::Offline,
        }
    }

    /// Record connectivity reported by the platform
    pub fn set_reported(&self, online: bool) {
        self.reported.store(online, Ordering::SeqCst);
        self.publish();
    }

    /// Force the client offline, or lift the gate
    pub fn force_offline(&self, forced: bool) {
        self.forced_offline.store(forced, Ordering::SeqCst);
        self.publish();
    }

    /// Receiver of effective connectivity changes
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }

    fn publish(&self) {
        let online = self.is_online();
        let previous = self.sender.send_replace(online);
        if previous != online {
            tracing::info!(online, "Network status changed");
        }
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}
