//! Fan-out: turn one mutation into a delivery attempt for every other
//! tracked device.

use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;

use crate::observability::{Logger, Severity};
use crate::registry::ClientRegistry;
use crate::spool::Spool;

use super::errors::BroadcastResult;
use super::event::Event;

/// Fans an [`Event`] out to every tracked device except the one that
/// caused it.
///
/// Delivery to a connected device is non-blocking: a full or closed
/// channel falls back to the spool rather than stalling the mutation
/// that produced the event. A device that isn't connected at all is
/// spooled directly.
pub struct Broadcaster {
    registry: Arc<ClientRegistry>,
    spool: Arc<Spool>,
}

impl Broadcaster {
    pub fn new(registry: Arc<ClientRegistry>, spool: Arc<Spool>) -> Self {
        Self { registry, spool }
    }

    /// Deliver `event` to every tracked device other than
    /// `exclude_device` (normally the device whose push produced it).
    pub fn broadcast(&self, event: &Event, exclude_device: &str) -> BroadcastResult<()> {
        for device_id in self.registry.all_tracked() {
            if device_id == exclude_device {
                continue;
            }
            self.deliver_to(&device_id, event)?;
        }
        Ok(())
    }

    fn deliver_to(&self, device_id: &str, event: &Event) -> BroadcastResult<()> {
        let Some(sender) = self.registry.active_sender(device_id) else {
            self.spool.append(device_id, event)?;
            return Ok(());
        };

        match sender.try_send(event.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                Logger::warn("broadcast_channel_full", &[("device_id", device_id), ("event", event.name())]);
                self.spool.append(device_id, event)?;
                Ok(())
            }
            Err(TrySendError::Closed(_)) => {
                self.spool.append(device_id, event)?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    fn setup(temp: &TempDir) -> (Arc<ClientRegistry>, Arc<Spool>) {
        let registry = Arc::new(ClientRegistry::new(temp.path()).unwrap());
        let spool = Arc::new(Spool::new(temp.path()));
        (registry, spool)
    }

    #[tokio::test]
    async fn delivers_to_connected_device_directly() {
        let temp = TempDir::new().unwrap();
        let (registry, spool) = setup(&temp);
        registry.track("a");
        registry.track("b");
        let (tx, mut rx) = mpsc::channel(8);
        registry.register("b", tx);

        let broadcaster = Broadcaster::new(registry.clone(), spool.clone());
        let event = Event::FileDeleted { path: "x.md".into() };
        broadcaster.broadcast(&event, "a").unwrap();

        assert_eq!(rx.recv().await, Some(event));
        assert_eq!(spool.drain("b").unwrap().len(), 0);
    }

    #[tokio::test]
    async fn spools_for_offline_device() {
        let temp = TempDir::new().unwrap();
        let (registry, spool) = setup(&temp);
        registry.track("a");
        registry.track("b");

        let broadcaster = Broadcaster::new(registry.clone(), spool.clone());
        let event = Event::FileDeleted { path: "x.md".into() };
        broadcaster.broadcast(&event, "a").unwrap();

        assert_eq!(spool.drain("b").unwrap(), vec![event]);
    }

    #[tokio::test]
    async fn excludes_originating_device() {
        let temp = TempDir::new().unwrap();
        let (registry, spool) = setup(&temp);
        registry.track("a");

        let broadcaster = Broadcaster::new(registry.clone(), spool.clone());
        broadcaster.broadcast(&Event::FullSyncRequired { message: "resync".into() }, "a").unwrap();

        assert_eq!(spool.drain("a").unwrap().len(), 0);
    }

    #[tokio::test]
    async fn falls_back_to_spool_when_channel_is_full() {
        let temp = TempDir::new().unwrap();
        let (registry, spool) = setup(&temp);
        registry.track("a");
        registry.track("b");
        let (tx, _rx) = mpsc::channel(1);
        tx.try_send(Event::FullSyncRequired { message: "filler".into() }).unwrap();
        registry.register("b", tx);

        let broadcaster = Broadcaster::new(registry.clone(), spool.clone());
        let event = Event::FileDeleted { path: "x.md".into() };
        broadcaster.broadcast(&event, "a").unwrap();

        assert_eq!(spool.drain("b").unwrap(), vec![event]);
    }
}
