//! Registry of device trees and scrape fan-out.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::metric::{MetricAssembler, MetricRecord};
use crate::tree::Tree;

struct Device {
    tree: Arc<Tree>,
    assembler: Arc<MetricAssembler>,
    stop: watch::Sender<bool>,
}

/// Holds one entry per registered device and fans a scrape out across all
/// of them. Registration and deregistration are rare; the map lock is only
/// held to clone the `Arc`s out, never across a tree walk.
#[derive(Default)]
pub struct Collector {
    devices: RwLock<HashMap<String, Arc<Device>>>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device. The returned receiver flips to `true` when the
    /// device (or the whole collector) is asked to stop.
    pub fn register(
        &self,
        tree: Arc<Tree>,
        assembler: Arc<MetricAssembler>,
    ) -> watch::Receiver<bool> {
        let (stop_tx, stop_rx) = watch::channel(false);
        let hostname = tree.device().to_string();
        let device = Arc::new(Device {
            tree,
            assembler,
            stop: stop_tx,
        });

        if self
            .devices
            .write()
            .insert(hostname.clone(), device)
            .is_some()
        {
            warn!(device = %hostname, "replaced existing device registration");
        }

        stop_rx
    }

    /// Remove a device and signal its session to stop.
    pub fn deregister(&self, hostname: &str) {
        if let Some(device) = self.devices.write().remove(hostname) {
            let _ = device.stop.send(true);
            debug!(device = %hostname, "deregistered");
        }
    }

    /// Signal every registered session to stop. Registrations are kept so a
    /// final scrape still sees the last state.
    pub fn stop(&self) {
        for device in self.devices.read().values() {
            let _ = device.stop.send(true);
        }
    }

    pub fn device_count(&self) -> usize {
        self.devices.read().len()
    }

    /// Assemble records from every device tree. Each walk takes that
    /// device's read lock, so the walks run on blocking threads rather than
    /// stalling the async executor.
    pub async fn collect(&self) -> Vec<MetricRecord> {
        let devices: Vec<Arc<Device>> = self.devices.read().values().cloned().collect();

        let mut set = JoinSet::new();
        for device in devices {
            set.spawn_blocking(move || device.tree.get_metrics(&device.assembler));
        }

        let mut records = Vec::new();
        while let Some(result) = set.join_next().await {
            match result {
                Ok(mut device_records) => records.append(&mut device_records),
                Err(e) => warn!(error = %e, "device scrape task failed"),
            }
        }

        records
    }

    /// Dump every device tree, devices in hostname order.
    pub fn dump(&self) -> Vec<String> {
        let mut devices: Vec<Arc<Device>> = self.devices.read().values().cloned().collect();
        devices.sort_by(|a, b| a.tree.device().cmp(b.tree.device()));

        let mut lines = Vec::new();
        for device in devices {
            lines.extend(device.tree.dump());
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::StringValueMapping;
    use crate::telemetry::TelemetryValue;

    fn assembler() -> Arc<MetricAssembler> {
        Arc::new(MetricAssembler::new(Arc::new(StringValueMapping::new())))
    }

    #[tokio::test]
    async fn test_collect_merges_devices() {
        let collector = Collector::new();

        let r1 = Arc::new(Tree::new("r1"));
        r1.insert("/interfaces/", Some(TelemetryValue::Uint64(1)));
        let r2 = Arc::new(Tree::new("r2"));
        r2.insert("/interfaces/", Some(TelemetryValue::Uint64(2)));

        collector.register(r1, assembler());
        collector.register(r2, assembler());

        let records = collector.collect().await;
        assert_eq!(records.len(), 2);
        assert_eq!(collector.device_count(), 2);

        let mut devices: Vec<&str> = records
            .iter()
            .map(|r| r.label_values[0].as_str())
            .collect();
        devices.sort();
        assert_eq!(devices, vec!["r1", "r2"]);
    }

    #[tokio::test]
    async fn test_collect_empty() {
        let collector = Collector::new();
        assert!(collector.collect().await.is_empty());
    }

    #[test]
    fn test_register_signals_on_stop() {
        let collector = Collector::new();
        let mut rx = collector.register(Arc::new(Tree::new("r1")), assembler());

        assert!(!*rx.borrow());
        collector.stop();
        assert!(*rx.borrow_and_update());
        assert_eq!(collector.device_count(), 1);
    }

    #[test]
    fn test_deregister_removes_and_signals() {
        let collector = Collector::new();
        let rx = collector.register(Arc::new(Tree::new("r1")), assembler());

        collector.deregister("r1");
        assert_eq!(collector.device_count(), 0);
        assert!(*rx.borrow());
    }

    #[test]
    fn test_reregister_replaces() {
        let collector = Collector::new();
        let first = collector.register(Arc::new(Tree::new("r1")), assembler());
        let _second = collector.register(Arc::new(Tree::new("r1")), assembler());

        assert_eq!(collector.device_count(), 1);
        // The replaced sender is gone, so the old receiver reports closure.
        assert!(first.has_changed().is_err());
    }

    #[test]
    fn test_dump_sorted_by_hostname() {
        let collector = Collector::new();

        let r2 = Arc::new(Tree::new("r2"));
        r2.insert("/b/", Some(TelemetryValue::Uint64(2)));
        let r1 = Arc::new(Tree::new("r1"));
        r1.insert("/a/", Some(TelemetryValue::Uint64(1)));

        collector.register(r2, assembler());
        collector.register(r1, assembler());

        let lines = collector.dump();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "[device=r1]() = -");
        assert_eq!(lines[2], "[device=r2]() = -");
    }
}
