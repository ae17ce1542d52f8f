//! Per-device hierarchical telemetry store.
//!
//! One tree per device, keyed by decoded path identifiers. A single
//! reader-writer lock at the root serializes that device's ingestion
//! against scrapes of the same device; other devices are unaffected.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::id_cache::IdentifierCache;
use crate::metric::{self, Descriptor, Label, MetricAssembler, MetricRecord};
use crate::path::Identifier;
use crate::telemetry::TelemetryValue;

/// Hierarchical store for one device's live state.
pub struct Tree {
    device: String,
    cache: IdentifierCache,
    root: RwLock<Node>,
}

struct Node {
    id: Identifier,
    /// Set once the node has received an inserted value; interior nodes
    /// exist purely as path scaffolding.
    is_leaf: bool,
    value: Option<TelemetryValue>,
    description: String,
    /// Memoized (name, label keys) pair, cleared when this node's or any
    /// ancestor's description changes.
    descriptor: Mutex<Option<Arc<Descriptor>>>,
    /// Keyed uniquely by identifier; BTreeMap iteration gives the
    /// deterministic (name, raw labels) walk order.
    children: BTreeMap<Identifier, Node>,
}

impl Node {
    fn new(id: Identifier) -> Self {
        Self {
            id,
            is_leaf: false,
            value: None,
            description: String::new(),
            descriptor: Mutex::new(None),
            children: BTreeMap::new(),
        }
    }
}

fn root_identifier(device: &str) -> Identifier {
    Identifier::new("", format!("device={}", device))
}

impl Tree {
    pub fn new(device: impl Into<String>) -> Self {
        let device = device.into();
        let root = Node::new(root_identifier(&device));
        Self {
            device,
            cache: IdentifierCache::new(),
            root: RwLock::new(root),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Insert a value at `path`, creating missing interior nodes. A later
    /// insert to the same path overwrites; no history is kept.
    pub fn insert(&self, path: &str, value: Option<TelemetryValue>) {
        let ids = self.cache.resolve(path);
        self.root.write().insert(&ids, value);
    }

    /// Set the description on the node addressed by `path` (which may be an
    /// interior node). A changed description invalidates the cached
    /// descriptor of the node and of every descendant, since inherited
    /// description labels contaminate their label sets.
    pub fn set_description(&self, path: &str, text: &str) {
        let ids = self.cache.resolve(path);
        self.root.write().set_description(&ids, text);
    }

    /// Walk the tree under the shared lock and assemble one record per leaf.
    /// Children are visited in ascending `(name, raw labels)` order, so two
    /// calls without intervening writes return identical output.
    pub fn get_metrics(&self, assembler: &MetricAssembler) -> Vec<MetricRecord> {
        let root = self.root.read();
        let mut records = Vec::with_capacity(1000);
        let mut labels = Vec::new();
        root.collect_metrics("", &mut labels, &[], assembler, &mut records);
        records
    }

    /// Discard all state: the root is replaced wholesale by an empty node.
    /// The identifier cache survives, decoding is deterministic and carries
    /// no device state.
    pub fn reset(&self) {
        *self.root.write() = Node::new(root_identifier(&self.device));
    }

    /// Human-readable recursive listing for the debug endpoint.
    pub fn dump(&self) -> Vec<String> {
        let root = self.root.read();
        let mut lines = Vec::new();
        root.dump(0, &mut lines);
        lines
    }
}

impl Node {
    fn insert(&mut self, ids: &[Identifier], value: Option<TelemetryValue>) {
        match ids.split_first() {
            Some((head, rest)) => self
                .children
                .entry(head.clone())
                .or_insert_with(|| Node::new(head.clone()))
                .insert(rest, value),
            None => {
                self.is_leaf = true;
                self.value = value;
            }
        }
    }

    fn set_description(&mut self, ids: &[Identifier], text: &str) {
        match ids.split_first() {
            Some((head, rest)) => self
                .children
                .entry(head.clone())
                .or_insert_with(|| Node::new(head.clone()))
                .set_description(rest, text),
            None => {
                if self.description != text {
                    self.description = text.to_string();
                    self.clear_descriptors();
                }
            }
        }
    }

    fn clear_descriptors(&self) {
        *self.descriptor.lock() = None;
        for child in self.children.values() {
            child.clear_descriptors();
        }
    }

    fn collect_metrics(
        &self,
        parent_path: &str,
        labels: &mut Vec<Label>,
        inherited_desc: &[Label],
        assembler: &MetricAssembler,
        out: &mut Vec<MetricRecord>,
    ) {
        let path = if parent_path.is_empty() {
            self.id.name.clone()
        } else {
            format!("{}/{}", parent_path, self.id.name)
        };

        let added = if self.id.labels.is_empty() {
            0
        } else {
            let derived = metric::parse_identifier_labels(&self.id.name, &self.id.labels);
            let count = derived.len();
            labels.extend(derived);
            count
        };

        // A node with its own description re-derives the description labels;
        // everything below inherits them unchanged.
        let own_desc;
        let desc_labels: &[Label] = if self.description.is_empty() {
            inherited_desc
        } else {
            own_desc = metric::parse_description_labels(&self.description);
            &own_desc
        };

        if self.is_leaf
            && let Some(value) = &self.value
            && let Some(sample) = assembler.coerce(&path, value)
        {
            let descriptor = self.descriptor(&path, labels, desc_labels);
            let mut label_values: Vec<String> =
                Vec::with_capacity(labels.len() + desc_labels.len());
            label_values.extend(labels.iter().map(|l| l.value.clone()));
            label_values.extend(desc_labels.iter().map(|l| l.value.clone()));

            out.push(MetricRecord {
                descriptor,
                label_values,
                value: sample,
            });
        }

        for child in self.children.values() {
            child.collect_metrics(&path, labels, desc_labels, assembler, out);
        }

        labels.truncate(labels.len() - added);
    }

    fn descriptor(&self, path: &str, labels: &[Label], desc_labels: &[Label]) -> Arc<Descriptor> {
        let mut cached = self.descriptor.lock();
        if let Some(descriptor) = cached.as_ref() {
            return descriptor.clone();
        }

        let combined: Vec<Label> = labels.iter().chain(desc_labels).cloned().collect();
        let descriptor = Arc::new(Descriptor::new(path, &combined));
        *cached = Some(descriptor.clone());
        descriptor
    }

    fn dump(&self, level: usize, out: &mut Vec<String>) {
        let value = match &self.value {
            Some(v) => v.to_string(),
            None => "-".to_string(),
        };
        out.push(format!(
            "{:indent$}{}[{}]({}) = {}",
            "",
            self.id.name,
            self.id.labels,
            self.description,
            value,
            indent = level * 2
        ));

        for child in self.children.values() {
            child.dump(level + 1, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::StringValueMapping;
    use std::collections::HashMap;

    fn assembler() -> MetricAssembler {
        MetricAssembler::new(Arc::new(StringValueMapping::new()))
    }

    fn flat(records: &[MetricRecord]) -> Vec<(String, Vec<(String, String)>, f64)> {
        records
            .iter()
            .map(|r| {
                (
                    r.descriptor.name.clone(),
                    r.descriptor
                        .label_keys
                        .iter()
                        .cloned()
                        .zip(r.label_values.iter().cloned())
                        .collect(),
                    r.value,
                )
            })
            .collect()
    }

    #[test]
    fn test_insert_single_leaf() {
        let tree = Tree::new("r1");
        tree.insert("/interfaces/", Some(TelemetryValue::Uint64(100)));

        let records = flat(&tree.get_metrics(&assembler()));
        assert_eq!(
            records,
            vec![(
                "interfaces".to_string(),
                vec![("device".to_string(), "r1".to_string())],
                100.0
            )]
        );
    }

    #[test]
    fn test_label_derivation_qualified_keys() {
        let tree = Tree::new("r1");
        tree.insert(
            "/interfaces[foo='bar']/bgp/something[some='label']/",
            Some(TelemetryValue::Uint64(200)),
        );

        let records = flat(&tree.get_metrics(&assembler()));
        assert_eq!(
            records,
            vec![(
                "interfaces_bgp_something".to_string(),
                vec![
                    ("device".to_string(), "r1".to_string()),
                    ("interfaces_foo".to_string(), "bar".to_string()),
                    ("something_some".to_string(), "label".to_string()),
                ],
                200.0
            )]
        );
    }

    #[test]
    fn test_insert_overwrites() {
        let tree = Tree::new("r1");
        let path = "/interfaces/interface[name='xe-0/0/0']/state/counters/in-octets/";
        tree.insert(path, Some(TelemetryValue::Uint64(1)));
        tree.insert(path, Some(TelemetryValue::Uint64(2)));

        let records = tree.get_metrics(&assembler());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, 2.0);
    }

    #[test]
    fn test_same_name_siblings_ordered_by_raw_labels() {
        let tree = Tree::new("r1");
        tree.insert(
            "/interfaces[foo='bar']/bgp/something[some='label']/",
            Some(TelemetryValue::Uint64(200)),
        );
        tree.insert(
            "/interfaces[foo='bar']/bgp/something[some='crap']/",
            Some(TelemetryValue::Uint64(300)),
        );

        let records = flat(&tree.get_metrics(&assembler()));
        assert_eq!(records.len(), 2);
        // "some='crap'" sorts before "some='label'".
        assert_eq!(records[0].2, 300.0);
        assert_eq!(records[1].2, 200.0);
    }

    #[test]
    fn test_get_metrics_deterministic() {
        let tree = Tree::new("r1");
        tree.insert("/b/y/", Some(TelemetryValue::Int64(2)));
        tree.insert("/a/z/", Some(TelemetryValue::Int64(1)));
        tree.insert("/b/x[k='v']/", Some(TelemetryValue::Int64(3)));

        let asm = assembler();
        let first = flat(&tree.get_metrics(&asm));
        let second = flat(&tree.get_metrics(&asm));
        assert_eq!(first, second);
    }

    #[test]
    fn test_description_labels_inherited_by_descendants() {
        let tree = Tree::new("r1");
        let base = "/interfaces/interface[name='xe-0/0/0']";
        tree.set_description(base, "some_label=somevalue,another-label=foobar");
        tree.insert(
            &format!("{}/state/counters/in-octets/", base),
            Some(TelemetryValue::Uint64(5)),
        );

        let records = flat(&tree.get_metrics(&assembler()));
        assert_eq!(records.len(), 1);
        let labels = &records[0].1;
        assert!(labels.contains(&("interface_name".to_string(), "xe-0/0/0".to_string())));
        assert!(labels.contains(&("some_label".to_string(), "somevalue".to_string())));
        assert!(labels.contains(&("another_label".to_string(), "foobar".to_string())));
    }

    #[test]
    fn test_free_text_description_contributes_no_labels() {
        let tree = Tree::new("r1");
        let base = "/interfaces/interface[name='xe-0/0/0']";
        tree.set_description(base, "Uplink to core, handle with care");
        tree.insert(
            &format!("{}/state/counters/in-octets/", base),
            Some(TelemetryValue::Uint64(5)),
        );

        let records = flat(&tree.get_metrics(&assembler()));
        assert_eq!(
            records[0].1,
            vec![
                ("device".to_string(), "r1".to_string()),
                ("interface_name".to_string(), "xe-0/0/0".to_string()),
            ]
        );
    }

    #[test]
    fn test_description_change_invalidates_descriptors() {
        let tree = Tree::new("r1");
        let base = "/interfaces/interface[name='xe-0/0/0']";
        let leaf = format!("{}/state/mtu/", base);
        tree.insert(&leaf, Some(TelemetryValue::Uint64(1500)));

        let asm = assembler();
        let before = tree.get_metrics(&asm);
        assert_eq!(
            before[0].descriptor.label_keys,
            vec!["device", "interface_name"]
        );

        tree.set_description(base, "role=uplink");
        let after = tree.get_metrics(&asm);
        assert_eq!(
            after[0].descriptor.label_keys,
            vec!["device", "interface_name", "role"]
        );
        assert_eq!(
            after[0].label_values,
            vec!["r1", "xe-0/0/0", "uplink"]
        );

        // Unchanged description keeps the cached descriptor.
        tree.set_description(base, "role=uplink");
        let again = tree.get_metrics(&asm);
        assert!(Arc::ptr_eq(&after[0].descriptor, &again[0].descriptor));
    }

    #[test]
    fn test_absent_value_emits_nothing() {
        let tree = Tree::new("r1");
        tree.insert("/interfaces/oper/", None);

        assert!(tree.get_metrics(&assembler()).is_empty());
    }

    #[test]
    fn test_unmapped_string_dropped() {
        let tree = Tree::new("r1");
        tree.insert(
            "/interfaces/interface/state/oper-state/",
            Some(TelemetryValue::String("UP".into())),
        );
        assert!(tree.get_metrics(&assembler()).is_empty());

        let mut mapping = StringValueMapping::new();
        mapping.insert(
            "/interfaces/interface/state/oper-state".to_string(),
            HashMap::from([("UP".to_string(), 100)]),
        );
        let mapped = MetricAssembler::new(Arc::new(mapping));
        let records = tree.get_metrics(&mapped);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, 100.0);
    }

    #[test]
    fn test_reset_discards_state() {
        let tree = Tree::new("r1");
        tree.insert("/interfaces/", Some(TelemetryValue::Uint64(1)));
        tree.reset();

        assert!(tree.get_metrics(&assembler()).is_empty());

        // Still usable after the swap.
        tree.insert("/interfaces/", Some(TelemetryValue::Uint64(2)));
        assert_eq!(tree.get_metrics(&assembler()).len(), 1);
    }

    #[test]
    fn test_dump_lists_every_node() {
        let tree = Tree::new("r1");
        tree.insert(
            "/interfaces/interface[name='xe-0/0/0']/state/mtu/",
            Some(TelemetryValue::Uint64(1500)),
        );
        tree.set_description("/interfaces/interface[name='xe-0/0/0']", "role=uplink");

        let lines = tree.dump();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "[device=r1]() = -");
        assert!(lines[2].contains("interface[name='xe-0/0/0'](role=uplink) = -"));
        assert!(lines[4].contains("mtu[]() = 1500"));
    }

    #[test]
    fn test_concurrent_inserts_and_reads() {
        let tree = Arc::new(Tree::new("r1"));
        let asm = Arc::new(assembler());

        std::thread::scope(|scope| {
            for w in 0..4 {
                let tree = tree.clone();
                scope.spawn(move || {
                    for i in 0..100 {
                        tree.insert(
                            &format!("/writer{}/leaf{}/", w, i),
                            Some(TelemetryValue::Uint64(i)),
                        );
                    }
                });
            }

            for _ in 0..4 {
                let tree = tree.clone();
                let asm = asm.clone();
                scope.spawn(move || {
                    for _ in 0..50 {
                        let records = tree.get_metrics(&asm);
                        // Every snapshot is internally consistent: records
                        // are unique per path within one read.
                        let mut seen: Vec<(&str, &[String])> = records
                            .iter()
                            .map(|r| (r.descriptor.name.as_str(), r.label_values.as_slice()))
                            .collect();
                        let before = seen.len();
                        seen.sort();
                        seen.dedup();
                        assert_eq!(before, seen.len());
                    }
                });
            }
        });

        assert_eq!(tree.get_metrics(&asm).len(), 400);
    }
}
