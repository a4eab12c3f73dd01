//! Bookkeeping of storage nodes and the files they hold.

use std::collections::{BTreeSet, HashMap, HashSet};

use dfs_wire::RegisterRequest;

/// Identity and endpoints of one storage node. The command port doubles as
/// the node's identity for commands.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct StorageNode {
    pub storage_ip: String,
    pub client_port: u16,
    pub command_port: u16,
}

impl From<&RegisterRequest> for StorageNode {
    fn from(value: &RegisterRequest) -> Self {
        StorageNode {
            storage_ip: value.storage_ip.clone(),
            client_port: value.client_port,
            command_port: value.command_port,
        }
    }
}

/// Two mappings kept mutually consistent: what each node holds, and which
/// node answers client operations for a file (its first-registered host).
#[derive(Default)]
pub struct Registry {
    /// Full registrations in arrival order; two registrations are the same
    /// iff all four fields are equal.
    registrations: Vec<RegisterRequest>,
    /// Node identities in registration order.
    nodes: Vec<StorageNode>,
    /// command_port → canonical paths the node holds.
    holdings: HashMap<u16, BTreeSet<String>>,
    /// canonical path → first-registered host, used to pick the source for
    /// reads and copies.
    primary: HashMap<String, StorageNode>,
    /// The global file set.
    files: HashSet<String>,
}

impl Registry {
    pub fn is_registered(&self, registration: &RegisterRequest) -> bool {
        self.registrations.contains(registration)
    }

    pub fn add_registration(&mut self, registration: RegisterRequest) {
        self.nodes.push(StorageNode::from(&registration));
        self.registrations.push(registration);
    }

    /// The first-registered node; creation target for new files.
    pub fn first_node(&self) -> Option<&StorageNode> {
        self.nodes.first()
    }

    /// The first-registered node whose command port differs; replication
    /// destination.
    pub fn other_node(&self, command_port: u16) -> Option<&StorageNode> {
        self.nodes.iter().find(|n| n.command_port != command_port)
    }

    pub fn node_by_port(&self, command_port: u16) -> Option<&StorageNode> {
        self.nodes.iter().find(|n| n.command_port == command_port)
    }

    pub fn contains_file(&self, path: &str) -> bool {
        self.files.contains(path)
    }

    /// Records a file contributed or created by `node`: the node holds it,
    /// it joins the global set, and the node becomes its primary host unless
    /// the file already has one.
    pub fn add_file(&mut self, path: &str, node: &StorageNode) {
        self.files.insert(path.to_owned());
        self.add_holding(path, node.command_port);
        if !self.primary.contains_key(path) {
            self.primary.insert(path.to_owned(), node.clone());
        }
    }

    pub fn add_holding(&mut self, path: &str, command_port: u16) {
        self.holdings
            .entry(command_port)
            .or_default()
            .insert(path.to_owned());
    }

    pub fn remove_holding(&mut self, path: &str, command_port: u16) {
        if let Some(paths) = self.holdings.get_mut(&command_port) {
            paths.remove(path);
        }
    }

    /// Drops a file from the global set, every node's holdings and the
    /// reverse index.
    pub fn remove_file(&mut self, path: &str) {
        self.files.remove(path);
        self.primary.remove(path);
        for paths in self.holdings.values_mut() {
            paths.remove(path);
        }
    }

    pub fn primary_of(&self, path: &str) -> Option<&StorageNode> {
        self.primary.get(path)
    }

    #[cfg(test)]
    pub fn holdings_of(&self, command_port: u16) -> Vec<String> {
        self.holdings
            .get(&command_port)
            .map(|paths| paths.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod test {
    use super::{Registry, StorageNode};
    use dfs_wire::RegisterRequest;

    fn node(command_port: u16) -> StorageNode {
        StorageNode {
            storage_ip: "127.0.0.1".into(),
            client_port: command_port - 1,
            command_port,
        }
    }

    fn registration(command_port: u16, files: &[&str]) -> RegisterRequest {
        RegisterRequest {
            storage_ip: "127.0.0.1".into(),
            client_port: command_port - 1,
            command_port,
            files: files.iter().map(|f| (*f).to_owned()).collect(),
        }
    }

    #[test]
    fn duplicate_detection_compares_all_fields() {
        let mut registry = Registry::default();
        registry.add_registration(registration(7001, &["/a.txt"]));

        assert!(registry.is_registered(&registration(7001, &["/a.txt"])));
        // a different file list is a different registration
        assert!(!registry.is_registered(&registration(7001, &["/b.txt"])));
        assert!(!registry.is_registered(&registration(7002, &["/a.txt"])));
    }

    #[test]
    fn primary_host_sticks_with_the_first() {
        let mut registry = Registry::default();
        registry.add_file("/a.txt", &node(7001));
        registry.add_file("/a.txt", &node(7002));

        assert_eq!(7001, registry.primary_of("/a.txt").unwrap().command_port);
    }

    #[test]
    fn node_selection_in_registration_order() {
        let mut registry = Registry::default();
        registry.add_registration(registration(7001, &[]));
        registry.add_registration(registration(7002, &[]));
        registry.add_registration(registration(7003, &[]));

        assert_eq!(7001, registry.first_node().unwrap().command_port);
        assert_eq!(7002, registry.other_node(7001).unwrap().command_port);
        assert_eq!(7001, registry.other_node(7002).unwrap().command_port);
        assert!(Registry::default().other_node(7001).is_none());
    }

    #[test]
    fn remove_file_clears_every_mapping() {
        let mut registry = Registry::default();
        registry.add_file("/a.txt", &node(7001));
        registry.add_holding("/a.txt", 7002);

        registry.remove_file("/a.txt");
        assert!(!registry.contains_file("/a.txt"));
        assert!(registry.primary_of("/a.txt").is_none());
        assert!(registry.holdings_of(7001).is_empty());
        assert!(registry.holdings_of(7002).is_empty());
    }
}
