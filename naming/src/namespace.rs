//! The in-memory namespace: a tree of directories and files.
//!
//! Directory children and lock state are kept apart by construction: a
//! directory owns a name→node map and its own lock, a file owns only its
//! lock. The root directory is implicit and eternal; its children hang off
//! the [Namespace] itself and its lock lives with the lock manager, since
//! the root follows a different queueing discipline.

use std::collections::HashMap;

use dfs_wire::DfsPath;

use crate::error::NamingError;
use crate::lock::NodeLock;

pub enum Node {
    Directory(DirNode),
    File(FileNode),
}

#[derive(Default)]
pub struct DirNode {
    pub children: HashMap<String, Node>,
    pub lock: NodeLock,
}

#[derive(Default)]
pub struct FileNode {
    pub lock: NodeLock,
}

pub enum NodeRef<'a> {
    Root,
    Directory(&'a DirNode),
    File(&'a FileNode),
}

#[derive(Default)]
pub struct Namespace {
    children: HashMap<String, Node>,
}

impl Namespace {
    pub fn resolve(&self, path: &DfsPath) -> Option<NodeRef<'_>> {
        let mut current = &self.children;
        let mut components = path.components().peekable();
        while let Some(name) = components.next() {
            match current.get(name)? {
                Node::Directory(dir) => {
                    if components.peek().is_none() {
                        return Some(NodeRef::Directory(dir));
                    }
                    current = &dir.children;
                }
                Node::File(file) => {
                    if components.peek().is_none() {
                        return Some(NodeRef::File(file));
                    }
                    // a file cannot have children
                    return None;
                }
            }
        }
        Some(NodeRef::Root)
    }

    /// `Ok(true)`/`Ok(false)` for an existing node, `NotFound` otherwise.
    /// The root is a directory.
    pub fn is_directory(&self, path: &DfsPath) -> Result<bool, NamingError> {
        match self.resolve(path) {
            Some(NodeRef::Root) | Some(NodeRef::Directory(_)) => Ok(true),
            Some(NodeRef::File(_)) => Ok(false),
            None => Err(NamingError::NotFound(path.to_string())),
        }
    }

    pub fn is_file(&self, path: &DfsPath) -> Result<bool, NamingError> {
        self.is_directory(path).map(|is_dir| !is_dir)
    }

    /// Names of all children of the directory at `path`, in no particular
    /// order.
    pub fn list(&self, path: &DfsPath) -> Result<Vec<String>, NamingError> {
        let children = match self.resolve(path) {
            Some(NodeRef::Root) => &self.children,
            Some(NodeRef::Directory(dir)) => &dir.children,
            _ => return Err(NamingError::NotFound(path.to_string())),
        };
        Ok(children.keys().cloned().collect())
    }

    /// Inserts an empty directory. `Ok(false)` if `path` is the root or the
    /// name is already taken; `NotFound` if the parent directory is missing.
    pub fn create_directory(&mut self, path: &DfsPath) -> Result<bool, NamingError> {
        if path.is_root() {
            return Ok(false);
        }
        let parent = path.parent().expect("non-root path has a parent");
        let name = path.basename().expect("non-root path has a basename");
        let children = self
            .children_mut(&parent)
            .ok_or_else(|| NamingError::NotFound(parent.to_string()))?;
        if children.contains_key(name) {
            return Ok(false);
        }
        children.insert(name.to_owned(), Node::Directory(DirNode::default()));
        Ok(true)
    }

    /// Whether a file could be committed at `path`: `Ok(true)` when the slot
    /// is free, `Ok(false)` when taken (or `path` is the root), `NotFound`
    /// when the parent directory is missing.
    pub fn file_slot(&self, path: &DfsPath) -> Result<bool, NamingError> {
        if path.is_root() {
            return Ok(false);
        }
        let parent = path.parent().expect("non-root path has a parent");
        let name = path.basename().expect("non-root path has a basename");
        let children = match self.resolve(&parent) {
            Some(NodeRef::Root) => &self.children,
            Some(NodeRef::Directory(dir)) => &dir.children,
            _ => return Err(NamingError::NotFound(parent.to_string())),
        };
        Ok(!children.contains_key(name))
    }

    /// Inserts a file node at a previously checked slot. Returns `false` if
    /// the slot was taken in the meantime.
    pub fn commit_file(&mut self, path: &DfsPath) -> bool {
        let Some(name) = path.basename() else {
            return false;
        };
        let parent = path.parent().expect("non-root path has a parent");
        let Some(children) = self.children_mut(&parent) else {
            return false;
        };
        if children.contains_key(name) {
            return false;
        }
        children.insert(name.to_owned(), Node::File(FileNode::default()));
        true
    }

    /// Inserts a file, creating missing parent directories on the way.
    /// Returns `false` when the name is already taken or the path passes
    /// through an existing file. Used while absorbing a registration.
    pub fn ensure_file(&mut self, path: &DfsPath) -> bool {
        let Some(name) = path.basename() else {
            return false;
        };
        let components: Vec<&str> = path.components().collect();
        let mut current = &mut self.children;
        for dir_name in &components[..components.len() - 1] {
            let entry = current
                .entry((*dir_name).to_owned())
                .or_insert_with(|| Node::Directory(DirNode::default()));
            match entry {
                Node::Directory(dir) => current = &mut dir.children,
                Node::File(_) => return false,
            }
        }
        if current.contains_key(name) {
            return false;
        }
        current.insert(name.to_owned(), Node::File(FileNode::default()));
        true
    }

    /// Detaches the node at `path` (with its whole subtree, if a directory).
    pub fn remove(&mut self, path: &DfsPath) -> Option<Node> {
        let name = path.basename()?;
        let parent = path.parent()?;
        self.children_mut(&parent)?.remove(name)
    }

    /// Canonical paths of every file at or beneath `path`.
    pub fn files_under(&self, path: &DfsPath) -> Vec<DfsPath> {
        let mut files = Vec::new();
        match self.resolve(path) {
            Some(NodeRef::File(_)) => files.push(path.clone()),
            Some(NodeRef::Directory(dir)) => collect_files(&dir.children, path, &mut files),
            Some(NodeRef::Root) => collect_files(&self.children, path, &mut files),
            None => {}
        }
        files
    }

    /// Lock state of the node at `path`. The root's lock is not stored here.
    pub fn node_lock_mut(&mut self, path: &DfsPath) -> Option<&mut NodeLock> {
        let components: Vec<&str> = path.components().collect();
        let (last, dirs) = components.split_last()?;
        let mut current = &mut self.children;
        for name in dirs {
            match current.get_mut(*name)? {
                Node::Directory(dir) => current = &mut dir.children,
                Node::File(_) => return None,
            }
        }
        match current.get_mut(*last)? {
            Node::Directory(dir) => Some(&mut dir.lock),
            Node::File(file) => Some(&mut file.lock),
        }
    }

    fn children_mut(&mut self, path: &DfsPath) -> Option<&mut HashMap<String, Node>> {
        let mut current = &mut self.children;
        for name in path.components() {
            match current.get_mut(name)? {
                Node::Directory(dir) => current = &mut dir.children,
                Node::File(_) => return None,
            }
        }
        Some(current)
    }
}

fn collect_files(children: &HashMap<String, Node>, prefix: &DfsPath, out: &mut Vec<DfsPath>) {
    for (name, node) in children {
        let child = prefix.join(name);
        match node {
            Node::File(_) => out.push(child),
            Node::Directory(dir) => collect_files(&dir.children, &child, out),
        }
    }
}

#[cfg(test)]
mod test {
    use super::Namespace;
    use crate::error::NamingError;
    use dfs_wire::DfsPath;
    use rstest::rstest;

    fn path(s: &str) -> DfsPath {
        s.parse().expect("valid path")
    }

    fn populated() -> Namespace {
        let mut ns = Namespace::default();
        assert!(ns.ensure_file(&path("/a.txt")));
        assert!(ns.ensure_file(&path("/dir/b.txt")));
        ns
    }

    #[rstest]
    #[case("/", true)]
    #[case("/dir", true)]
    #[case("/a.txt", false)]
    #[case("/dir/b.txt", false)]
    fn a_node_is_a_directory_xor_a_file(#[case] p: &str, #[case] is_dir: bool) {
        let ns = populated();
        assert_eq!(Ok(is_dir), ns.is_directory(&path(p)));
        assert_eq!(Ok(!is_dir), ns.is_file(&path(p)));
    }

    #[test]
    fn missing_nodes_are_not_found() {
        let ns = populated();
        assert_eq!(
            Err(NamingError::NotFound("/nope".into())),
            ns.is_directory(&path("/nope"))
        );
        assert_eq!(
            Err(NamingError::NotFound("/a.txt/below".into())),
            ns.is_file(&path("/a.txt/below"))
        );
    }

    #[test]
    fn list_contains_exactly_the_children() {
        let ns = populated();
        let mut root = ns.list(&path("/")).unwrap();
        root.sort();
        assert_eq!(vec!["a.txt", "dir"], root);
        assert_eq!(vec!["b.txt"], ns.list(&path("/dir")).unwrap());
        assert!(ns.list(&path("/a.txt")).is_err());
        assert!(ns.list(&path("/nope")).is_err());
    }

    #[test]
    fn create_directory_semantics() {
        let mut ns = populated();
        assert_eq!(Ok(false), ns.create_directory(&path("/")));
        assert_eq!(Ok(true), ns.create_directory(&path("/x")));
        assert_eq!(Ok(false), ns.create_directory(&path("/x")));
        assert_eq!(Ok(false), ns.create_directory(&path("/a.txt")));
        assert_eq!(
            Err(NamingError::NotFound("/y".into())),
            ns.create_directory(&path("/y/z"))
        );
        assert!(ns.list(&path("/x")).unwrap().is_empty());
    }

    #[test]
    fn file_slot_and_commit() {
        let mut ns = populated();
        assert_eq!(Ok(false), ns.file_slot(&path("/")));
        assert_eq!(Ok(false), ns.file_slot(&path("/a.txt")));
        assert_eq!(Ok(false), ns.file_slot(&path("/dir")));
        assert_eq!(Ok(true), ns.file_slot(&path("/dir/c.txt")));
        assert_eq!(
            Err(NamingError::NotFound("/missing".into())),
            ns.file_slot(&path("/missing/c.txt"))
        );

        assert!(ns.commit_file(&path("/dir/c.txt")));
        assert!(!ns.commit_file(&path("/dir/c.txt")));
        assert_eq!(Ok(true), ns.is_file(&path("/dir/c.txt")));
    }

    #[test]
    fn ensure_file_builds_parents_and_rejects_collisions() {
        let mut ns = Namespace::default();
        assert!(ns.ensure_file(&path("/d1/d2/f.txt")));
        assert_eq!(Ok(true), ns.is_directory(&path("/d1/d2")));

        // the same name again, a directory of that name, a path through a file
        assert!(!ns.ensure_file(&path("/d1/d2/f.txt")));
        assert!(!ns.ensure_file(&path("/d1")));
        assert!(!ns.ensure_file(&path("/d1/d2/f.txt/inner")));
    }

    #[test]
    fn files_under_collects_the_subtree() {
        let mut ns = populated();
        assert!(ns.ensure_file(&path("/dir/sub/c.txt")));

        let mut under_dir: Vec<String> = ns
            .files_under(&path("/dir"))
            .iter()
            .map(|p| p.to_string())
            .collect();
        under_dir.sort();
        assert_eq!(vec!["/dir/b.txt", "/dir/sub/c.txt"], under_dir);

        let under_file: Vec<String> = ns
            .files_under(&path("/a.txt"))
            .iter()
            .map(|p| p.to_string())
            .collect();
        assert_eq!(vec!["/a.txt"], under_file);

        assert!(ns.files_under(&path("/nope")).is_empty());
    }

    #[test]
    fn remove_detaches_the_subtree() {
        let mut ns = populated();
        assert!(ns.remove(&path("/dir")).is_some());
        assert!(ns.is_directory(&path("/dir")).is_err());
        assert!(ns.is_file(&path("/dir/b.txt")).is_err());
        assert!(ns.remove(&path("/dir")).is_none());

        // property: list(parent) contains basename iff the node exists
        let root = ns.list(&path("/")).unwrap();
        assert!(root.contains(&"a.txt".to_string()));
        assert!(!root.contains(&"dir".to_string()));
    }

    #[test]
    fn node_locks_are_per_node() {
        let mut ns = populated();
        assert!(ns.node_lock_mut(&path("/a.txt")).is_some());
        assert!(ns.node_lock_mut(&path("/dir")).is_some());
        assert!(ns.node_lock_mut(&path("/nope")).is_none());
        assert!(ns.node_lock_mut(&path("/")).is_none());
    }
}
