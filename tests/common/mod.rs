//! In-memory engine used by the integration tests.
//!
//! `MemEngine` implements the full `RaEngine` surface over a vector of tree
//! snapshots (one per revision), with strict token checking, call counters,
//! and injectable failures, so protocol behavior is observable end to end
//! without a server.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use svn_remote::{
    CancelFlag, CommitInfo, CommitOptions, Depth, EngineError, EngineHandle, EngineResult, Lock,
    NodeKind, NotifyAction, NotifyHandler, NotifyInfo, RaEngine, RemoteSession, Revision,
    StateChange,
};

const ERR_CANCELLED: i32 = 200015;
const ERR_NOT_FOUND: i32 = 160013;
const ERR_ALREADY_EXISTS: i32 = 160020;
const ERR_ILLEGAL_TARGET: i32 = 195004;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Dir {
        props: BTreeMap<String, Vec<u8>>,
    },
    File {
        content: Vec<u8>,
        props: BTreeMap<String, Vec<u8>>,
    },
}

impl Node {
    pub fn dir() -> Self {
        Node::Dir {
            props: BTreeMap::new(),
        }
    }

    pub fn file(content: &[u8]) -> Self {
        Node::File {
            content: content.to_vec(),
            props: BTreeMap::new(),
        }
    }

    fn kind(&self) -> NodeKind {
        match self {
            Node::Dir { .. } => NodeKind::Dir,
            Node::File { .. } => NodeKind::File,
        }
    }

    fn props_mut(&mut self) -> &mut BTreeMap<String, Vec<u8>> {
        match self {
            Node::Dir { props } | Node::File { props, .. } => props,
        }
    }
}

/// One revision snapshot: canonical relative path -> node. The root
/// directory is implicit.
pub type Tree = BTreeMap<String, Node>;

pub struct MemRepo {
    pub revisions: Vec<Tree>,
    pub locks: Vec<Lock>,
    pub capability_queries: Vec<String>,
    pub aborted_edits: usize,
    pub open_edit: bool,
    pub engine_closed: bool,
}

impl MemRepo {
    fn new() -> Self {
        Self {
            revisions: vec![Tree::new()],
            locks: Vec::new(),
            capability_queries: Vec::new(),
            aborted_edits: 0,
            open_edit: false,
            engine_closed: false,
        }
    }

    pub fn head(&self) -> Revision {
        (self.revisions.len() - 1) as Revision
    }

    fn tree_at(&self, rev: Option<Revision>) -> EngineResult<&Tree> {
        let rev = rev.unwrap_or_else(|| self.head());
        self.revisions
            .get(rev as usize)
            .ok_or_else(|| EngineError::single(ERR_NOT_FOUND, format!("no such revision {rev}")))
    }
}

pub type SharedRepo = Arc<Mutex<MemRepo>>;

struct TokenEntry {
    path: String,
    kind: NodeKind,
    open: bool,
}

struct EditTxn {
    tree: Tree,
    tokens: HashMap<String, TokenEntry>,
    text: HashMap<String, Vec<u8>>,
    actions: Vec<(String, NotifyAction, NodeKind)>,
}

pub struct MemEngine {
    repo: SharedRepo,
    url: String,
    root_url: String,
    uuid: String,
    caps: BTreeMap<&'static str, bool>,
    cancel: Option<CancelFlag>,
    edit: Option<EditTxn>,
    /// When set, `close_edit` fails with this message, leaving the
    /// transaction open for the editor's abort path.
    pub fail_close_edit: Option<&'static str>,
    /// When set, capability queries for this word fail.
    pub fail_capability: Option<&'static str>,
}

fn err(code: i32, message: impl Into<String>) -> EngineError {
    EngineError::single(code, message)
}

impl MemEngine {
    fn check_cancel(&self) -> EngineResult<()> {
        if self.cancel.as_ref().is_some_and(CancelFlag::is_raised) {
            return Err(err(ERR_CANCELLED, "operation cancelled"));
        }
        Ok(())
    }

    fn txn(&mut self) -> EngineResult<&mut EditTxn> {
        self.edit
            .as_mut()
            .ok_or_else(|| err(ERR_ILLEGAL_TARGET, "no edit in progress"))
    }

    fn open_dir_token(txn: &EditTxn, token: &str) -> EngineResult<String> {
        match txn.tokens.get(token) {
            Some(entry) if entry.open && entry.kind == NodeKind::Dir => Ok(entry.path.clone()),
            _ => Err(err(
                ERR_ILLEGAL_TARGET,
                format!("unknown or closed directory token {token}"),
            )),
        }
    }

    fn open_file_token(txn: &EditTxn, token: &str) -> EngineResult<String> {
        match txn.tokens.get(token) {
            Some(entry) if entry.open && entry.kind == NodeKind::File => Ok(entry.path.clone()),
            _ => Err(err(
                ERR_ILLEGAL_TARGET,
                format!("unknown or closed file token {token}"),
            )),
        }
    }

    fn discard_edit(&mut self) {
        if self.edit.take().is_some() {
            let mut repo = self.repo.lock().unwrap();
            repo.open_edit = false;
            repo.aborted_edits += 1;
        }
    }
}

impl RaEngine for MemEngine {
    fn close(&mut self) {
        self.repo.lock().unwrap().engine_closed = true;
    }

    fn session_url(&self) -> String {
        self.url.clone()
    }

    fn reparent(&mut self, url: &str) -> EngineResult<()> {
        if !url.starts_with(&self.root_url) {
            return Err(err(ERR_ILLEGAL_TARGET, "url is in a different repository"));
        }
        self.url = url.to_string();
        Ok(())
    }

    fn repos_root_url(&mut self) -> EngineResult<String> {
        Ok(self.root_url.clone())
    }

    fn repos_uuid(&mut self) -> EngineResult<String> {
        Ok(self.uuid.clone())
    }

    fn install_cancel_flag(&mut self, flag: CancelFlag) {
        self.cancel = Some(flag);
    }

    fn latest_revision(&mut self) -> EngineResult<Revision> {
        self.check_cancel()?;
        Ok(self.repo.lock().unwrap().head())
    }

    fn revision_by_timestamp(&mut self, timestamp_us: i64) -> EngineResult<Revision> {
        self.check_cancel()?;
        if timestamp_us < 0 {
            return Ok(0);
        }
        Ok(self.repo.lock().unwrap().head())
    }

    fn check_path(&mut self, path: &str, revision: Option<Revision>) -> EngineResult<NodeKind> {
        self.check_cancel()?;
        let repo = self.repo.lock().unwrap();
        let tree = repo.tree_at(revision)?;
        if path.is_empty() {
            return Ok(NodeKind::Dir);
        }
        Ok(tree.get(path).map(Node::kind).unwrap_or(NodeKind::None))
    }

    fn get_locks(&mut self, path: &str, depth: Depth) -> EngineResult<Vec<Lock>> {
        self.check_cancel()?;
        let repo = self.repo.lock().unwrap();
        let matches = |lock: &Lock| -> bool {
            if lock.path == path {
                return true;
            }
            let below = path.is_empty() || lock.path.starts_with(&format!("{path}/"));
            match depth {
                Depth::Empty => false,
                Depth::Infinity => below,
                Depth::Files | Depth::Immediates => {
                    below && {
                        let rest = if path.is_empty() {
                            lock.path.as_str()
                        } else {
                            &lock.path[path.len() + 1..]
                        };
                        !rest.contains('/')
                    }
                }
            }
        };
        Ok(repo.locks.iter().filter(|l| matches(l)).cloned().collect())
    }

    fn has_capability(&mut self, query_word: &str) -> EngineResult<bool> {
        self.repo
            .lock()
            .unwrap()
            .capability_queries
            .push(query_word.to_string());
        if self.fail_capability == Some(query_word) {
            return Err(err(ERR_ILLEGAL_TARGET, "capability query failed"));
        }
        Ok(self.caps.get(query_word).copied().unwrap_or(false))
    }

    fn begin_edit(&mut self, _options: &CommitOptions) -> EngineResult<()> {
        if self.edit.is_some() {
            return Err(err(ERR_ILLEGAL_TARGET, "an edit is already in progress"));
        }
        let tree = {
            let repo = self.repo.lock().unwrap();
            let head = repo.head();
            repo.revisions[head as usize].clone()
        };
        self.repo.lock().unwrap().open_edit = true;
        self.edit = Some(EditTxn {
            tree,
            tokens: HashMap::new(),
            text: HashMap::new(),
            actions: Vec::new(),
        });
        Ok(())
    }

    fn open_root(&mut self, _base_rev: Option<Revision>, token: &str) -> EngineResult<()> {
        let txn = self.txn()?;
        txn.tokens.insert(
            token.to_string(),
            TokenEntry {
                path: String::new(),
                kind: NodeKind::Dir,
                open: true,
            },
        );
        Ok(())
    }

    fn add_directory(
        &mut self,
        path: &str,
        parent_token: &str,
        token: &str,
        copy_from: Option<(&str, Revision)>,
    ) -> EngineResult<()> {
        let copied = match copy_from {
            Some((from_path, from_rev)) => {
                let repo = self.repo.lock().unwrap();
                let tree = repo.tree_at(Some(from_rev))?;
                let mut nodes: Vec<(String, Node)> = tree
                    .iter()
                    .filter(|(p, _)| {
                        p.as_str() == from_path || p.starts_with(&format!("{from_path}/"))
                    })
                    .map(|(p, n)| (p.clone(), n.clone()))
                    .collect();
                if nodes.is_empty() {
                    return Err(err(ERR_NOT_FOUND, format!("no copy source {from_path}")));
                }
                for (p, _) in &mut nodes {
                    *p = format!("{path}{}", &p[from_path.len()..]);
                }
                Some(nodes)
            }
            None => None,
        };

        let txn = self.txn()?;
        Self::open_dir_token(txn, parent_token)?;
        if txn.tree.contains_key(path) {
            return Err(err(ERR_ALREADY_EXISTS, format!("{path} already exists")));
        }
        match copied {
            Some(nodes) => txn.tree.extend(nodes),
            None => {
                txn.tree.insert(path.to_string(), Node::dir());
            }
        }
        txn.tokens.insert(
            token.to_string(),
            TokenEntry {
                path: path.to_string(),
                kind: NodeKind::Dir,
                open: true,
            },
        );
        txn.actions
            .push((path.to_string(), NotifyAction::Added, NodeKind::Dir));
        Ok(())
    }

    fn open_directory(
        &mut self,
        path: &str,
        parent_token: &str,
        token: &str,
        _base_rev: Revision,
    ) -> EngineResult<()> {
        let txn = self.txn()?;
        Self::open_dir_token(txn, parent_token)?;
        match txn.tree.get(path) {
            Some(Node::Dir { .. }) => {}
            _ => return Err(err(ERR_NOT_FOUND, format!("no directory at {path}"))),
        }
        txn.tokens.insert(
            token.to_string(),
            TokenEntry {
                path: path.to_string(),
                kind: NodeKind::Dir,
                open: true,
            },
        );
        txn.actions
            .push((path.to_string(), NotifyAction::Modified, NodeKind::Dir));
        Ok(())
    }

    fn add_file(
        &mut self,
        path: &str,
        parent_token: &str,
        token: &str,
        copy_from: Option<(&str, Revision)>,
    ) -> EngineResult<()> {
        let copied = match copy_from {
            Some((from_path, from_rev)) => {
                let repo = self.repo.lock().unwrap();
                let tree = repo.tree_at(Some(from_rev))?;
                match tree.get(from_path) {
                    Some(node @ Node::File { .. }) => Some(node.clone()),
                    _ => return Err(err(ERR_NOT_FOUND, format!("no copy source {from_path}"))),
                }
            }
            None => None,
        };

        let txn = self.txn()?;
        Self::open_dir_token(txn, parent_token)?;
        if txn.tree.contains_key(path) {
            return Err(err(ERR_ALREADY_EXISTS, format!("{path} already exists")));
        }
        txn.tree
            .insert(path.to_string(), copied.unwrap_or_else(|| Node::file(b"")));
        txn.tokens.insert(
            token.to_string(),
            TokenEntry {
                path: path.to_string(),
                kind: NodeKind::File,
                open: true,
            },
        );
        txn.actions
            .push((path.to_string(), NotifyAction::Added, NodeKind::File));
        Ok(())
    }

    fn open_file(
        &mut self,
        path: &str,
        parent_token: &str,
        token: &str,
        _base_rev: Revision,
    ) -> EngineResult<()> {
        let txn = self.txn()?;
        Self::open_dir_token(txn, parent_token)?;
        match txn.tree.get(path) {
            Some(Node::File { .. }) => {}
            _ => return Err(err(ERR_NOT_FOUND, format!("no file at {path}"))),
        }
        txn.tokens.insert(
            token.to_string(),
            TokenEntry {
                path: path.to_string(),
                kind: NodeKind::File,
                open: true,
            },
        );
        txn.actions
            .push((path.to_string(), NotifyAction::Modified, NodeKind::File));
        Ok(())
    }

    fn delete_entry(
        &mut self,
        path: &str,
        _base_rev: Option<Revision>,
        parent_token: &str,
    ) -> EngineResult<()> {
        let txn = self.txn()?;
        Self::open_dir_token(txn, parent_token)?;
        if !txn.tree.contains_key(path) {
            return Err(err(ERR_NOT_FOUND, format!("nothing to delete at {path}")));
        }
        let prefix = format!("{path}/");
        txn.tree
            .retain(|p, _| p != path && !p.starts_with(&prefix));
        txn.actions
            .push((path.to_string(), NotifyAction::Deleted, NodeKind::Unknown));
        Ok(())
    }

    fn change_dir_prop(
        &mut self,
        token: &str,
        name: &str,
        value: Option<&[u8]>,
    ) -> EngineResult<()> {
        let txn = self.txn()?;
        let path = Self::open_dir_token(txn, token)?;
        if path.is_empty() {
            // Root properties are not modeled; accept and drop.
            return Ok(());
        }
        let node = txn
            .tree
            .get_mut(&path)
            .ok_or_else(|| err(ERR_NOT_FOUND, format!("no node at {path}")))?;
        match value {
            Some(value) => {
                node.props_mut().insert(name.to_string(), value.to_vec());
            }
            None => {
                node.props_mut().remove(name);
            }
        }
        Ok(())
    }

    fn change_file_prop(
        &mut self,
        token: &str,
        name: &str,
        value: Option<&[u8]>,
    ) -> EngineResult<()> {
        let txn = self.txn()?;
        let path = Self::open_file_token(txn, token)?;
        let node = txn
            .tree
            .get_mut(&path)
            .ok_or_else(|| err(ERR_NOT_FOUND, format!("no node at {path}")))?;
        match value {
            Some(value) => {
                node.props_mut().insert(name.to_string(), value.to_vec());
            }
            None => {
                node.props_mut().remove(name);
            }
        }
        Ok(())
    }

    fn apply_text_delta(&mut self, token: &str, _base_checksum: Option<&str>) -> EngineResult<()> {
        let txn = self.txn()?;
        Self::open_file_token(txn, token)?;
        txn.text.insert(token.to_string(), Vec::new());
        Ok(())
    }

    fn write_text_chunk(&mut self, token: &str, chunk: &[u8]) -> EngineResult<()> {
        let txn = self.txn()?;
        Self::open_file_token(txn, token)?;
        let buf = txn
            .text
            .get_mut(token)
            .ok_or_else(|| err(ERR_ILLEGAL_TARGET, "no text stream open"))?;
        buf.extend_from_slice(chunk);
        Ok(())
    }

    fn text_delta_end(&mut self, token: &str) -> EngineResult<()> {
        let txn = self.txn()?;
        let path = Self::open_file_token(txn, token)?;
        let content = txn
            .text
            .remove(token)
            .ok_or_else(|| err(ERR_ILLEGAL_TARGET, "no text stream open"))?;
        match txn.tree.get_mut(&path) {
            Some(Node::File {
                content: existing, ..
            }) => *existing = content,
            _ => return Err(err(ERR_NOT_FOUND, format!("no file at {path}"))),
        }
        Ok(())
    }

    fn close_file(&mut self, token: &str, _text_checksum: Option<&str>) -> EngineResult<()> {
        let txn = self.txn()?;
        Self::open_file_token(txn, token)?;
        if let Some(entry) = txn.tokens.get_mut(token) {
            entry.open = false;
        }
        Ok(())
    }

    fn close_directory(&mut self, token: &str) -> EngineResult<()> {
        let txn = self.txn()?;
        Self::open_dir_token(txn, token)?;
        if let Some(entry) = txn.tokens.get_mut(token) {
            entry.open = false;
        }
        Ok(())
    }

    fn close_edit(&mut self, notify: Option<&mut dyn NotifyHandler>) -> EngineResult<CommitInfo> {
        if let Some(message) = self.fail_close_edit {
            return Err(err(ERR_ILLEGAL_TARGET, message));
        }
        if self.edit.is_none() {
            return Err(err(ERR_ILLEGAL_TARGET, "no edit in progress"));
        }
        let new_rev = self.repo.lock().unwrap().head() + 1;
        let txn = self.edit.take().unwrap();

        if let Some(handler) = notify {
            for (path, action, kind) in &txn.actions {
                let info = NotifyInfo {
                    path: path.clone(),
                    action: *action,
                    kind: *kind,
                    mime_type: None,
                    content_state: StateChange::Changed,
                    prop_state: StateChange::Unknown,
                    revision: Some(new_rev),
                };
                if handler.on_notify(&info).is_err() {
                    let mut repo = self.repo.lock().unwrap();
                    repo.open_edit = false;
                    repo.aborted_edits += 1;
                    return Err(err(
                        ERR_ILLEGAL_TARGET,
                        "commit notification handler failed",
                    ));
                }
            }
        }

        let mut repo = self.repo.lock().unwrap();
        repo.revisions.push(txn.tree);
        repo.open_edit = false;
        Ok(CommitInfo {
            new_rev,
            date: Some("2026-08-06T00:00:00.000000Z".to_string()),
            author: Some("mem".to_string()),
            post_commit_err: None,
        })
    }

    fn abort_edit(&mut self) -> EngineResult<()> {
        if self.edit.is_none() {
            return Err(err(ERR_ILLEGAL_TARGET, "no edit in progress"));
        }
        self.discard_edit();
        Ok(())
    }
}

/// Test fixture owning the shared repository model.
pub struct MemFixture {
    pub repo: SharedRepo,
    pub url: String,
    pub root_url: String,
}

impl MemFixture {
    pub fn new() -> Self {
        Self {
            repo: Arc::new(Mutex::new(MemRepo::new())),
            url: "svn://localhost/repo".to_string(),
            root_url: "svn://localhost/repo".to_string(),
        }
    }

    /// Pushes a new revision containing `nodes` on top of the current head.
    pub fn seed(&self, nodes: &[(&str, Node)]) -> Revision {
        let mut repo = self.repo.lock().unwrap();
        let head = repo.head();
        let mut tree = repo.revisions[head as usize].clone();
        for (path, node) in nodes {
            tree.insert((*path).to_string(), node.clone());
        }
        repo.revisions.push(tree);
        repo.head()
    }

    pub fn add_lock(&self, lock: Lock) {
        self.repo.lock().unwrap().locks.push(lock);
    }

    pub fn engine(&self) -> MemEngine {
        MemEngine {
            repo: Arc::clone(&self.repo),
            url: self.url.clone(),
            root_url: self.root_url.clone(),
            uuid: "3f8e2c54-0000-4000-8000-2b1f60ad8161".to_string(),
            caps: BTreeMap::from([
                ("depth", true),
                ("mergeinfo", true),
                ("log-revprops", true),
                ("commit-revprops", false),
            ]),
            cancel: None,
            edit: None,
            fail_close_edit: None,
            fail_capability: None,
        }
    }

    pub fn session(&self) -> RemoteSession {
        RemoteSession::new(EngineHandle::new(Box::new(self.engine()))).unwrap()
    }

    pub fn session_with(&self, configure: impl FnOnce(&mut MemEngine)) -> RemoteSession {
        let mut engine = self.engine();
        configure(&mut engine);
        RemoteSession::new(EngineHandle::new(Box::new(engine))).unwrap()
    }

    pub fn head(&self) -> Revision {
        self.repo.lock().unwrap().head()
    }

    pub fn node_at(&self, rev: Revision, path: &str) -> Option<Node> {
        let repo = self.repo.lock().unwrap();
        repo.revisions.get(rev as usize)?.get(path).cloned()
    }

    pub fn tree_size(&self, rev: Revision) -> usize {
        let repo = self.repo.lock().unwrap();
        repo.revisions[rev as usize].len()
    }

    pub fn capability_query_count(&self, word: &str) -> usize {
        let repo = self.repo.lock().unwrap();
        repo.capability_queries
            .iter()
            .filter(|q| q.as_str() == word)
            .count()
    }

    pub fn aborted_edits(&self) -> usize {
        self.repo.lock().unwrap().aborted_edits
    }

    pub fn open_edit(&self) -> bool {
        self.repo.lock().unwrap().open_edit
    }

    pub fn engine_closed(&self) -> bool {
        self.repo.lock().unwrap().engine_closed
    }
}

impl Default for MemFixture {
    fn default() -> Self {
        Self::new()
    }
}
