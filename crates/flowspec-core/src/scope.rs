//! Hierarchical compile scopes.
//!
//! [`ScopeTree`] is an arena of scope frames. Each frame owns five local
//! tables (nodes, signals, scales, data roles, memoized functions) plus the
//! designated output and the ordered list of its forks. Reads fall through to
//! the parent chain on a local miss; writes only ever touch the addressed
//! frame. A child therefore sees ancestor writes made after it was forked,
//! while nothing it writes is visible to its ancestors or siblings.

use std::hash::Hash;
use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::accessor::{Accessor, Comparator, Order};
use crate::error::CompileError;
use crate::expression::{BoundLibrary, FunctionLibrary, ItemPath, ScopeContext};
use crate::id::{OperatorId, ScopeId, SpecId};

/// Role tag to the node filling it, for one dataset.
pub type DataRoles = IndexMap<String, OperatorId>;

/// Composite memoization key for resolved functions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemoKey {
    Expression(String),
    Field { path: String, name: Option<String> },
    Compare { fields: Vec<String>, orders: Vec<Order> },
}

/// A memoized function instance.
#[derive(Debug, Clone)]
pub enum Function {
    Accessor(Rc<Accessor>),
    Comparator(Rc<Comparator>),
}

#[derive(Debug)]
struct ScopeFrame {
    parent: Option<ScopeId>,
    item_path: ItemPath,
    nodes: IndexMap<SpecId, OperatorId>,
    signals: IndexMap<String, OperatorId>,
    scales: IndexMap<String, OperatorId>,
    data: IndexMap<String, DataRoles>,
    functions: IndexMap<MemoKey, Function>,
    root: Option<OperatorId>,
    forks: Vec<ScopeId>,
    library: Option<BoundLibrary>,
}

impl ScopeFrame {
    fn new(parent: Option<ScopeId>, item_path: ItemPath, library: Option<BoundLibrary>) -> Self {
        ScopeFrame {
            parent,
            item_path,
            nodes: IndexMap::new(),
            signals: IndexMap::new(),
            scales: IndexMap::new(),
            data: IndexMap::new(),
            functions: IndexMap::new(),
            root: None,
            forks: Vec::new(),
            library,
        }
    }
}

/// Arena of scopes rooted at [`ScopeTree::root_id`].
#[derive(Debug)]
pub struct ScopeTree {
    frames: Vec<ScopeFrame>,
}

impl ScopeTree {
    /// Creates a tree holding only the root scope. When a function library is
    /// supplied, the root gets its own binding of it.
    pub fn new(library: Option<Rc<dyn FunctionLibrary>>) -> Self {
        let root = ScopeId(0);
        let library = library.map(|lib| {
            BoundLibrary::new(
                lib,
                ScopeContext {
                    scope: root,
                    item_path: ItemPath::new(),
                },
            )
        });
        ScopeTree {
            frames: vec![ScopeFrame::new(None, ItemPath::new(), library)],
        }
    }

    pub fn root_id(&self) -> ScopeId {
        ScopeId(0)
    }

    /// Number of scopes in the tree.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn contains(&self, id: ScopeId) -> bool {
        self.frame(id).is_some()
    }

    /// Creates a child of `parent` whose item path is the parent's with
    /// `index` appended. The child is appended to the parent's fork list.
    pub fn fork(&mut self, parent: ScopeId, index: usize) -> Result<ScopeId, CompileError> {
        let (item_path, library) = {
            let frame = self.frame_mut(parent)?;
            let mut path = frame.item_path.clone();
            path.push(index);
            (path, frame.library.clone())
        };

        let id = ScopeId(self.frames.len() as u32);
        let library = library.map(|lib| {
            lib.rebind(ScopeContext {
                scope: id,
                item_path: item_path.clone(),
            })
        });
        self.frames
            .push(ScopeFrame::new(Some(parent), item_path, library));
        self.frame_mut(parent)?.forks.push(id);
        tracing::trace!(parent = %parent, child = %id, index, "forked scope");
        Ok(id)
    }

    pub fn parent(&self, id: ScopeId) -> Option<ScopeId> {
        self.frame(id).and_then(|f| f.parent)
    }

    /// Forks of `id`, in creation order.
    pub fn forks(&self, id: ScopeId) -> &[ScopeId] {
        self.frame(id).map(|f| f.forks.as_slice()).unwrap_or(&[])
    }

    /// Fork indices from the root down to `id`. Empty for the root or an
    /// unknown id.
    pub fn item_path(&self, id: ScopeId) -> &[usize] {
        self.frame(id).map(|f| f.item_path.as_slice()).unwrap_or(&[])
    }

    /// Capability object describing `id`, for callables that need it.
    pub fn context(&self, id: ScopeId) -> Option<ScopeContext> {
        self.frame(id).map(|f| ScopeContext {
            scope: id,
            item_path: SmallVec::from_slice(&f.item_path),
        })
    }

    /// This scope's binding of the function library, if one was supplied.
    pub fn library(&self, id: ScopeId) -> Option<&BoundLibrary> {
        self.frame(id).and_then(|f| f.library.as_ref())
    }

    // -----------------------------------------------------------------------
    // Node table
    // -----------------------------------------------------------------------

    pub fn get(&self, id: ScopeId, spec: &SpecId) -> Option<OperatorId> {
        self.lookup(id, |f| f.nodes.get(spec).copied())
    }

    pub fn set(&mut self, id: ScopeId, spec: SpecId, op: OperatorId) -> Result<(), CompileError> {
        self.frame_mut(id)?.nodes.insert(spec, op);
        Ok(())
    }

    /// Nodes registered directly in `id`, in registration order.
    pub fn local_nodes(&self, id: ScopeId) -> impl Iterator<Item = (&SpecId, OperatorId)> {
        self.frame(id)
            .into_iter()
            .flat_map(|f| f.nodes.iter().map(|(k, v)| (k, *v)))
    }

    // -----------------------------------------------------------------------
    // Signals and scales
    // -----------------------------------------------------------------------

    pub fn signal(&self, id: ScopeId, name: &str) -> Option<OperatorId> {
        self.lookup(id, |f| f.signals.get(name).copied())
    }

    pub fn set_signal(&mut self, id: ScopeId, name: &str, op: OperatorId) -> Result<(), CompileError> {
        self.frame_mut(id)?.signals.insert(name.to_string(), op);
        Ok(())
    }

    /// Every signal visible from `id`; nearer scopes shadow farther ones.
    pub fn signals(&self, id: ScopeId) -> IndexMap<String, OperatorId> {
        self.merged(id, |f| &f.signals)
    }

    pub fn scale(&self, id: ScopeId, name: &str) -> Option<OperatorId> {
        self.lookup(id, |f| f.scales.get(name).copied())
    }

    pub fn set_scale(&mut self, id: ScopeId, name: &str, op: OperatorId) -> Result<(), CompileError> {
        self.frame_mut(id)?.scales.insert(name.to_string(), op);
        Ok(())
    }

    pub fn scales(&self, id: ScopeId) -> IndexMap<String, OperatorId> {
        self.merged(id, |f| &f.scales)
    }

    // -----------------------------------------------------------------------
    // Data roles
    // -----------------------------------------------------------------------

    /// The node filling `role` of `dataset`, searched per role up the chain.
    pub fn data_role(&self, id: ScopeId, dataset: &str, role: &str) -> Option<OperatorId> {
        self.lookup(id, |f| f.data.get(dataset).and_then(|r| r.get(role)).copied())
    }

    /// Sets one role of `dataset` in the local record, creating the record on
    /// first use. Roles already in the record are kept.
    pub fn set_data_role(
        &mut self,
        id: ScopeId,
        dataset: &str,
        role: &str,
        op: OperatorId,
    ) -> Result<(), CompileError> {
        self.frame_mut(id)?
            .data
            .entry(dataset.to_string())
            .or_default()
            .insert(role.to_string(), op);
        Ok(())
    }

    /// The role record for `dataset` as seen from `id`: ancestor roles first,
    /// nearer scopes overriding.
    pub fn dataset(&self, id: ScopeId, name: &str) -> Option<DataRoles> {
        let mut record: Option<DataRoles> = None;
        for frame in self.chain_from_root(id) {
            if let Some(roles) = frame.data.get(name) {
                let merged = record.get_or_insert_with(DataRoles::new);
                for (role, op) in roles {
                    merged.insert(role.clone(), *op);
                }
            }
        }
        record
    }

    /// Names of every dataset visible from `id`.
    pub fn datasets(&self, id: ScopeId) -> Vec<String> {
        let mut names: IndexMap<&str, ()> = IndexMap::new();
        for frame in self.chain_from_root(id) {
            for name in frame.data.keys() {
                names.insert(name.as_str(), ());
            }
        }
        names.into_keys().map(str::to_string).collect()
    }

    // -----------------------------------------------------------------------
    // Memoized functions
    // -----------------------------------------------------------------------

    pub fn function(&self, id: ScopeId, key: &MemoKey) -> Option<Function> {
        self.lookup(id, |f| f.functions.get(key).cloned())
    }

    pub fn set_function(&mut self, id: ScopeId, key: MemoKey, func: Function) -> Result<(), CompileError> {
        self.frame_mut(id)?.functions.insert(key, func);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Designated output
    // -----------------------------------------------------------------------

    /// The node marked `root` in this scope's own specification. Not
    /// inherited from ancestors.
    pub fn root(&self, id: ScopeId) -> Option<OperatorId> {
        self.frame(id).and_then(|f| f.root)
    }

    pub fn set_root(&mut self, id: ScopeId, op: OperatorId) -> Result<(), CompileError> {
        self.frame_mut(id)?.root = Some(op);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn frame(&self, id: ScopeId) -> Option<&ScopeFrame> {
        self.frames.get(id.0 as usize)
    }

    fn frame_mut(&mut self, id: ScopeId) -> Result<&mut ScopeFrame, CompileError> {
        self.frames
            .get_mut(id.0 as usize)
            .ok_or(CompileError::ScopeNotFound { id })
    }

    /// Frames from `id` up to the root.
    fn chain(&self, id: ScopeId) -> impl Iterator<Item = &ScopeFrame> {
        let mut next = self.frame(id);
        std::iter::from_fn(move || {
            let current = next?;
            next = current.parent.and_then(|p| self.frame(p));
            Some(current)
        })
    }

    fn chain_from_root(&self, id: ScopeId) -> Vec<&ScopeFrame> {
        let mut frames: Vec<_> = self.chain(id).collect();
        frames.reverse();
        frames
    }

    fn lookup<T>(&self, id: ScopeId, pick: impl Fn(&ScopeFrame) -> Option<T>) -> Option<T> {
        self.chain(id).find_map(pick)
    }

    fn merged<K, V>(&self, id: ScopeId, table: impl Fn(&ScopeFrame) -> &IndexMap<K, V>) -> IndexMap<K, V>
    where
        K: Clone + Eq + Hash,
        V: Clone,
    {
        let mut out = IndexMap::new();
        for frame in self.chain_from_root(id) {
            for (k, v) in table(frame) {
                out.insert(k.clone(), v.clone());
            }
        }
        out
    }
}
