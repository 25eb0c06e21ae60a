//! Expression compiler and function library seams.
//!
//! Expression text is compiled by an external [`ExpressionCompiler`]. Any
//! library functions it calls receive a [`ScopeContext`], an explicit
//! capability describing the scope the expression was resolved in, instead
//! of reaching for ambient state.

use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use smallvec::SmallVec;

use crate::accessor::AccessorFn;
use crate::error::ExpressionError;
use crate::id::ScopeId;

/// Fork indices from the root scope down to a scope.
pub type ItemPath = SmallVec<[usize; 4]>;

/// Current-scope state handed to library functions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeContext {
    pub scope: ScopeId,
    pub item_path: ItemPath,
}

impl ScopeContext {
    /// Nesting depth (0 for the root scope).
    pub fn depth(&self) -> usize {
        self.item_path.len()
    }

    /// Index this scope was forked with, if it is not the root.
    pub fn item_index(&self) -> Option<usize> {
        self.item_path.last().copied()
    }
}

/// A table of named functions callable from expressions.
pub trait FunctionLibrary {
    fn contains(&self, name: &str) -> bool;

    /// Invokes `name`. Returns `None` when the library has no such function.
    fn call(&self, name: &str, args: &[Value], context: &ScopeContext) -> Option<Value>;
}

/// A scope-bound view of a [`FunctionLibrary`].
///
/// Every scope owns its own binding; lookups delegate to the shared library
/// while calls carry that scope's [`ScopeContext`].
#[derive(Clone)]
pub struct BoundLibrary {
    library: Rc<dyn FunctionLibrary>,
    context: ScopeContext,
}

impl BoundLibrary {
    pub fn new(library: Rc<dyn FunctionLibrary>, context: ScopeContext) -> Self {
        BoundLibrary { library, context }
    }

    /// Re-binds the same library to another scope.
    pub fn rebind(&self, context: ScopeContext) -> Self {
        BoundLibrary {
            library: Rc::clone(&self.library),
            context,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.library.contains(name)
    }

    pub fn call(&self, name: &str, args: &[Value]) -> Option<Value> {
        self.library.call(name, args, &self.context)
    }

    pub fn context(&self) -> &ScopeContext {
        &self.context
    }
}

impl fmt::Debug for BoundLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundLibrary")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

/// Compiles expression text into an accessor body.
pub trait ExpressionCompiler {
    /// Compiles `text`. When `library` is given, function calls in the
    /// expression resolve against it.
    fn compile(
        &self,
        text: &str,
        library: Option<&BoundLibrary>,
    ) -> Result<Box<AccessorFn>, ExpressionError>;
}
