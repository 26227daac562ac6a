//! Scope chain used to resolve `select.column` identifiers while a view is being built.
//!
//! Frames live in one arena per view schema and are never removed, so a [`ScopeId`] stays
//! valid for the lifetime of the schema. A table pushes a frame for its local select set on
//! top of the scope it was built in, then one for its data select set. A group table of a
//! select-type table is built on top of a frame that pins the parent's data select set to the
//! group's row.

use crate::select::{Select, SelectSet};
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

#[derive(Debug)]
pub struct ScopeFrame {
    parent: Option<ScopeId>,
    set: Rc<SelectSet>,
    fixed_row: Option<usize>,
}

impl ScopeFrame {
    pub fn parent(&self) -> Option<ScopeId> {
        self.parent
    }

    pub fn set(&self) -> &Rc<SelectSet> {
        &self.set
    }

    /// Row of the set's main select that identifiers in this frame are pinned to.
    /// `None` resolves against all rows.
    pub fn fixed_row(&self) -> Option<usize> {
        self.fixed_row
    }
}

/// Result of a successful select lookup through the chain.
#[derive(Clone, Debug)]
pub struct ScopeHit {
    pub scope: ScopeId,
    pub set: Rc<SelectSet>,
    pub select: Rc<Select>,
    pub fixed_row: Option<usize>,
}

#[derive(Debug, Default)]
pub struct ScopeArena {
    frames: Vec<ScopeFrame>,
}

impl ScopeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        parent: Option<ScopeId>,
        set: Rc<SelectSet>,
        fixed_row: Option<usize>,
    ) -> ScopeId {
        let id = ScopeId(self.frames.len());
        self.frames.push(ScopeFrame {
            parent,
            set,
            fixed_row,
        });
        id
    }

    /// Swap the select set of a frame that is still being built.
    pub(crate) fn replace_set(&mut self, id: ScopeId, set: Rc<SelectSet>) {
        if let Some(frame) = self.frames.get_mut(id.0) {
            frame.set = set;
        }
    }

    pub fn frame(&self, id: ScopeId) -> Option<&ScopeFrame> {
        self.frames.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames from `start` to the outermost ancestor, innermost first.
    pub fn chain(&self, start: Option<ScopeId>) -> impl Iterator<Item = (ScopeId, &ScopeFrame)> {
        let mut next = start;
        std::iter::from_fn(move || {
            let id = next?;
            let frame = self.frame(id)?;
            next = frame.parent;
            Some((id, frame))
        })
    }

    /// Find the innermost select named `name` visible from `start`.
    pub fn find_select(&self, start: Option<ScopeId>, name: &str) -> Option<ScopeHit> {
        self.chain(start).find_map(|(scope, frame)| {
            frame.set.select(name).map(|select| ScopeHit {
                scope,
                set: Rc::clone(&frame.set),
                select: Rc::clone(select),
                fixed_row: frame.fixed_row,
            })
        })
    }
}
