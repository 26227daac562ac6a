use crate::expression::Expression;
use memview_columnar::Value;
use std::cell::RefCell;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueCacheMode {
    /// Every row has the same value; one entry.
    Single,
    /// One entry per row in `[0, size[`. Rows outside are computed each time.
    Direct(usize),
    NoCache,
}

/// Memo of a column's values and their display strings.
#[derive(Debug)]
pub struct ValueCache {
    mode: ValueCacheMode,
    entries: RefCell<Vec<Option<(Value, String)>>>,
}

impl ValueCache {
    pub fn new(mode: ValueCacheMode) -> Self {
        let size = match mode {
            ValueCacheMode::Single => 1,
            ValueCacheMode::Direct(size) => size,
            ValueCacheMode::NoCache => 0,
        };
        Self {
            mode,
            entries: RefCell::new(vec![None; size]),
        }
    }

    /// Pick the mode matching an expression's multiplicity.
    pub fn for_expression(expression: &Expression) -> Self {
        if expression.has_multiple_rows() {
            Self::new(ValueCacheMode::Direct(expression.row_count()))
        } else {
            Self::new(ValueCacheMode::Single)
        }
    }

    pub fn mode(&self) -> ValueCacheMode {
        self.mode
    }

    fn slot(&self, row: usize) -> Option<usize> {
        match self.mode {
            ValueCacheMode::Single => Some(0),
            ValueCacheMode::Direct(size) => (row < size).then_some(row),
            ValueCacheMode::NoCache => None,
        }
    }

    /// Cached entry for `row`, computing and storing it when missing.
    pub fn get_or_compute(&self, row: usize, compute: impl FnOnce() -> (Value, String)) -> (Value, String) {
        match self.get_or_try_compute(row, || Ok::<_, std::convert::Infallible>(compute())) {
            Ok(entry) => entry,
            Err(never) => match never {},
        }
    }

    /// Like [`ValueCache::get_or_compute`]; failures are returned and not cached.
    pub fn get_or_try_compute<E>(
        &self,
        row: usize,
        compute: impl FnOnce() -> Result<(Value, String), E>,
    ) -> Result<(Value, String), E> {
        let Some(slot) = self.slot(row) else {
            return compute();
        };
        if let Some(entry) = self.entries.borrow().get(slot).and_then(Option::as_ref) {
            return Ok(entry.clone());
        }
        let entry = compute()?;
        if let Some(cell) = self.entries.borrow_mut().get_mut(slot) {
            *cell = Some(entry.clone());
        }
        Ok(entry)
    }

    pub fn set_all_dirty(&self) {
        self.entries.borrow_mut().iter_mut().for_each(|entry| *entry = None);
    }

    pub fn set_entry_dirty(&self, row: usize) {
        if let Some(slot) = self.slot(row) {
            if let Some(entry) = self.entries.borrow_mut().get_mut(slot) {
                *entry = None;
            }
        }
    }
}
