use crate::definition::{SelectDef, SelectSetDef, WhereCombine};
use crate::expression::{
    parse_identifier, ColumnComparison, Comparison, ParseIdentifierOption,
};
use crate::options::SelectCachePolicy;
use crate::scope::{ScopeArena, ScopeId};
use memview_columnar::{Database, Table};
use std::cell::{Cell, OnceCell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Where-clauses of one select, combined with [`WhereCombine`].
#[derive(Clone, Debug, Default)]
pub struct WhereUnion {
    combine: WhereCombine,
    comparisons: Vec<ColumnComparison>,
}

impl WhereUnion {
    pub fn new(combine: WhereCombine) -> Self {
        Self {
            combine,
            comparisons: Vec::new(),
        }
    }

    pub fn push(&mut self, comparison: ColumnComparison) {
        self.comparisons.push(comparison);
    }

    pub fn len(&self) -> usize {
        self.comparisons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comparisons.is_empty()
    }

    pub fn comparisons(&self) -> &[ColumnComparison] {
        &self.comparisons
    }

    pub fn is_many_to_many(&self) -> bool {
        self.comparisons.iter().any(ColumnComparison::is_many_to_many)
    }

    fn matching_indices(&self, source_rows: usize, row: usize) -> Vec<usize> {
        let Some((first, rest)) = self.comparisons.split_first() else {
            return (0..source_rows).collect();
        };
        match self.combine {
            WhereCombine::All => {
                let mut indices = first.match_indices(row, 0..source_rows);
                for comparison in rest {
                    if indices.is_empty() {
                        break;
                    }
                    comparison.retain_matching(row, &mut indices);
                }
                indices
            }
            WhereCombine::Any => {
                let mut hit = vec![false; source_rows];
                for comparison in &self.comparisons {
                    for index in comparison.match_indices(row, 0..source_rows) {
                        hit[index] = true;
                    }
                }
                hit.iter()
                    .enumerate()
                    .filter_map(|(index, hit)| hit.then_some(index))
                    .collect()
            }
        }
    }

    fn first_match(&self, source_rows: usize, row: usize) -> Option<usize> {
        match self.combine {
            WhereCombine::All => {
                let (first, rest) = self.comparisons.split_first()?;
                let mut candidates = first.match_indices(row, 0..source_rows);
                for comparison in rest {
                    comparison.retain_matching(row, &mut candidates);
                }
                candidates.first().copied()
            }
            WhereCombine::Any => self
                .comparisons
                .iter()
                .filter_map(|comparison| comparison.first_match(row))
                .min(),
        }
    }
}

#[derive(Clone, Debug)]
struct CachedIndices {
    row: usize,
    generation: u64,
    indices: Rc<[usize]>,
}

#[derive(Debug)]
enum IndexCache {
    SingleSlot(Option<CachedIndices>),
    PerDrivingRow {
        entries: HashMap<usize, CachedIndices>,
        last_row: Option<usize>,
    },
}

impl IndexCache {
    fn new(policy: SelectCachePolicy) -> Self {
        match policy {
            SelectCachePolicy::SingleSlot => IndexCache::SingleSlot(None),
            SelectCachePolicy::PerDrivingRow => IndexCache::PerDrivingRow {
                entries: HashMap::new(),
                last_row: None,
            },
        }
    }

    fn get(&self, row: usize, generation: u64) -> Option<Rc<[usize]>> {
        let cached = match self {
            IndexCache::SingleSlot(slot) => slot.as_ref().filter(|c| c.row == row),
            IndexCache::PerDrivingRow { entries, .. } => entries.get(&row),
        }?;
        (cached.generation == generation).then(|| Rc::clone(&cached.indices))
    }

    fn put(&mut self, cached: CachedIndices) {
        match self {
            IndexCache::SingleSlot(slot) => *slot = Some(cached),
            IndexCache::PerDrivingRow { entries, last_row } => {
                *last_row = Some(cached.row);
                entries.insert(cached.row, cached);
            }
        }
    }

    /// Length of the most recently stored entry, unless the source changed since.
    fn last_len(&self, generation: u64) -> Option<usize> {
        let cached = match self {
            IndexCache::SingleSlot(slot) => slot.as_ref(),
            IndexCache::PerDrivingRow { entries, last_row } => {
                last_row.and_then(|row| entries.get(&row))
            }
        }?;
        (cached.generation == generation).then_some(cached.indices.len())
    }
}

/// Hit/miss counters of a select's matching-indices memo.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SelectCacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// A filtered view of the rows of one source table.
///
/// For each driving row the select yields the source rows matching its where-clauses, capped
/// at `max_row`. Without where-clauses every source row matches in order.
pub struct Select {
    name: String,
    source: Rc<dyn Table>,
    max_row: Option<usize>,
    where_: OnceCell<WhereUnion>,
    many_to_many: Cell<bool>,
    cache: RefCell<IndexCache>,
    stats: Cell<SelectCacheStats>,
}

impl Select {
    pub fn new(
        name: impl Into<String>,
        source: Rc<dyn Table>,
        max_row: Option<usize>,
        policy: SelectCachePolicy,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            max_row,
            where_: OnceCell::new(),
            many_to_many: Cell::new(false),
            cache: RefCell::new(IndexCache::new(policy)),
            stats: Cell::new(SelectCacheStats::default()),
        }
    }

    /// Install the where-clauses. A select's where-clauses are set once; later calls are
    /// ignored and return `false`.
    pub fn set_where(&self, where_: WhereUnion) -> bool {
        let many_to_many = where_.is_many_to_many();
        if self.where_.set(where_).is_err() {
            return false;
        }
        self.many_to_many.set(many_to_many);
        true
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &Rc<dyn Table> {
        &self.source
    }

    pub fn max_row(&self) -> Option<usize> {
        self.max_row
    }

    pub fn where_clauses(&self) -> Option<&WhereUnion> {
        self.where_.get()
    }

    pub fn has_where(&self) -> bool {
        self.where_.get().is_some_and(|w| !w.is_empty())
    }

    /// Whether a single driving row can match several source rows through a where value that
    /// itself spans several rows.
    pub fn is_many_to_many(&self) -> bool {
        self.many_to_many.get()
    }

    pub fn stats(&self) -> SelectCacheStats {
        self.stats.get()
    }

    /// Source rows matching driving row `row`.
    ///
    /// The result is memoized according to the select's [`SelectCachePolicy`]; a memo hit
    /// returns the same allocation. Writes to the source table invalidate the memo.
    pub fn matching_indices(&self, row: usize) -> Rc<[usize]> {
        let generation = self.source.generation();
        let cached = self.cache.borrow().get(row, generation);
        let mut stats = self.stats.get();
        if let Some(indices) = cached {
            stats.hits += 1;
            self.stats.set(stats);
            return indices;
        }
        stats.misses += 1;
        self.stats.set(stats);

        let source_rows = self.source.row_count();
        let mut indices = match self.where_.get() {
            Some(where_) => where_.matching_indices(source_rows, row),
            None => (0..source_rows).collect(),
        };
        if let Some(max_row) = self.max_row {
            indices.truncate(max_row);
        }
        let indices: Rc<[usize]> = indices.into();
        self.cache.borrow_mut().put(CachedIndices {
            row,
            generation,
            indices: Rc::clone(&indices),
        });
        indices
    }

    /// Row count if it is known without evaluating the where-clauses.
    pub fn row_count(&self) -> Option<usize> {
        if self.is_many_to_many() {
            return None;
        }
        if let Some(len) = self.cache.borrow().last_len(self.source.generation()) {
            return Some(len);
        }
        if self.has_where() {
            return None;
        }
        let rows = self.source.row_count();
        Some(self.max_row.map_or(rows, |max_row| rows.min(max_row)))
    }

    /// First source row matching driving row `row`; `row` itself without where-clauses.
    pub fn first_match(&self, row: usize) -> Option<usize> {
        match self.where_.get().filter(|w| !w.is_empty()) {
            None => Some(row),
            Some(where_) => where_.first_match(self.source.row_count(), row),
        }
    }

    /// [`Select::first_match`] for every driving row in `rows`.
    pub fn first_matches(&self, rows: std::ops::Range<usize>) -> Vec<Option<usize>> {
        rows.map(|row| self.first_match(row)).collect()
    }

    /// Number of driving rows that [`Select::first_match`] can be asked about: the smallest
    /// row count among the where values, 0 without where-clauses.
    pub fn first_match_row_count(&self) -> usize {
        self.where_
            .get()
            .and_then(|w| w.comparisons().iter().map(|c| c.value.row_count()).min())
            .unwrap_or(0)
    }
}

impl fmt::Debug for Select {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Select")
            .field("name", &self.name)
            .field("source", &self.source.name())
            .field("max_row", &self.max_row)
            .field("where", &self.where_.get())
            .field("many_to_many", &self.many_to_many.get())
            .finish()
    }
}

/// Named selects sharing one driving context. The first select is the main select.
#[derive(Default)]
pub struct SelectSet {
    selects: Vec<Rc<Select>>,
    by_name: HashMap<String, usize>,
    condition: OnceCell<Comparison>,
    main_rows: RefCell<Option<Rc<[usize]>>>,
    conditional: RefCell<Option<Option<Rc<[usize]>>>>,
}

impl SelectSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a select. Resets the memoized row arrays. A name already in the set is rejected.
    pub fn add(&mut self, select: Rc<Select>) -> bool {
        if self.by_name.contains_key(select.name()) {
            log::error!("duplicate select '{}' in select set", select.name());
            return false;
        }
        self.main_rows.replace(None);
        self.conditional.replace(None);
        self.by_name.insert(select.name().to_string(), self.selects.len());
        self.selects.push(select);
        true
    }

    /// Install the post-filter condition. Set once; later calls return `false`.
    pub fn set_condition(&self, condition: Comparison) -> bool {
        self.conditional.replace(None);
        self.condition.set(condition).is_ok()
    }

    pub fn condition(&self) -> Option<&Comparison> {
        self.condition.get()
    }

    pub fn has_condition(&self) -> bool {
        self.condition.get().is_some()
    }

    pub fn selects(&self) -> &[Rc<Select>] {
        &self.selects
    }

    pub fn main_select(&self) -> Option<&Rc<Select>> {
        self.selects.first()
    }

    pub fn select(&self, name: &str) -> Option<&Rc<Select>> {
        self.by_name.get(name).and_then(|&index| self.selects.get(index))
    }

    pub fn len(&self) -> usize {
        self.selects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selects.is_empty()
    }

    /// Matching rows of the main select for driving row 0, memoized until the next
    /// [`SelectSet::add`]. `None` for an empty set.
    pub fn main_rows(&self) -> Option<Rc<[usize]>> {
        if let Some(rows) = self.main_rows.borrow().as_ref() {
            return Some(Rc::clone(rows));
        }
        let rows = self.main_select()?.matching_indices(0);
        *self.main_rows.borrow_mut() = Some(Rc::clone(&rows));
        Some(rows)
    }

    /// Positions into [`SelectSet::main_rows`] whose condition holds. `None` means every main
    /// row passes, either because there is no condition or the set is empty.
    pub fn conditional_row_indices(&self) -> Option<Rc<[usize]>> {
        if let Some(memo) = self.conditional.borrow().as_ref() {
            return memo.clone();
        }
        let computed = match (self.condition.get(), self.main_rows()) {
            (Some(condition), Some(rows)) => {
                let passing: Vec<usize> = (0..rows.len()).filter(|&i| condition.value(i)).collect();
                Some(Rc::from(passing))
            }
            _ => None,
        };
        *self.conditional.borrow_mut() = Some(computed.clone());
        computed
    }

    /// Conditional row count if there is a condition, else main row count. `None` when empty.
    pub fn row_count(&self) -> Option<usize> {
        if let Some(indices) = self.conditional_row_indices() {
            return Some(indices.len());
        }
        self.main_rows().map(|rows| rows.len())
    }

    /// Main source row backing result row `row`, after the condition is applied.
    pub fn source_row(&self, row: usize) -> Option<usize> {
        let position = match self.conditional_row_indices() {
            Some(indices) => *indices.get(row)?,
            None => row,
        };
        self.main_rows()?.get(position).copied()
    }

    pub fn is_many_to_many(&self) -> bool {
        self.main_select().is_some_and(|select| select.is_many_to_many())
    }
}

impl fmt::Debug for SelectSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectSet")
            .field("selects", &self.selects)
            .field("condition", &self.condition.get())
            .finish()
    }
}

/// Build a select set in two passes and push its scope frame on top of `parent`.
///
/// Selects naming an unknown table are dropped with a diagnostic. Where values are resolved in
/// the new frame, so a select can refer to other selects of the same set as well as to every
/// enclosing scope. A select with a where-clause that does not resolve is dropped too, and the
/// remaining where-clauses are resolved again without it. Returns `None` when no select
/// survives.
pub(crate) fn build_select_set(
    def: &SelectSetDef,
    database: &Database,
    arena: &RefCell<ScopeArena>,
    policy: SelectCachePolicy,
    parent: Option<ScopeId>,
    context: &str,
) -> Option<(Rc<SelectSet>, ScopeId)> {
    let mut set = SelectSet::new();
    let mut built = Vec::with_capacity(def.selects.len());
    for select_def in &def.selects {
        let Some(source) = database.table(&select_def.table) else {
            log::error!(
                "{context}: select '{}': no table named '{}'",
                select_def.name,
                select_def.table
            );
            continue;
        };
        let select = Rc::new(Select::new(
            select_def.name.clone(),
            source,
            select_def.max_row,
            policy,
        ));
        if set.add(Rc::clone(&select)) {
            built.push((select_def, select));
        }
    }
    if set.is_empty() {
        return None;
    }

    let mut set = Rc::new(set);
    let scope = arena.borrow_mut().push(parent, Rc::clone(&set), None);

    loop {
        let resolves: Vec<bool> = {
            let arena = arena.borrow();
            built
                .iter()
                .map(|(select_def, select)| {
                    resolve_wheres(select_def, select, &arena, scope, context).is_some()
                })
                .collect()
        };
        if resolves.iter().all(|&ok| ok) {
            break;
        }
        built = built
            .into_iter()
            .zip(resolves)
            .filter_map(|(entry, ok)| ok.then_some(entry))
            .collect();
        if built.is_empty() {
            return None;
        }
        let mut survivors = SelectSet::new();
        for (_, select) in &built {
            survivors.add(Rc::clone(select));
        }
        set = Rc::new(survivors);
        arena.borrow_mut().replace_set(scope, Rc::clone(&set));
    }

    // Installed in order so a where value reading an earlier select sees its many-to-many flag.
    let arena = arena.borrow();
    for (select_def, select) in &built {
        if let Some(union) = resolve_wheres(select_def, select, &arena, scope, context)
            .filter(|union| !union.is_empty())
        {
            select.set_where(union);
        }
    }

    if let Some(condition) = &def.condition {
        let condition_context = format!("{context}: select set condition");
        let mut opt = ParseIdentifierOption::new(&arena, Some(scope), &condition_context);
        opt.use_first_match = true;
        opt.bypass_set = Some(Rc::clone(&set));
        let left = parse_identifier(&condition.left, &opt);
        let right = parse_identifier(&condition.right, &opt);
        if let (Some(left), Some(right)) = (left, right) {
            set.set_condition(Comparison::new(left, condition.op, right));
        }
    }

    Some((set, scope))
}

/// Where-clauses of `select` resolved in `scope`. `None` when one of them names an unknown
/// column or has a value that does not resolve.
fn resolve_wheres(
    select_def: &SelectDef,
    select: &Rc<Select>,
    arena: &ScopeArena,
    scope: ScopeId,
    context: &str,
) -> Option<WhereUnion> {
    let where_context = format!("{context}: select '{}'", select_def.name);
    let mut union = WhereUnion::new(select_def.combine);
    for where_def in &select_def.wheres {
        let Some(column) = select.source().column_index(&where_def.column) else {
            log::error!(
                "{where_context}: table '{}' has no column '{}'",
                select.source().name(),
                where_def.column
            );
            return None;
        };
        let mut opt = ParseIdentifierOption::new(arena, Some(scope), &where_context);
        opt.identifier_table = Some(Rc::clone(select.source()));
        opt.use_first_match = !where_def.op.is_one_to_many();
        opt.override_type = select.source().column_type(column);
        let value = parse_identifier(&where_def.value, &opt)?;
        union.push(ColumnComparison {
            table: Rc::clone(select.source()),
            column,
            op: where_def.op,
            value,
        });
    }
    Some(union)
}
