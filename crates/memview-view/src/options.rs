/// How a [`crate::Select`] memoizes matching indices per driving row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SelectCachePolicy {
    /// Keep only the result for the last driving row queried. Alternating driving rows
    /// recomputes every time.
    #[default]
    SingleSlot,
    /// Keep one result per driving row ever queried. Trades memory for fewer recomputations
    /// when group tables are visited out of order.
    PerDrivingRow,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ViewOptions {
    pub select_cache: SelectCachePolicy,
}

impl ViewOptions {
    pub fn with_select_cache(mut self, policy: SelectCachePolicy) -> Self {
        self.select_cache = policy;
        self
    }
}
