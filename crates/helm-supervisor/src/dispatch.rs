/// How a cognitive stack fans a turn's work orders out to HO1. Only
/// `Sequential` is implemented; `Parallel`/`Voting`/`Hierarchical` are named
/// here so the factory's config surface doesn't need to change shape when
/// they land.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchPattern {
    Sequential,
}

impl Default for DispatchPattern {
    fn default() -> Self {
        Self::Sequential
    }
}
