use serde::{Deserialize, Serialize};

/// Counters describing what a broker has done so far
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStats {
    /// Units tokenized for the first time
    pub units_tokenized: usize,

    /// Already-processed units served from the backend
    pub units_reused: usize,

    /// Already-processed units rebuilt from stored tokens
    pub units_rebuilt: usize,

    /// Entities registered with the backend
    pub entities_registered: usize,

    /// Cache prune passes run
    pub cache_prunes: usize,

    /// Cache entries dropped by pruning
    pub pruned_entries: usize,

    /// Lookups that reached the backend
    pub backend_lookups: usize,
}

impl ProcessStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_unit(&mut self, entities: usize) {
        self.units_tokenized += 1;
        self.entities_registered += entities;
    }

    pub fn add_prune(&mut self, pruned: usize) {
        self.cache_prunes += 1;
        self.pruned_entries += pruned;
    }
}
