/// Resource bounds for a single [`crate::assemble`] call (spec.md §4.E/§5).
#[derive(Debug, Clone, Copy)]
pub struct Budgets {
    pub max_inflight_bytes: u64,
    pub max_inflight_requests: usize,
}

impl Default for Budgets {
    fn default() -> Self {
        Self {
            max_inflight_bytes: 100 * 1024 * 1024,
            max_inflight_requests: 100,
        }
    }
}
