//! Memory introspection for embedding hosts.

use crate::context::Context;

/// Point-in-time memory usage of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    /// Allocatable cells in the arena.
    pub total_cells: usize,
    /// Cells currently on the free list.
    pub free_cells: usize,
    /// Bytes of program text consumed so far.
    pub text_used: usize,
    /// Program-text buffer capacity in bytes.
    pub text_capacity: usize,
}

impl Context {
    /// Snapshot current memory usage. The free-cell count walks the free
    /// list, so this is a diagnostic call, not a hot-path one.
    pub fn memory_stats(&self) -> MemoryStats {
        MemoryStats {
            total_cells: self.arena.capacity(),
            free_cells: self.arena.free_count(),
            text_used: self.text.used(),
            text_capacity: self.text.capacity(),
        }
    }
}
