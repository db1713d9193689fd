//! Temporary numbering for one compilation unit.

use tac_graph::TempId;

/// Source of `%tN` names.
///
/// One allocator lives per compilation unit and is threaded `&mut` through
/// every method lowering, so ids are strictly increasing and never reused
/// within a run, even across methods.
#[derive(Debug, Default)]
pub struct TempAllocator {
    next: u32,
}

impl TempAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&mut self) -> TempId {
        let id = TempId::new(self.next);
        self.next = self
            .next
            .checked_add(1)
            .unwrap_or_else(|| panic!("temporary counter exceeds u32::MAX"));
        id
    }

    /// Number of temporaries handed out so far.
    pub fn issued(&self) -> u32 {
        self.next
    }
}
