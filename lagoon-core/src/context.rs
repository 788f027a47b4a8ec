use std::{cell::Cell, rc::Rc};

use tracing::debug;

/// Hands out database contexts to connection workers on one runtime thread.
///
/// A worker binds a context at start and carries it for its whole lifetime;
/// the context is passed explicitly into every dispatch call instead of
/// being looked up through a thread-local. Release happens on drop, so it
/// runs exactly once per worker whatever the exit path.
#[derive(Debug, Default)]
pub struct DatabaseContextPool {
    next_id: Cell<u64>,
    bound: Rc<Cell<usize>>,
}

impl DatabaseContextPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self) -> DatabaseContext {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.bound.set(self.bound.get() + 1);
        debug!("database context {id} bound");
        DatabaseContext {
            id,
            bound: self.bound.clone(),
        }
    }

    /// Number of contexts currently bound to workers.
    pub fn bound(&self) -> usize {
        self.bound.get()
    }
}

#[derive(Debug)]
pub struct DatabaseContext {
    id: u64,
    bound: Rc<Cell<usize>>,
}

impl DatabaseContext {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for DatabaseContext {
    fn drop(&mut self) {
        self.bound.set(self.bound.get() - 1);
        debug!("database context {} unbound", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_and_drop_are_paired() {
        let pool = DatabaseContextPool::new();
        let a = pool.bind();
        let b = pool.bind();
        assert_ne!(a.id(), b.id());
        assert_eq!(pool.bound(), 2);
        drop(a);
        drop(b);
        assert_eq!(pool.bound(), 0);
    }
}
