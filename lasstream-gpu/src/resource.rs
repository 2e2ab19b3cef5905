use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

/// Type-safe resource handle
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Handle<T> {
    pub id: u64,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> Handle<T> {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            _phantom: PhantomData,
        }
    }

    /// Allocate a fresh, never-registered handle id.
    pub fn next() -> Self {
        Self::new(next_handle_id())
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Resources the registry may own. Shared with decode workers, so `Sync`.
pub trait ResourceType: Send + Sync + 'static {}

impl ResourceType for wgpu::Buffer {}

/// Handle ID generator
static HANDLE_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_handle_id() -> u64 {
    HANDLE_ID.fetch_add(1, Ordering::Relaxed)
}
