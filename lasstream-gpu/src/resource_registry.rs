use crate::resource::{Handle, ResourceType};
use crate::type_map::TypeMap;
use std::collections::HashMap;

/// Registry mapping handles to actual wgpu resources
/// Provides type-safe resource lookup and management
#[derive(Default)]
pub struct ResourceRegistry {
    resources: TypeMap,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a resource and return its handle
    pub fn insert<T: ResourceType>(&mut self, resource: T) -> Handle<T> {
        let handle = Handle::next();
        self.resources
            .get_or_default::<HashMap<u64, T>>()
            .insert(handle.id, resource);
        handle
    }

    /// Get a resource by handle
    pub fn get<T: ResourceType>(&self, handle: Handle<T>) -> Option<&T> {
        self.resources.get::<HashMap<u64, T>>()?.get(&handle.id)
    }

    /// Remove a resource, returning it to the caller (dropping it releases the GPU memory)
    pub fn remove<T: ResourceType>(&mut self, handle: Handle<T>) -> Option<T> {
        self.resources.get_mut::<HashMap<u64, T>>()?.remove(&handle.id)
    }

    /// Number of live resources of type T
    pub fn count<T: ResourceType>(&self) -> usize {
        self.resources
            .get::<HashMap<u64, T>>()
            .map_or(0, |m| m.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fake(&'static str);
    impl ResourceType for Fake {}
    impl ResourceType for u32 {}

    #[test]
    fn test_insert_get_remove() {
        let mut registry = ResourceRegistry::new();
        let a = registry.insert(Fake("a"));
        let b = registry.insert(Fake("b"));
        assert_ne!(a.id(), b.id());
        assert_eq!(registry.get(a).map(|f| f.0), Some("a"));
        assert_eq!(registry.count::<Fake>(), 2);

        assert_eq!(registry.remove(a).map(|f| f.0), Some("a"));
        assert!(registry.get(a).is_none());
        assert_eq!(registry.count::<Fake>(), 1);
    }

    #[test]
    fn test_types_are_separate() {
        let mut registry = ResourceRegistry::new();
        let n = registry.insert(7u32);
        registry.insert(Fake("x"));
        assert_eq!(registry.count::<u32>(), 1);
        assert_eq!(registry.get(n), Some(&7));
        // Same id, other type: not found.
        assert!(registry.get(Handle::<Fake>::new(n.id())).is_none());
    }
}
