//! Colormap lookup

use std::sync::Arc;

use ahash::AHashMap;
use cx_core::Texture;

/// Resolves colormap names to lookup textures
pub trait ColormapLookup: Send + Sync {
    fn lookup(&self, name: &str) -> Option<Arc<Texture>>;
}

/// An in-memory table of named colormaps
#[derive(Debug, Default, Clone)]
pub struct ColormapTable {
    maps: AHashMap<String, Arc<Texture>>,
}

impl ColormapTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, texture: Texture) -> Self {
        self.insert(name, texture);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, texture: Texture) {
        self.maps.insert(name.into(), Arc::new(texture));
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

impl ColormapLookup for ColormapTable {
    fn lookup(&self, name: &str) -> Option<Arc<Texture>> {
        self.maps.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_shares_texture() {
        let table = ColormapTable::new().with("gray", Texture::rgba(2, 1, vec![0; 8]));
        let a = table.lookup("gray").unwrap();
        let b = table.lookup("gray").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(table.lookup("viridis").is_none());
    }
}
