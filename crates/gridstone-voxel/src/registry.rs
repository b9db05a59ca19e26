//! Process-wide voxel type catalog and per-session wire type tables.
//!
//! The registry maps type names to behaviors. It is populated at startup
//! and grows lazily: looking up a name the process has never seen creates
//! an [`UnknownVoxelType`] placeholder, so chunks received from a peer with
//! extra types always decode. Types are not globally numbered — each
//! session negotiates a [`TypeTable`] fixing the `u16 ↔ name` mapping that
//! accompanies chunk transfers.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::types::{EMPTY_TYPE_NAME, EmptyVoxelType, UnknownVoxelType};
use crate::voxel::VoxelType;

/// Named catalog of voxel behaviors.
pub struct VoxelTypeRegistry {
    types: RwLock<FxHashMap<String, Arc<dyn VoxelType>>>,
}

impl VoxelTypeRegistry {
    pub fn new() -> Self {
        Self {
            types: RwLock::new(FxHashMap::default()),
        }
    }

    /// Registers a behavior under its own name. A name registered twice
    /// keeps the first behavior.
    pub fn add(&self, vtype: Arc<dyn VoxelType>) {
        let name = vtype.name().to_string();
        let mut types = self.types.write();
        if types.contains_key(&name) {
            tracing::warn!(%name, "voxel type already registered, keeping the first");
            return;
        }
        tracing::info!(%name, "registered voxel type");
        types.insert(name, vtype);
    }

    /// Resolves a name to its behavior, creating an `unknown` placeholder
    /// for names never registered. `"empty"` always resolves to the shared
    /// empty instance.
    pub fn get(&self, name: &str) -> Arc<dyn VoxelType> {
        if name == EMPTY_TYPE_NAME {
            return EmptyVoxelType::shared();
        }
        if let Some(found) = self.types.read().get(name) {
            return found.clone();
        }
        tracing::debug!(%name, "unknown voxel type, registering placeholder");
        self.add(Arc::new(UnknownVoxelType::new(name)));
        self.get(name)
    }

    /// Whether a name is registered (the `empty` sentinel always is).
    pub fn contains(&self, name: &str) -> bool {
        name == EMPTY_TYPE_NAME || self.types.read().contains_key(name)
    }

    /// All registered names, sorted. Does not include `empty`.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered types, excluding the `empty` sentinel.
    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.read().is_empty()
    }
}

impl Default for VoxelTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// TypeTable
// ---------------------------------------------------------------------------

/// Session-local `u16 ↔ type name` mapping accompanying chunk transfers.
///
/// The sender builds one from its registry snapshot; the receiver rebuilds
/// it from the transmitted name list, resolving each name through its own
/// registry (which may create `unknown` placeholders). Id 0 is always the
/// `empty` type.
pub struct TypeTable {
    types: Vec<Arc<dyn VoxelType>>,
    ids: FxHashMap<String, u16>,
}

impl TypeTable {
    fn from_type_list(types: Vec<Arc<dyn VoxelType>>) -> Self {
        debug_assert!(types.len() <= u16::MAX as usize);
        let ids = types
            .iter()
            .enumerate()
            .map(|(id, vtype)| (vtype.name().to_string(), id as u16))
            .collect();
        Self { types, ids }
    }

    /// Snapshot of a registry: `empty` first, then every registered name in
    /// sorted order.
    pub fn from_registry(registry: &VoxelTypeRegistry) -> Self {
        let mut types: Vec<Arc<dyn VoxelType>> = vec![EmptyVoxelType::shared()];
        for name in registry.names() {
            types.push(registry.get(&name));
        }
        Self::from_type_list(types)
    }

    /// Rebuilds a peer's table from its transmitted name list.
    pub fn from_names<I>(names: I, registry: &VoxelTypeRegistry) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let types = names
            .into_iter()
            .map(|name| registry.get(name.as_ref()))
            .collect();
        Self::from_type_list(types)
    }

    /// The wire id assigned to a type name in this session.
    pub fn id_of(&self, name: &str) -> Option<u16> {
        self.ids.get(name).copied()
    }

    /// The behavior a wire id resolves to.
    pub fn type_by_id(&self, id: u16) -> Option<&Arc<dyn VoxelType>> {
        self.types.get(id as usize)
    }

    /// Names in id order, as transmitted on the wire.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.iter().map(|vtype| vtype.name())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SimpleVoxelType;
    use crate::voxel::{ShaderKind, VoxelPayload};

    fn registry_with(names: &[&str]) -> VoxelTypeRegistry {
        let registry = VoxelTypeRegistry::new();
        for name in names {
            registry.add(Arc::new(SimpleVoxelType::new(
                *name,
                format!("assets/textures/{name}.png"),
            )));
        }
        registry
    }

    #[test]
    fn test_empty_resolves_without_registration() {
        let registry = VoxelTypeRegistry::new();
        let empty = registry.get("empty");
        assert_eq!(empty.name(), "empty");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unknown_name_creates_placeholder() {
        let registry = registry_with(&["grass"]);
        assert!(!registry.contains("modded_ore"));

        let unknown = registry.get("modded_ore");
        assert_eq!(unknown.name(), "modded_ore");
        assert_eq!(
            unknown.shader_kind(&VoxelPayload::empty()),
            ShaderKind::Fallback
        );
        // The placeholder is now registered; later lookups return it.
        assert!(registry.contains("modded_ore"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_duplicate_registration_keeps_first() {
        let registry = VoxelTypeRegistry::new();
        registry.add(Arc::new(
            SimpleVoxelType::new("lamp", "assets/textures/lamp.png").with_emission(10),
        ));
        registry.add(Arc::new(SimpleVoxelType::new(
            "lamp",
            "assets/textures/other.png",
        )));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("lamp").emission(&VoxelPayload::empty()), 10);
    }

    #[test]
    fn test_table_assigns_empty_id_zero() {
        let registry = registry_with(&["grass", "dirt"]);
        let table = TypeTable::from_registry(&registry);
        assert_eq!(table.id_of("empty"), Some(0));
        // Registered names follow in sorted order.
        assert_eq!(table.id_of("dirt"), Some(1));
        assert_eq!(table.id_of("grass"), Some(2));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_table_round_trips_through_names() {
        let sender = registry_with(&["dirt", "grass"]);
        let table = TypeTable::from_registry(&sender);
        let names: Vec<String> = table.names().map(str::to_string).collect();

        // The receiver only knows grass; dirt becomes a placeholder.
        let receiver = registry_with(&["grass"]);
        let received = TypeTable::from_names(&names, &receiver);

        assert_eq!(received.len(), table.len());
        for (id, name) in names.iter().enumerate() {
            let vtype = received.type_by_id(id as u16).expect("id in range");
            assert_eq!(vtype.name(), name.as_str());
        }
        // The placeholder got registered in the receiver's registry.
        assert!(receiver.contains("dirt"));
    }

    #[test]
    fn test_table_unknown_id_is_none() {
        let registry = registry_with(&[]);
        let table = TypeTable::from_registry(&registry);
        assert!(table.type_by_id(40).is_none());
    }
}
