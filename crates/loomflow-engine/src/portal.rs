use std::collections::HashMap;

use loomflow_core::types::FlowContext;

/// What a portal relays between its input and output halves.
#[derive(Debug, Clone, Default)]
pub struct PortalEntry {
    pub context: Option<FlowContext>,
    pub data: Option<serde_json::Value>,
}

/// Named, edge-free side channel for relaying context/data between
/// non-adjacent nodes. Scoped to one flow run; at most one live entry per
/// portal id — a later input execution overwrites.
#[derive(Debug, Default)]
pub struct PortalRegistry {
    entries: HashMap<String, PortalEntry>,
}

impl PortalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an entry, replacing any previous one for the same id.
    pub fn set(&mut self, id: impl Into<String>, entry: PortalEntry) {
        self.entries.insert(id.into(), entry);
    }

    pub fn get(&self, id: &str) -> Option<&PortalEntry> {
        self.entries.get(id)
    }

    /// Drop all entries at run end.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_overwrites_previous_entry() {
        let mut registry = PortalRegistry::new();
        registry.set(
            "loop",
            PortalEntry {
                context: None,
                data: Some(serde_json::json!(1)),
            },
        );
        registry.set(
            "loop",
            PortalEntry {
                context: None,
                data: Some(serde_json::json!(2)),
            },
        );

        assert_eq!(
            registry.get("loop").unwrap().data,
            Some(serde_json::json!(2))
        );
    }

    #[test]
    fn missing_id_is_none() {
        let registry = PortalRegistry::new();
        assert!(registry.get("nope").is_none());
    }

    #[test]
    fn clear_drops_everything() {
        let mut registry = PortalRegistry::new();
        registry.set("a", PortalEntry::default());
        registry.clear();
        assert!(registry.get("a").is_none());
    }
}
