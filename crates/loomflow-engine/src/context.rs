use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use loomflow_core::config::PresentationConfig;
use loomflow_core::traits::ContextSink;
use loomflow_core::types::{
    ChatMessage, ContextId, ContextSnapshot, ContextType, FlowContext,
};

/// Options for spawning an isolated context. Nothing is inherited from the
/// active context — isolation means no implicit history bleed.
#[derive(Debug, Clone, Default)]
pub struct IsolatedOptions {
    pub provider: String,
    pub model: String,
    pub system_instructions: String,
    pub temperature: Option<f32>,
    pub reasoning_effort: Option<String>,
    pub history: Vec<ChatMessage>,
}

/// Tracks which tracked slot (main / isolated) each context record belongs
/// to.
///
/// Contexts live in an arena keyed by their stable id; "identity" is id
/// comparison, never reference equality, so records cloned across IPC or
/// rehydrated from persistence still resolve to the same logical
/// conversation. Exactly one id is the main binding; any number of isolated
/// bindings may coexist.
pub struct ContextManager {
    arena: HashMap<ContextId, FlowContext>,
    main_id: ContextId,
    isolated: HashSet<ContextId>,
    sink: Option<Arc<dyn ContextSink>>,
    presentation: Option<PresentationConfig>,
}

impl ContextManager {
    pub fn new(
        initial: FlowContext,
        sink: Option<Arc<dyn ContextSink>>,
        presentation: Option<PresentationConfig>,
    ) -> Self {
        let main_id = initial.context_id.clone();
        let mut arena = HashMap::new();
        arena.insert(main_id.clone(), initial);
        Self {
            arena,
            main_id,
            isolated: HashSet::new(),
            sink,
            presentation,
        }
    }

    /// The live main context, never a stale copy.
    pub fn main_context(&self) -> FlowContext {
        self.arena[&self.main_id].clone()
    }

    /// Current value bound to `id`; falls back to the main context for an
    /// unbound id (released mid-round).
    pub fn value(&self, id: &ContextId) -> FlowContext {
        self.arena
            .get(id)
            .cloned()
            .unwrap_or_else(|| self.main_context())
    }

    /// Determine which binding a pushed context belongs to.
    ///
    /// No push resolves to the main binding. A pushed id that is already
    /// bound resolves to that binding — the binding's current value is
    /// authoritative over the pushed copy. An unknown id (a record that
    /// crossed a process boundary, or was rehydrated) gets a binding of its
    /// own type.
    pub fn resolve_active(&mut self, pushed: Option<&FlowContext>) -> ContextId {
        let Some(pushed) = pushed else {
            return self.main_id.clone();
        };

        if let Some(existing) = self.arena.get(&pushed.context_id) {
            if existing.context_type != pushed.context_type {
                warn!(
                    context_id = %pushed.context_id,
                    bound = %existing.context_type,
                    pushed = %pushed.context_type,
                    "Pushed context disagrees with its binding's type; keeping the binding"
                );
            }
            return pushed.context_id.clone();
        }

        debug!(
            context_id = %pushed.context_id,
            context_type = %pushed.context_type,
            "Binding previously unseen context"
        );
        if pushed.context_type == ContextType::Isolated {
            self.isolated.insert(pushed.context_id.clone());
        }
        self.arena
            .insert(pushed.context_id.clone(), pushed.clone());
        pushed.context_id.clone()
    }

    /// Reconcile a node's context output with the binding table.
    ///
    /// Nodes opt in to replacing context; a node that set no context passes
    /// the active binding through. A returned context updates (or creates)
    /// its binding, and a main-typed return promotes that binding to be the
    /// new main.
    pub async fn ensure_output(
        &mut self,
        output: Option<FlowContext>,
        active: &ContextId,
    ) -> ContextId {
        let Some(returned) = output else {
            return active.clone();
        };

        let id = returned.context_id.clone();
        let created = !self.arena.contains_key(&id);
        if returned.context_type == ContextType::Isolated {
            self.isolated.insert(id.clone());
        }
        self.arena.insert(id.clone(), returned.clone());

        if returned.context_type == ContextType::Main && self.main_id != id {
            debug!(context_id = %id, "Promoting returned context to main binding");
            self.main_id = id.clone();
        }
        if created {
            self.publish().await;
        }
        id
    }

    /// Spawn a brand-new isolated context from caller-supplied options.
    pub async fn create_isolated(&mut self, options: IsolatedOptions) -> FlowContext {
        let context = FlowContext {
            context_id: ContextId::new(),
            context_type: ContextType::Isolated,
            provider: options.provider,
            model: options.model,
            system_instructions: options.system_instructions,
            temperature: options.temperature,
            reasoning_effort: options.reasoning_effort,
            message_history: options.history,
        };
        debug!(context_id = %context.context_id, "Created isolated context");
        self.isolated.insert(context.context_id.clone());
        self.arena
            .insert(context.context_id.clone(), context.clone());
        self.publish().await;
        context
    }

    /// Remove the binding for a finished isolated branch. No-op for unknown
    /// ids and for the main binding.
    pub async fn release(&mut self, id: &ContextId) -> bool {
        if !self.isolated.remove(id) {
            return false;
        }
        self.arena.remove(id);
        debug!(context_id = %id, "Released isolated context");
        self.publish().await;
        true
    }

    /// Snapshot of all live contexts.
    pub fn capture(&self) -> ContextSnapshot {
        let isolated_contexts = self
            .isolated
            .iter()
            .filter_map(|id| self.arena.get(id).map(|c| (id.clone(), c.clone())))
            .collect();
        ContextSnapshot {
            main_context: self.main_context(),
            isolated_contexts,
        }
    }

    /// Push the current snapshot to the presentation sink. Resilient: a
    /// failed push is logged, never fatal.
    pub async fn publish(&self) {
        let (Some(sink), Some(identity)) = (&self.sink, &self.presentation) else {
            return;
        };
        if let Err(e) = sink.set_contexts_for(identity, self.capture()).await {
            warn!(error = %e, "Context snapshot publish failed");
        }
    }

    /// Symmetric teardown at run end.
    pub async fn clear(&mut self) {
        self.isolated.clear();
        let (Some(sink), Some(identity)) = (&self.sink, &self.presentation) else {
            return;
        };
        if let Err(e) = sink.clear_contexts_for(identity).await {
            warn!(error = %e, "Context snapshot clear failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ContextManager {
        let initial = FlowContext::main("anthropic", "claude-sonnet-4", "be brief");
        ContextManager::new(initial, None, None)
    }

    fn isolated_options() -> IsolatedOptions {
        IsolatedOptions {
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            system_instructions: "summarize".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn no_push_resolves_to_main() {
        let mut mgr = manager();
        let main_id = mgr.main_context().context_id;
        assert_eq!(mgr.resolve_active(None), main_id);
    }

    #[tokio::test]
    async fn known_id_reuses_binding_and_keeps_live_value() {
        let mut mgr = manager();
        let live = mgr.main_context();

        // A stale clone of the main context (crossed a process boundary).
        let mut stale = live.clone();
        stale.message_history.push(ChatMessage::user("stale"));
        let resolved = mgr.resolve_active(Some(&stale));

        assert_eq!(resolved, live.context_id);
        // Binding value is authoritative: the stale copy did not overwrite.
        assert!(mgr.value(&resolved).message_history.is_empty());
    }

    #[tokio::test]
    async fn unknown_isolated_id_gets_its_own_binding() {
        let mut mgr = manager();
        let foreign = FlowContext {
            context_type: ContextType::Isolated,
            ..FlowContext::main("openai", "gpt-4o", "sys")
        };
        let resolved = mgr.resolve_active(Some(&foreign));
        assert_eq!(resolved, foreign.context_id);
        assert_eq!(mgr.capture().isolated_contexts.len(), 1);
    }

    #[tokio::test]
    async fn output_none_passes_active_through() {
        let mut mgr = manager();
        let active = mgr.resolve_active(None);
        let result = mgr.ensure_output(None, &active).await;
        assert_eq!(result, active);
    }

    #[tokio::test]
    async fn main_typed_output_promotes_main_binding() {
        let mut mgr = manager();
        let old_main = mgr.main_context().context_id;
        let active = mgr.resolve_active(None);

        let replacement = FlowContext::main("anthropic", "claude-opus-4", "new thread");
        let id = mgr.ensure_output(Some(replacement.clone()), &active).await;

        assert_eq!(id, replacement.context_id);
        assert_ne!(mgr.main_context().context_id, old_main);
        assert_eq!(mgr.main_context().model, "claude-opus-4");
    }

    #[tokio::test]
    async fn updated_main_output_refreshes_binding_value() {
        let mut mgr = manager();
        let active = mgr.resolve_active(None);
        let updated = mgr
            .main_context()
            .with_message(ChatMessage::user("hello"));

        mgr.ensure_output(Some(updated), &active).await;
        assert_eq!(mgr.main_context().message_history.len(), 1);
    }

    #[tokio::test]
    async fn isolated_creation_inherits_nothing() {
        let mut mgr = manager();
        let main = mgr.main_context();
        let isolated = mgr.create_isolated(isolated_options()).await;

        assert_ne!(isolated.context_id, main.context_id);
        assert_eq!(isolated.context_type, ContextType::Isolated);
        assert_ne!(isolated.provider, main.provider);
        assert_ne!(isolated.model, main.model);
        assert_ne!(isolated.system_instructions, main.system_instructions);
        assert!(isolated.message_history.is_empty());
    }

    #[tokio::test]
    async fn successive_isolated_ids_are_distinct() {
        let mut mgr = manager();
        let a = mgr.create_isolated(isolated_options()).await;
        let b = mgr.create_isolated(isolated_options()).await;
        assert_ne!(a.context_id, b.context_id);
    }

    #[tokio::test]
    async fn release_is_noop_for_unknown_and_main() {
        let mut mgr = manager();
        let main_id = mgr.main_context().context_id;
        assert!(!mgr.release(&ContextId::new()).await);
        assert!(!mgr.release(&main_id).await);

        let isolated = mgr.create_isolated(isolated_options()).await;
        assert!(mgr.release(&isolated.context_id).await);
        assert!(mgr.capture().isolated_contexts.is_empty());
    }
}
