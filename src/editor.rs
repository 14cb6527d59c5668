//! The editor facade (§6): `Editor` ties the document model, OT engine,
//! plugin kernel, command registry and cursor tracking together behind a
//! single synchronous API.
//!
//! Grounded on the teacher's `DocumentActorHandle`/`DocMessage` dispatch
//! loop (`daemon.rs`/`actors.rs`), simplified from an async actor handle
//! to the spec's synchronous single-threaded model (§5) — `dispatch`
//! plays the role of `DocMessage::RevDelta` handling, minus the
//! channel/actor indirection.

use crate::commands::CommandRegistry;
use crate::error::CoreResult;
use crate::keymap::{KeyEvent, Keymap};
use crate::model::{ContentState, Transaction};
use crate::ops;
use crate::plugin::PluginRegistry;
use crate::position::CursorRegistry;
use crate::version_vector::VersionVector;

/// Payload delivered to `state:change` listeners (§5/§6): the state
/// immediately before and after the transaction, plus the transaction
/// itself, so a listener can tell e.g. `origin == "remote"` apart from a
/// local edit and skip its own outbound diffing accordingly (§5.3).
pub struct StateChangeEvent<'a> {
    pub prev_state: &'a ContentState,
    pub next_state: &'a ContentState,
    pub transaction: &'a Transaction,
}

type Listener = Box<dyn Fn(&StateChangeEvent) + Send + Sync>;

/// The editor's synchronous in-process API (§6). Owns the current state
/// and every registry needed to dispatch transactions against it.
pub struct Editor {
    client_id: String,
    state: ContentState,
    plugins: PluginRegistry,
    commands: CommandRegistry,
    keymap: Keymap,
    cursors: CursorRegistry,
    local_versions: VersionVector,
    listeners: Vec<Listener>,
}

impl Editor {
    pub fn new(client_id: impl Into<String>, state: ContentState) -> Self {
        Self {
            client_id: client_id.into(),
            state,
            plugins: PluginRegistry::new(),
            commands: CommandRegistry::new(),
            keymap: Keymap::new(),
            cursors: CursorRegistry::new(),
            local_versions: VersionVector::new(),
            listeners: Vec::new(),
        }
    }

    pub fn get_state(&self) -> &ContentState {
        &self.state
    }

    pub fn get_doc(&self) -> &crate::model::Document {
        &self.state.doc
    }

    pub fn plugins_mut(&mut self) -> &mut PluginRegistry {
        &mut self.plugins
    }

    pub fn commands_mut(&mut self) -> &mut CommandRegistry {
        &mut self.commands
    }

    pub fn keymap_mut(&mut self) -> &mut Keymap {
        &mut self.keymap
    }

    pub fn cursors(&self) -> &CursorRegistry {
        &self.cursors
    }

    /// A host-agnostic stand-in for a DOM "editable element" handle: the
    /// id of the document's root block, which a view layer can key a
    /// rendered element to. Actual rendering/DOM binding is out of scope
    /// (§1 Non-goals).
    pub fn get_editable_element(&self) -> Option<&str> {
        self.state.doc.children.first().map(|b| b.id.as_str())
    }

    /// Registers a listener invoked after every successfully applied
    /// transaction (remote or local).
    pub fn on(&mut self, listener: Listener) {
        self.listeners.push(listener);
    }

    /// Runs `transaction` through the plugin pipeline and, if no plugin
    /// vetoes, applies its operations (and any whole-document/selection
    /// replacement) atomically and notifies listeners. Returns `true` if
    /// the transaction was applied, `false` if a plugin aborted it
    /// (§8.1's atomicity guarantee: on abort, state is untouched).
    pub fn dispatch(&mut self, transaction: Transaction) -> CoreResult<bool> {
        let Some(transaction) = self.plugins.run_transaction(&self.state, transaction) else {
            return Ok(false);
        };

        let prev_state = self.state.clone();

        let mut doc = transaction.doc.clone().unwrap_or_else(|| self.state.doc.clone());
        for op in &transaction.operations {
            doc = ops::apply(&doc, op)?;
        }
        self.state.doc = doc;
        if let Some(selection) = transaction.selection.clone() {
            self.state.selection = Some(selection);
        }
        self.cursors.remap_all(&transaction.operations);
        self.local_versions.increment(&self.client_id);

        self.plugins.notify_update(&prev_state, &self.state);
        for listener in &self.listeners {
            listener(&StateChangeEvent {
                prev_state: &prev_state,
                next_state: &self.state,
                transaction: &transaction,
            });
        }
        Ok(true)
    }

    /// Looks up and runs the command bound to `name`, handing it `self`
    /// and `args`. Returns `None` if no such command is registered, or
    /// `Some(handled)` from the handler otherwise (§4.8).
    pub fn execute_command(&mut self, name: &str, args: Option<serde_json::Value>) -> Option<bool> {
        let handler = self.commands.get(name)?;
        Some(handler(self, args))
    }

    /// The key dispatch pipeline (§4.7/§4.8): plugin `on_key_down` hooks
    /// run first in init order, then the event is canonicalised and
    /// looked up in the keymap. Returns whether the event was handled, so
    /// a host can `preventDefault` accordingly.
    pub fn dispatch_key(&mut self, event: KeyEvent) -> bool {
        if self.plugins.dispatch_key(&event, &self.state) {
            return true;
        }
        let Some(name) = self.keymap.lookup(&event.canonical()).map(str::to_string) else {
            return false;
        };
        self.execute_command(&name, None).unwrap_or(false)
    }

    pub fn local_versions(&self) -> &VersionVector {
        &self.local_versions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Document, ElementNode, Node, TextNode};
    use crate::ops::Op;
    use std::sync::Arc;

    fn sample_state() -> ContentState {
        ContentState::new(Document::new(vec![ElementNode::new("b0", "paragraph")
            .with_children(vec![Node::Text(TextNode::new("t0", "Hi"))])]))
    }

    #[test]
    fn dispatch_applies_ops_and_notifies_listeners() {
        let mut editor = Editor::new("c1", sample_state());
        let seen = std::sync::Arc::new(std::sync::Mutex::new(0));
        let seen2 = seen.clone();
        editor.on(Box::new(move |event: &StateChangeEvent| {
            assert_eq!(event.transaction.origin, "local");
            *seen2.lock().unwrap() += 1;
        }));

        let applied = editor
            .dispatch(Transaction::local(
                vec![Op::InsertText { path: vec![0, 0], offset: 2, data: "!".into() }],
                0,
            ))
            .unwrap();
        assert!(applied);
        assert_eq!(editor.get_doc().block_text(0).unwrap(), "Hi!");
        assert_eq!(*seen.lock().unwrap(), 1);
        assert_eq!(editor.local_versions().get("c1"), 1);
    }

    #[test]
    fn plugin_veto_leaves_state_untouched() {
        struct Vetoer;
        impl crate::plugin::Plugin for Vetoer {
            fn name(&self) -> &str {
                "vetoer"
            }
            fn on_transaction(&self, _state: &ContentState, _tr: Transaction) -> Option<Transaction> {
                None
            }
        }
        let mut editor = Editor::new("c1", sample_state());
        editor.plugins_mut().register(Box::new(Vetoer)).unwrap();
        let before = editor.get_doc().clone();
        let applied = editor
            .dispatch(Transaction::local(
                vec![Op::InsertText { path: vec![0, 0], offset: 0, data: "x".into() }],
                0,
            ))
            .unwrap();
        assert!(!applied);
        assert_eq!(editor.get_doc(), &before);
    }

    #[test]
    fn execute_command_dispatches_its_ops() {
        let mut editor = Editor::new("c1", sample_state());
        editor
            .commands_mut()
            .register(
                "shout",
                Arc::new(|editor: &mut Editor, _args| {
                    editor
                        .dispatch(Transaction::local(
                            vec![Op::InsertText { path: vec![0, 0], offset: 0, data: "!".into() }],
                            0,
                        ))
                        .unwrap()
                }),
            )
            .unwrap();
        assert!(editor.execute_command("shout", None).unwrap());
        assert_eq!(editor.get_doc().block_text(0).unwrap(), "!Hi");
    }

    #[test]
    fn unknown_command_returns_none() {
        let mut editor = Editor::new("c1", sample_state());
        assert!(editor.execute_command("nope", None).is_none());
    }

    #[test]
    fn dispatch_key_runs_the_bound_command_and_reports_handled() {
        let mut editor = Editor::new("c1", sample_state());
        editor
            .commands_mut()
            .register(
                "shout",
                Arc::new(|editor: &mut Editor, _args| {
                    editor
                        .dispatch(Transaction::local(
                            vec![Op::InsertText { path: vec![0, 0], offset: 0, data: "!".into() }],
                            0,
                        ))
                        .unwrap()
                }),
            )
            .unwrap();
        editor.keymap_mut().bind("Ctrl+b", "shout");

        let handled = editor.dispatch_key(KeyEvent::new("b").with_ctrl());
        assert!(handled);
        assert_eq!(editor.get_doc().block_text(0).unwrap(), "!Hi");
    }

    #[test]
    fn dispatch_key_reports_unhandled_for_an_unbound_chord() {
        let mut editor = Editor::new("c1", sample_state());
        assert!(!editor.dispatch_key(KeyEvent::new("z").with_ctrl()));
    }

    #[test]
    fn plugin_on_key_down_short_circuits_the_keymap() {
        struct Interceptor;
        impl crate::plugin::Plugin for Interceptor {
            fn name(&self) -> &str {
                "interceptor"
            }
            fn on_key_down(&self, _event: &KeyEvent, _ctx: &ContentState) -> bool {
                true
            }
        }
        let mut editor = Editor::new("c1", sample_state());
        editor.plugins_mut().register(Box::new(Interceptor)).unwrap();
        assert!(editor.dispatch_key(KeyEvent::new("z").with_ctrl()));
    }
}
