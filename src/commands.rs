//! The command registry (§4.8): name-keyed handlers the keymap (and any
//! host UI) dispatch into. Grounded on the teacher's name -> handler
//! dispatch discipline in `editor_protocol.rs`'s JSON-RPC method routing,
//! adapted from string RPC methods to in-process closures.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::editor::Editor;
use crate::error::{CoreError, CoreResult};

/// A command's handler (§4.8): given the editor (so it can dispatch its
/// own ops) and optional args, returns whether it handled the invocation.
/// `Arc` (rather than `Box`) lets `Editor::execute_command` clone a
/// handler out of the registry before calling it, so the call isn't made
/// while still borrowing `self.commands`.
pub type CommandHandler = Arc<dyn Fn(&mut Editor, Option<serde_json::Value>) -> bool + Send + Sync>;

/// Maps command names to handlers (§4.8, §6's `executeCommand`).
#[derive(Default, Clone)]
pub struct CommandRegistry {
    commands: BTreeMap<String, CommandHandler>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `name`. Fails without mutating the
    /// registry if `name` is already taken.
    pub fn register(&mut self, name: impl Into<String>, handler: CommandHandler) -> CoreResult<()> {
        let name = name.into();
        if self.commands.contains_key(&name) {
            return Err(CoreError::DuplicateCommand { name });
        }
        self.commands.insert(name, handler);
        Ok(())
    }

    pub fn has(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Returns a clone of the handler bound to `name`, if any.
    pub fn get(&self, name: &str) -> Option<CommandHandler> {
        self.commands.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContentState, Document, ElementNode, Node, TextNode};
    use crate::ops::Op;

    fn sample_state() -> ContentState {
        ContentState::new(Document::new(vec![ElementNode::new("b0", "paragraph")
            .with_children(vec![Node::Text(TextNode::new("t0", "Hi"))])]))
    }

    #[test]
    fn register_then_get_returns_a_callable_handler() {
        let mut registry = CommandRegistry::new();
        registry
            .register(
                "insertHello",
                Arc::new(|editor: &mut Editor, _args| {
                    editor
                        .dispatch(crate::model::Transaction::local(
                            vec![Op::InsertText { path: vec![0, 0], offset: 0, data: "hello".into() }],
                            0,
                        ))
                        .unwrap()
                }),
            )
            .unwrap();
        assert!(registry.has("insertHello"));
        let mut editor = Editor::new("c1", sample_state());
        let handler = registry.get("insertHello").unwrap();
        assert!(handler(&mut editor, None));
        assert_eq!(editor.get_doc().block_text(0).unwrap(), "helloHi");
    }

    #[test]
    fn getting_an_unknown_command_returns_none() {
        let registry = CommandRegistry::new();
        assert!(registry.get("nope").is_none());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = CommandRegistry::new();
        registry.register("cmd", Arc::new(|_, _| true)).unwrap();
        let err = registry.register("cmd", Arc::new(|_, _| true)).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateCommand { .. }));
    }
}
