//! Chord grammar parsing/canonicalisation and chord-to-command binding
//! (§4.8). The teacher has no keymap layer of its own; the tagged-enum
//! dispatch style of its `EditorProtocolRequestFromEditor`
//! (`types.rs`/`editor_protocol.rs`) informed the "parse into a typed
//! shape, then look up by canonical key" approach taken here.

use std::collections::BTreeMap;

/// A parsed chord: an ordered modifier set plus a base key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Chord {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool,
    pub key: String,
}

impl Chord {
    /// Parses a `+`-separated chord string (e.g. `"Ctrl+Shift+k"`,
    /// case-insensitive, modifiers in any order). `"Mod"` is an alias for
    /// the platform-primary modifier: `meta` on macOS, `ctrl` elsewhere
    /// (§4.8).
    pub fn parse(raw: &str) -> Option<Self> {
        let mut chord = Chord { ctrl: false, alt: false, shift: false, meta: false, key: String::new() };
        let mut key_seen = false;

        for part in raw.split('+') {
            let part = part.trim();
            if part.is_empty() {
                return None;
            }
            match part.to_ascii_lowercase().as_str() {
                "ctrl" | "control" => chord.ctrl = true,
                "mod" => {
                    if cfg!(target_os = "macos") {
                        chord.meta = true;
                    } else {
                        chord.ctrl = true;
                    }
                }
                "alt" | "option" => chord.alt = true,
                "shift" => chord.shift = true,
                "meta" | "cmd" | "command" | "super" => chord.meta = true,
                _ => {
                    if key_seen {
                        return None;
                    }
                    chord.key = part.to_ascii_lowercase();
                    key_seen = true;
                }
            }
        }

        if key_seen {
            Some(chord)
        } else {
            None
        }
    }

    /// Canonical string form: modifiers in a fixed order, lowercase key.
    pub fn canonical(&self) -> String {
        let mut parts = Vec::new();
        if self.ctrl {
            parts.push("ctrl");
        }
        if self.alt {
            parts.push("alt");
        }
        if self.shift {
            parts.push("shift");
        }
        if self.meta {
            parts.push("meta");
        }
        parts.push(&self.key);
        parts.join("+")
    }
}

/// A raw key event from the host's input layer (§4.7/§4.8), shaped like
/// `Chord` so it canonicalises the same way for the keymap lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool,
    pub key: String,
}

impl KeyEvent {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            ctrl: false,
            alt: false,
            shift: false,
            meta: false,
            key: key.into(),
        }
    }

    pub fn with_ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn with_meta(mut self) -> Self {
        self.meta = true;
        self
    }

    pub fn with_shift(mut self) -> Self {
        self.shift = true;
        self
    }

    pub fn with_alt(mut self) -> Self {
        self.alt = true;
        self
    }

    /// The canonical chord string this event resolves to, for `Keymap::lookup`.
    pub fn canonical(&self) -> String {
        Chord {
            ctrl: self.ctrl,
            alt: self.alt,
            shift: self.shift,
            meta: self.meta,
            key: self.key.clone(),
        }
        .canonical()
    }
}

/// Binds chord strings to command names, resolving equivalent chord
/// spellings (modifier order, case, `Mod`/`Cmd` aliasing) to the same
/// binding.
#[derive(Debug, Default)]
pub struct Keymap {
    bindings: BTreeMap<String, String>,
}

impl Keymap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `chord` to `command_name`. Returns `false` if `chord` does
    /// not parse (so callers can surface a config error at the seam that
    /// needs it, rather than this type owning a dedicated error kind).
    pub fn bind(&mut self, chord: &str, command_name: impl Into<String>) -> bool {
        match Chord::parse(chord) {
            Some(parsed) => {
                self.bindings.insert(parsed.canonical(), command_name.into());
                true
            }
            None => false,
        }
    }

    pub fn unbind(&mut self, chord: &str) {
        if let Some(parsed) = Chord::parse(chord) {
            self.bindings.remove(&parsed.canonical());
        }
    }

    /// Looks up the command bound to `chord`, under any equivalent
    /// spelling.
    pub fn lookup(&self, chord: &str) -> Option<&str> {
        let parsed = Chord::parse(chord)?;
        self.bindings.get(&parsed.canonical()).map(String::as_str)
    }
}
