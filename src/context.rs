//! Request-scoped correlation values.
//!
//! A [`Scope`] is an immutable chain of key/value frames threaded explicitly
//! through the code that logs. Attaching a value returns a new child scope and
//! leaves the parent untouched, so nested work can shadow an identifier
//! without affecting its caller. Scopes are cheap to clone (`Arc`-based) and
//! can be sent across threads.
//!
//! ```rust
//! use logship::context::Scope;
//!
//! let root = Scope::root();
//! let bundle = root.with_instruction_id("bundle-7");
//! let step = bundle.with_instruction_id("bundle-7/step-2");
//!
//! assert_eq!(root.instruction_id(), None);
//! assert_eq!(bundle.instruction_id(), Some("bundle-7"));
//! assert_eq!(step.instruction_id(), Some("bundle-7/step-2"));
//! ```

use std::fmt;
use std::sync::Arc;

/// Key under which a value is attached to a [`Scope`].
///
/// Keys compare by name; crates defining their own keys should namespace the
/// name (`"mycrate.request_id"`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextKey(&'static str);

impl ContextKey {
    /// Create a key with the given name.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Name of the key.
    pub const fn name(&self) -> &'static str {
        self.0
    }
}

/// Well-known key holding the identifier of the instruction being executed.
pub const INSTRUCTION_ID: ContextKey = ContextKey::new("logship.instruction_id");

#[derive(Debug)]
struct Frame {
    key: ContextKey,
    value: Arc<str>,
    parent: Option<Arc<Frame>>,
}

/// Immutable chain of correlation values.
#[derive(Clone, Default)]
pub struct Scope {
    head: Option<Arc<Frame>>,
}

impl Scope {
    /// A scope with no values attached.
    pub fn root() -> Self {
        Self::default()
    }

    /// Return a child scope associating `value` with `key`.
    pub fn with_value(&self, key: ContextKey, value: impl Into<Arc<str>>) -> Self {
        Self {
            head: Some(Arc::new(Frame {
                key,
                value: value.into(),
                parent: self.head.clone(),
            })),
        }
    }

    /// Look up the nearest value attached under `key`.
    pub fn value(&self, key: ContextKey) -> Option<&str> {
        self.frames()
            .find(|frame| frame.key == key)
            .map(|frame| frame.value.as_ref())
    }

    /// Return a child scope tagged with an instruction identifier.
    pub fn with_instruction_id(&self, id: impl Into<Arc<str>>) -> Self {
        self.with_value(INSTRUCTION_ID, id)
    }

    /// Identifier of the instruction this scope belongs to, if any.
    pub fn instruction_id(&self) -> Option<&str> {
        self.value(INSTRUCTION_ID)
    }

    fn frames(&self) -> impl Iterator<Item = &Frame> {
        std::iter::successors(self.head.as_deref(), |frame| frame.parent.as_deref())
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.frames()
                    .map(|frame| (frame.key.name(), frame.value.as_ref())),
            )
            .finish()
    }
}
