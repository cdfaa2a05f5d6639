//! Runtime detection of a usable IndexedDB factory.
//!
//! Browsers have exposed the factory under vendor-prefixed names over the years. The first
//! name that is bound at all decides the outcome: a present but malformed binding fails
//! detection even if a later name would have worked.

use std::collections::{BTreeMap, BTreeSet};

/// Global names the factory may be bound to, in lookup order.
pub const FACTORY_BINDINGS: [&str; 4] = [
    "indexedDB",
    "webkitIndexedDB",
    "mozIndexedDB",
    "msIndexedDB",
];

/// Methods a usable factory must expose, directly or through its prototype.
pub const REQUIRED_METHODS: [&str; 4] = ["databases", "deleteDatabase", "open", "cmp"];

/// Type tag (`Object.prototype.toString` name) of the factory and of its prototype.
pub const FACTORY_TYPE_TAG: &str = "IDBFactory";

/// Read-only view of a global object.
pub trait GlobalScope {
    type Binding: Binding;

    /// The value bound to `name`, or `None` when nothing (or `undefined`) is bound.
    fn lookup(&self, name: &str) -> Option<Self::Binding>;
}

/// A value found on the global object.
pub trait Binding {
    /// Type tag of the value itself, e.g. `IDBFactory` for `[object IDBFactory]`.
    fn type_tag(&self) -> Option<String>;
    /// Type tag of the value's prototype.
    fn prototype_type_tag(&self) -> Option<String>;
    /// Whether `method` is a function on the value or on its prototype.
    fn has_method(&self, method: &str) -> bool;
}

/// Outcome of probing a global scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    /// A well-formed factory is bound to `binding`.
    Available { binding: &'static str },
    /// None of the candidate names is bound.
    Missing,
    /// `binding` is bound but is not a factory.
    NotAFactory { binding: &'static str },
    /// `binding` is a factory but lacks `method`.
    MissingMethod {
        binding: &'static str,
        method: &'static str,
    },
}

impl Capability {
    pub fn is_available(&self) -> bool {
        matches!(self, Capability::Available { .. })
    }
}

pub fn probe<G: GlobalScope + ?Sized>(scope: &G) -> Capability {
    let Some((binding, value)) = FACTORY_BINDINGS
        .iter()
        .find_map(|&name| scope.lookup(name).map(|value| (name, value)))
    else {
        return Capability::Missing;
    };

    let is_factory = value.type_tag().as_deref() == Some(FACTORY_TYPE_TAG)
        && value.prototype_type_tag().as_deref() == Some(FACTORY_TYPE_TAG);
    if !is_factory {
        return Capability::NotAFactory { binding };
    }

    let missing = REQUIRED_METHODS.iter().find(|m| !value.has_method(m));
    match missing {
        Some(&method) => Capability::MissingMethod { binding, method },
        None => Capability::Available { binding },
    }
}

/// Whether the transactional backend can be used in `scope`.
pub fn supports_indexed_db<G: GlobalScope + ?Sized>(scope: &G) -> bool {
    let capability = probe(scope);
    tracing::debug!(?capability, "probed for IndexedDB");
    capability.is_available()
}

/// Global scope with nothing bound, e.g. a native host.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGlobals;

impl GlobalScope for NoGlobals {
    type Binding = StaticBinding;

    fn lookup(&self, _name: &str) -> Option<StaticBinding> {
        None
    }
}

/// Description of a bound value, for [`StaticGlobals`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticBinding {
    pub type_tag: Option<String>,
    pub prototype_type_tag: Option<String>,
    pub own_methods: BTreeSet<String>,
    pub prototype_methods: BTreeSet<String>,
}

impl StaticBinding {
    /// A complete factory whose methods all live on the prototype, as in browsers.
    pub fn factory() -> Self {
        Self {
            type_tag: Some(FACTORY_TYPE_TAG.to_owned()),
            prototype_type_tag: Some(FACTORY_TYPE_TAG.to_owned()),
            own_methods: BTreeSet::new(),
            prototype_methods: REQUIRED_METHODS.iter().map(|m| (*m).to_owned()).collect(),
        }
    }

    /// A plain object carrying no methods.
    pub fn object() -> Self {
        Self {
            type_tag: Some("Object".to_owned()),
            prototype_type_tag: Some("Object".to_owned()),
            ..Self::default()
        }
    }

    pub fn without_method(mut self, method: &str) -> Self {
        self.own_methods.remove(method);
        self.prototype_methods.remove(method);
        self
    }
}

impl Binding for StaticBinding {
    fn type_tag(&self) -> Option<String> {
        self.type_tag.clone()
    }

    fn prototype_type_tag(&self) -> Option<String> {
        self.prototype_type_tag.clone()
    }

    fn has_method(&self, method: &str) -> bool {
        self.own_methods.contains(method) || self.prototype_methods.contains(method)
    }
}

/// Global scope with a fixed set of bindings.
#[derive(Debug, Clone, Default)]
pub struct StaticGlobals {
    bindings: BTreeMap<String, StaticBinding>,
}

impl StaticGlobals {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scope exposing a complete factory as `indexedDB`.
    pub fn browser() -> Self {
        Self::new().with("indexedDB", StaticBinding::factory())
    }

    pub fn with(mut self, name: &str, binding: StaticBinding) -> Self {
        self.bindings.insert(name.to_owned(), binding);
        self
    }
}

impl GlobalScope for StaticGlobals {
    type Binding = StaticBinding;

    fn lookup(&self, name: &str) -> Option<StaticBinding> {
        self.bindings.get(name).cloned()
    }
}
