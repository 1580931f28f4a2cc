use std::fmt;

use serde::{Deserialize, Serialize};

/// What a synthesized capability name guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    Module,
    Controller,
    Page,
    DataRead,
    DataWrite,
}

impl CapabilityKind {
    pub fn prefix(self) -> &'static str {
        match self {
            CapabilityKind::Module => "module.",
            CapabilityKind::Controller => "controller.",
            CapabilityKind::Page => "page.",
            CapabilityKind::DataRead => "data.read.",
            CapabilityKind::DataWrite => "data.write.",
        }
    }
}

/// A typed capability whose action name is derived from a target name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capability {
    pub kind: CapabilityKind,
    pub target: String,
}

impl Capability {
    pub fn new(kind: CapabilityKind, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
        }
    }

    pub fn module(name: impl Into<String>) -> Self {
        Self::new(CapabilityKind::Module, name)
    }

    pub fn controller(name: impl Into<String>) -> Self {
        Self::new(CapabilityKind::Controller, name)
    }

    pub fn page(name: impl Into<String>) -> Self {
        Self::new(CapabilityKind::Page, name)
    }

    pub fn data_read(model: impl Into<String>) -> Self {
        Self::new(CapabilityKind::DataRead, model)
    }

    pub fn data_write(model: impl Into<String>) -> Self {
        Self::new(CapabilityKind::DataWrite, model)
    }

    /// Action name, e.g. `controller.Shop` or `data.write.Order`.
    pub fn action_name(&self) -> String {
        format!("{}{}", self.kind.prefix(), self.target)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.prefix(), self.target)
    }
}

/// A module, controller, page or data model as seen by the resolver.
///
/// Access control is opt-in: only targets flagged `guarded` are checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub guarded: bool,
}

impl Target {
    /// A target anyone may use.
    pub fn open(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            guarded: false,
        }
    }

    /// A target gated by its synthesized capability.
    pub fn guarded(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            guarded: true,
        }
    }
}

/// A bare name always goes through the check.
impl From<&str> for Target {
    fn from(name: &str) -> Self {
        Target::guarded(name)
    }
}
