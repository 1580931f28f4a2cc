//! Role-based authorization over the document store.
//!
//! Core principle: **privileged operations name a capability, and a role
//! either holds it or it does not.**
//!
//! The permission graph has three tiers, each optionally scoped to a
//! domain: actions, roles (sets of actions, possibly the `*` wildcard) and
//! groups (sets of roles plus their own actions). All three are stored as
//! documents in the [`storage::DocumentStore`]; the [`Resolver`] reads them
//! through the [`AccessSource`] seam and answers boolean queries.
//!
//! Targets are opt-in: a module, controller, page or data model that is not
//! [`Target::guarded`] is always allowed.

mod capability;
mod connection;
mod declare;
mod error;
mod model;
mod resolver;
mod source;

pub use capability::{Capability, CapabilityKind, Target};
pub use connection::{Connection, MemoryConnection, ROLE_KEY, bind_role, connection_role, unbind_role};
pub use declare::{AccessConfig, AccessGraph, ActionDecl, Grant, GroupDecl, RoleDecl, SeedReport};
pub use error::{Error, Result};
pub use model::{AccessRecord, Action, Group, Role, WILDCARD, register_schemas};
pub use resolver::{ActionRef, DataAccess, Resolver};
pub use source::AccessSource;
