//! Connection-bound access gate.
//!
//! A [`Session`] ties one caller's connection to the document store and the
//! authorization resolver: it binds the caller's role on login, and every
//! guarded operation asks the resolver before touching the store.
//!
//! # Example
//!
//! ```no_run
//! use policy::{Capability, MemoryConnection};
//! use session::Session;
//!
//! # fn example(store: storage::DocumentStore) -> session::Result<()> {
//! let mut session = Session::new(store, MemoryConnection::new())
//!     .with_domain("shop")
//!     .guard_table("orders", "Order");
//! session.login("clerk")?;
//! session.require(&Capability::page("orders"))?;
//! let orders = session.read("orders", &storage::Query::all())?;
//! println!("{} orders", orders.len());
//! # Ok(())
//! # }
//! ```

mod error;
mod session;

pub use error::{Error, Result};
pub use session::Session;
