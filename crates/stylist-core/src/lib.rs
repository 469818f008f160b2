pub mod container;
pub mod docker;
pub mod error;
pub mod events;
pub mod feature;
pub mod io;
pub mod kms;
pub mod namespace;
pub mod paths;
pub mod profile;
pub mod project;
pub mod runner;
pub mod sentry;
pub mod settings;
pub mod store;
pub mod sync;
pub mod terraform;

pub use error::{Result, StoreError, StylistError};
pub use namespace::NamespacePath;
pub use project::{Project, ProjectOptions};
