//! Auth-domain identifiers and the credential handed to the snippet runner.

pub mod credential;
pub mod id;

pub use credential::*;
pub use id::*;
