//! Caller credentials, exchanged credentials, and downstream scope sets.

pub mod credential;
pub mod scope;
pub mod token;

pub use credential::*;
pub use scope::*;
pub use token::*;
