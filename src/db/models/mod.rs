//! Database models split into domain-specific modules.

pub mod conversation;
pub mod user;

pub use conversation::*;
pub use user::*;
