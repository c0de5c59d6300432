//! Data models for the Fez backend.
//!
//! Request and response shapes exchanged with clients, plus the post model.

mod fez;
mod fez_type;
mod post;
mod revision;
mod user;

pub use fez::*;
pub use fez_type::*;
pub use post::*;
pub use revision::*;
pub use user::*;
