//! Domain data model.

pub mod catalog;
pub mod credit;
pub mod macros;
pub mod user;

pub use catalog::*;
pub use credit::*;
pub use user::*;
