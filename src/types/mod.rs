pub mod schema;
pub mod frame;
pub mod label;

pub use schema::*;
pub use frame::*;
pub use label::*;
