//! # appmine-core
//! Foundation types, errors and store traits for the AppMine ranking engine.

pub mod amount;
pub mod constants;
pub mod error;
pub mod projection;
pub mod traits;
pub mod types;
