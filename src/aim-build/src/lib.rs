//! Offline AIM-database construction: query an external variant service
//! for candidate rsids, keep the markers that differentiate the five
//! continental superpopulations, and emit the expanded catalogue.

mod build;
pub use build::run;

pub mod client;
pub mod frequencies;
pub mod fst;

mod error;
pub use error::AimBuildError;
