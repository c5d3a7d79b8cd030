//! QCM engine: bank administration, categories, definition validation, the
//! draw, the status resolver, the attempt runner and the scorer.

pub mod bank;
pub mod categories;
pub mod definitions;
pub mod runner;
pub mod sampler;
pub mod scorer;
pub mod status;
