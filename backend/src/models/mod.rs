// src/models/mod.rs

pub mod attempt;
pub mod category;
pub mod question;
pub mod session_definition;
pub mod stats;
