// src/handlers/mod.rs

pub mod admin;
pub mod categories;
pub mod health;
pub mod qcm;
pub mod sessions;
