// src/handlers/mod.rs

pub mod answer;
pub mod auth;
pub mod course;
pub mod quiz;
pub mod stats;
