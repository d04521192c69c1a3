// src/models/mod.rs

pub mod answer;
pub mod course;
pub mod quiz;
pub mod stats;
pub mod user;
