// src/utils/mod.rs

pub mod hash;
pub mod html;
pub mod join_code;
pub mod jwt;
