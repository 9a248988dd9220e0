// src/types/mod.rs
pub mod events;
