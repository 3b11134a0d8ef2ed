// src/handlers/mod.rs
pub mod api;
pub mod output;
pub mod pages;
pub mod ui;
pub mod upload;
