#![doc = include_str!("../README.md")]

pub mod content_safety;
pub mod models;
