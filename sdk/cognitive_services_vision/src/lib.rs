#![doc = include_str!("../README.md")]

pub mod custom_vision;
pub mod image_analysis;
pub mod models;
pub mod retrieval;
