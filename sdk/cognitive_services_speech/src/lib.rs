#![doc = include_str!("../README.md")]

pub mod custom_voice;
pub mod text_to_speech;
