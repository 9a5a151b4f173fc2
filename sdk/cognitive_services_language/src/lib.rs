#![doc = include_str!("../README.md")]

pub mod analyze_text;
