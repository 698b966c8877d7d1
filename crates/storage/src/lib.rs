#![warn(clippy::pedantic)]

pub mod memory;
pub mod record;

pub use memory::InMemory;
