//! Core value types shared by every kernel module

pub mod time;

pub use time::SimTime;
