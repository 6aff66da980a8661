#![forbid(unsafe_code)]

pub mod anti_cheat;
pub mod model;
pub mod time;

pub use anti_cheat::{CheatPolicy, CheatVerdict};
pub use time::Clock;
