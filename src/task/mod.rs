pub mod command;
pub mod control;
pub mod door;
pub mod launcher;
pub mod monitor;
pub mod rangefinder;
pub mod sequence;
