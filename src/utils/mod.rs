pub mod sos;

pub use sos::{SignalOfStop, join_with_grace};
