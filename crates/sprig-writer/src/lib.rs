pub mod printer;

pub use printer::{write, write_pretty};
