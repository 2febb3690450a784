pub mod errors;
pub mod tty;
