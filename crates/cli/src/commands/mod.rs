pub mod generate_config;
pub mod start;
pub mod stop;
