pub mod macros;

pub mod chain;
pub mod config;
pub mod contract;
pub mod deposit;
pub mod error;
pub mod helpers;
pub mod logger;
pub mod session;
pub mod submit;

#[cfg(test)]
mod testing;
