pub mod client;
pub mod locator;
pub mod parse;
pub mod runner;

#[cfg(test)]
pub mod fake;
