pub mod adapters;
pub mod config;
pub mod execution;
pub mod fallback;
pub mod graph;
pub mod manifest;
pub mod models;
pub mod registry;
pub mod solver;

#[cfg(test)]
mod test_support;
