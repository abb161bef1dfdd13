pub mod aggregator;
pub mod repository;
