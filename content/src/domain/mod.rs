pub mod authority;
pub mod repository;
