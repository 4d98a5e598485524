pub mod analysis;
pub mod audit;
pub mod auth;
pub mod pages;
