pub mod input;
pub mod models;
pub mod output;
pub mod runner;
pub mod scrapers;
