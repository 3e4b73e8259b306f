pub mod app;
pub mod chart;
pub mod pages;
pub mod ratings;
pub mod tmdb;
pub mod utils;
pub mod view;
