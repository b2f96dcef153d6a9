pub mod config;
pub mod db;
pub mod error;
pub mod github;
pub mod hooks;
pub mod inference;
pub mod lifecycle;
pub mod models;
pub mod queue;
pub mod review;
pub mod service;
pub mod status;
pub mod store;
pub mod views;
pub mod worker;
