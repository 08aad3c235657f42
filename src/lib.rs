pub mod api;
pub mod assistant;
pub mod auth;
pub mod errors;
pub mod filter;
pub mod models;
pub mod persist;
pub mod routes;
pub mod settings;
pub mod state;
pub mod validation;
pub mod world;
