pub mod activity;
pub mod auth;
pub mod crud;
pub mod settings;
pub mod shared;
