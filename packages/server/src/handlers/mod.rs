pub mod activity;
pub mod attachment;
pub mod auth;
pub mod crud;
pub mod settings;
