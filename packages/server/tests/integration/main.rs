mod activity;
mod attachment;
mod auth;
mod common;
mod controllers;
mod crud_edit;
mod settings;
