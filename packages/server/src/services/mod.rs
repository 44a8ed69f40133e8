pub mod activity;
pub mod images;
pub mod permissions;
pub mod settings;
pub mod translations;
