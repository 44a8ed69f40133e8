pub mod activity_log;
pub mod attachable;
pub mod attachment;
pub mod page;
pub mod page_term;
pub mod permission;
pub mod role;
pub mod role_permission;
pub mod setting;
pub mod term;
pub mod translation;
pub mod user;
pub mod user_role;
