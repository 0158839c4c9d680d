pub mod auth;
pub mod comments;
pub mod managers;
pub mod todos;
