pub mod auth;
pub mod calendar;
pub mod core;
pub mod duties;
pub mod exchange;
pub mod notifications;
pub mod reports;
pub mod users;
