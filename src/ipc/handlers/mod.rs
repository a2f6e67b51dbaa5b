pub mod analytics;
pub mod auth;
pub mod backup_exchange;
pub mod core;
pub mod marks;
pub mod results;
pub mod subjects;
