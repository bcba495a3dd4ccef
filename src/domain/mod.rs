pub mod models;
pub mod report;
pub mod serial;
pub mod settings;
