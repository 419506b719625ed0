pub mod app;
pub mod draft;
pub mod file;
pub mod release;
