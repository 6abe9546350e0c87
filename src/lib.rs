pub mod api;
pub mod config;
pub mod counter;
pub mod database;
pub mod error;
pub mod logger;
pub mod model;

pub trait Located {
    fn location(&self) -> snafu::Location;
}
