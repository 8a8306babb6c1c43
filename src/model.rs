pub mod points;
pub mod profile;
pub mod shop;
pub mod tasks;
