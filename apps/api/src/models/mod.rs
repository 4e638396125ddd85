pub mod candidate;
pub mod engagement;
pub mod portfolio;
pub mod project;
pub mod squad;
