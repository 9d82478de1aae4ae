pub mod config;
pub mod instagram;
pub mod template;
pub mod transform;
pub mod update;
pub mod wiki;
pub mod youtube;
