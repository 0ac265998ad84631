pub mod config;
pub mod entity;
pub mod error;
pub mod item;
pub mod partial_list;

pub use config::Config;
pub use entity::*;
pub use error::*;
pub use item::*;
pub use partial_list::PartialList;
