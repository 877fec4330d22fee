pub mod item;
pub mod list;

pub use item::{Item, ItemKind};
pub use list::{slugify, List, WATCHLIST_NAME};
