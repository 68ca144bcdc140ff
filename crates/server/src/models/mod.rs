//! Domain models for the Bazaar API.
//!
//! Row types derive `sqlx::FromRow` and are read with runtime-checked
//! queries; response shapes serialize with camelCase keys.

pub mod cart;
pub mod order;
pub mod product;
pub mod report;
pub mod session;
pub mod user;

pub use cart::{Cart, CartItem, CartProduct};
pub use order::{Order, OrderItem};
pub use product::{Product, ProductPage};
pub use session::{CurrentUser, keys as session_keys};
pub use user::{PublicUser, User};
