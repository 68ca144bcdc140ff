//! Business logic services.
//!
//! Services own the business rules and transactions; route handlers only
//! translate HTTP to service calls and back.
//!
//! # Services
//!
//! - `auth` - Password accounts, tokens, lockout, OTP reset, Google sign-in
//! - `products` - Catalog management and listing
//! - `cart` - Per-user cart mutations
//! - `orders` - Checkout and order history
//! - `reports` - Sales reports
//! - `export` - CSV/Excel/PDF rendering of order reports
//! - `email` - Transactional mail
//! - `media` - Cloudinary image storage
//! - `google` - Google OAuth client

pub mod auth;
pub mod cart;
pub mod email;
pub mod export;
pub mod google;
pub mod media;
pub mod orders;
pub mod products;
pub mod reports;

pub use auth::{AuthError, AuthService, TokenService};
pub use cart::{CartError, CartService};
pub use email::{EmailError, EmailService};
pub use export::{ExportError, ExportFormat};
pub use google::{GoogleClient, GoogleError};
pub use media::{MediaError, MediaService};
pub use orders::{OrderError, OrderService};
pub use products::{ProductError, ProductService};
pub use reports::{ReportError, ReportService};
