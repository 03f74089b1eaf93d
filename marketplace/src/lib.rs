//! Planet Marketplace
//!
//! Users buy and sell uniquely-owned items ("planets") through listings and
//! a shopping cart. The checkout engine turns a cart into a purchase as one
//! atomic unit: funds move from the buyer to every seller, ownership
//! transfers, and each item's ownership history gains a new open record.
//!
//! # Architecture
//!
//! - **Cart manager** ([`cart`]): resolves and mutates carts
//! - **Funds validator** ([`pricing`]): guest, size and solvency rules
//! - **Checkout engine** ([`engine`]): re-verifies and commits on the store writer
//! - **History chain** ([`history`]): closes and opens ownership records
//! - **Facade** ([`Marketplace`]): the caller-facing API
//!
//! # Example
//!
//! ```no_run
//! use marketplace::{Config, Marketplace, NewItem, NewUser};
//!
//! #[tokio::main]
//! async fn main() -> marketplace::Result<()> {
//!     let market = Marketplace::open(Config::default()).await?;
//!
//!     let buyer = market
//!         .create_user(NewUser {
//!             name: Some("Ada".to_string()),
//!             email: "ada@example.com".to_string(),
//!             is_guest: false,
//!             initial_balance: 10_000,
//!         })
//!         .await?;
//!     let item = market
//!         .mint_item(NewItem {
//!             name: "Kepler-452b".to_string(),
//!             size: 9,
//!             category: "super-earth".to_string(),
//!             owner_id: None,
//!         })
//!         .await?;
//!     let listing = market.create_house_listing(item.item_id, 5_000).await?;
//!
//!     market.add_item_to_cart(buyer.user_id, listing.listing_id).await?;
//!     let receipt = market.checkout_cart(buyer.user_id).await?;
//!     println!("{}", receipt.message);
//!
//!     market.shutdown().await
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod cart;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod listings;
pub mod market;
pub mod metrics;
pub mod pricing;

// Re-exports
pub use cart::ResolvedCartEntry;
pub use config::{CheckoutPolicy, Config, ListingPolicy, LoggingConfig};
pub use engine::{CheckoutEngine, CheckoutReceipt, CHECKOUT_SUCCESS_MESSAGE};
pub use error::{Error, ErrorKind, Result};
pub use history::{ChainReport, ChainViolation};
pub use listings::{NewItem, NewUser};
pub use market::Marketplace;
pub use metrics::Metrics;
pub use pricing::{CheckoutLine, CheckoutPlan, FundsValidator};
