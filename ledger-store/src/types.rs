//! Row types held by the store
//!
//! All rows are:
//! - Serialized with bincode
//! - Keyed by UUIDv7 ids (time-ordered)
//! - Priced in whole currency units (`Credits`)

use crate::storage::{Row, Table};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Whole, non-negative currency units
pub type Credits = u64;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a new time-ordered id
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Wrap an existing UUID
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Underlying UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Key bytes
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// User identifier
    UserId
);
entity_id!(
    /// Item ("planet") identifier
    ItemId
);
entity_id!(
    /// Listing identifier
    ListingId
);
entity_id!(
    /// Checkout transaction identifier
    TransactionId
);
entity_id!(
    /// Ownership record identifier
    OwnershipRecordId
);

/// Marketplace user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User ID
    pub user_id: UserId,

    /// Display name (optional)
    pub name: Option<String>,

    /// Email address
    pub email: String,

    /// Spendable balance
    pub balance: Credits,

    /// Guest accounts may be barred from buying
    pub is_guest: bool,

    /// Signup timestamp
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Name shown to other users: display name, falling back to email
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.email,
        }
    }
}

/// Uniquely owned tradeable item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Item ID
    pub item_id: ItemId,

    /// Current owner (`None` for house inventory)
    pub owner_id: Option<UserId>,

    /// Item name
    pub name: String,

    /// Size attribute
    pub size: u32,

    /// Category attribute
    pub category: String,

    /// Mint timestamp
    pub created_at: DateTime<Utc>,
}

/// Offer to sell one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    /// Listing ID
    pub listing_id: ListingId,

    /// Item on offer
    pub item_id: ItemId,

    /// Owner at listing time (`None` for house listings)
    pub seller_id: Option<UserId>,

    /// Asking price
    pub list_price: Credits,

    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

/// A buyer's pending intent to purchase a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartEntry {
    /// Buyer
    pub buyer_id: UserId,

    /// Listing in the cart
    pub listing_id: ListingId,

    /// When the listing was added
    pub added_at: DateTime<Utc>,
}

impl CartEntry {
    /// Primary key: buyer || listing
    pub fn key_for(buyer_id: UserId, listing_id: ListingId) -> Vec<u8> {
        let mut key = buyer_id.as_bytes().to_vec();
        key.extend_from_slice(listing_id.as_bytes());
        key
    }
}

/// Completed checkout (immutable)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction ID
    pub transaction_id: TransactionId,

    /// Buyer
    pub buyer_id: UserId,

    /// Sum of listing prices at time of purchase
    pub transaction_total: Credits,

    /// Client-supplied idempotency key
    pub request_key: Option<String>,

    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

/// One period of ownership of one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipRecord {
    /// Record ID
    pub record_id: OwnershipRecordId,

    /// Item
    pub item_id: ItemId,

    /// Checkout that opened this record
    pub transaction_id: TransactionId,

    /// New owner
    pub buyer_id: UserId,

    /// Previous owner (`None` when bought from the house)
    pub seller_id: Option<UserId>,

    /// Buyer name at time of sale
    pub buyer_name: String,

    /// Seller name at time of sale
    pub seller_name: Option<String>,

    /// Item name at time of sale
    pub item_name: String,

    /// Price paid
    pub sale_price: Credits,

    /// Ownership start
    pub start_date: DateTime<Utc>,

    /// Ownership end (`None` while open)
    pub end_date: Option<DateTime<Utc>>,
}

impl OwnershipRecord {
    /// Open records describe present ownership
    pub fn is_open(&self) -> bool {
        self.end_date.is_none()
    }
}

impl Row for User {
    const TABLE: Table = Table::Users;

    fn key(&self) -> Vec<u8> {
        self.user_id.as_bytes().to_vec()
    }
}

impl Row for Item {
    const TABLE: Table = Table::Items;

    fn key(&self) -> Vec<u8> {
        self.item_id.as_bytes().to_vec()
    }
}

impl Row for Listing {
    const TABLE: Table = Table::Listings;

    fn key(&self) -> Vec<u8> {
        self.listing_id.as_bytes().to_vec()
    }
}

impl Row for CartEntry {
    const TABLE: Table = Table::CartEntries;

    fn key(&self) -> Vec<u8> {
        Self::key_for(self.buyer_id, self.listing_id)
    }
}

impl Row for Transaction {
    const TABLE: Table = Table::Transactions;

    fn key(&self) -> Vec<u8> {
        self.transaction_id.as_bytes().to_vec()
    }
}

impl Row for OwnershipRecord {
    const TABLE: Table = Table::OwnershipRecords;

    fn key(&self) -> Vec<u8> {
        self.record_id.as_bytes().to_vec()
    }
}
