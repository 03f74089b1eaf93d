//! Collaborator operations: signup, top-ups, minting and listings
//!
//! Thin units of work that set up the state the checkout engine trades on.

use crate::config::ListingPolicy;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use ledger_store::{
    Credits, Item, ItemId, Listing, ListingId, ReadView, User, UserId, WriteSet,
};
use serde::{Deserialize, Serialize};

/// Signup request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    /// Display name
    pub name: Option<String>,

    /// Email address
    pub email: String,

    /// Guest account
    #[serde(default)]
    pub is_guest: bool,

    /// Starting balance
    #[serde(default)]
    pub initial_balance: Credits,
}

/// Mint request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewItem {
    /// Item name
    pub name: String,

    /// Size attribute
    pub size: u32,

    /// Category attribute
    pub category: String,

    /// Initial owner (`None` for house inventory)
    pub owner_id: Option<UserId>,
}

impl ListingPolicy {
    /// Check a list price against the configured bounds
    pub fn check_price(&self, price: Credits) -> Result<()> {
        if price < self.min_listing_price || price > self.max_listing_price {
            return Err(Error::BadRequest(format!(
                "List price {} must be between {} and {}",
                price, self.min_listing_price, self.max_listing_price
            )));
        }
        Ok(())
    }
}

/// Register a user
pub fn create_user(writes: &mut WriteSet<'_>, new: NewUser, now: DateTime<Utc>) -> Result<User> {
    if new.email.trim().is_empty() {
        return Err(Error::BadRequest("Email is required".to_string()));
    }

    let user = User {
        user_id: UserId::new(),
        name: new.name,
        email: new.email,
        balance: new.initial_balance,
        is_guest: new.is_guest,
        created_at: now,
    };
    writes.put_user(&user)?;
    Ok(user)
}

/// Add funds to a balance
pub fn top_up(writes: &mut WriteSet<'_>, user_id: UserId, amount: Credits) -> Result<User> {
    if amount == 0 {
        return Err(Error::BadRequest("Top-up amount must be positive".to_string()));
    }

    let mut user = writes
        .user(user_id)?
        .ok_or_else(|| Error::NotFound("User not found".to_string()))?;
    user.balance = user
        .balance
        .checked_add(amount)
        .ok_or_else(|| Error::BadRequest("Balance would overflow".to_string()))?;
    writes.put_user(&user)?;
    Ok(user)
}

/// Create an item
pub fn mint_item(writes: &mut WriteSet<'_>, new: NewItem, now: DateTime<Utc>) -> Result<Item> {
    if new.name.trim().is_empty() {
        return Err(Error::BadRequest("Item name is required".to_string()));
    }
    if let Some(owner_id) = new.owner_id {
        if writes.user(owner_id)?.is_none() {
            return Err(Error::NotFound("Owner not found".to_string()));
        }
    }

    let item = Item {
        item_id: ItemId::new(),
        owner_id: new.owner_id,
        name: new.name,
        size: new.size,
        category: new.category,
        created_at: now,
    };
    writes.put_item(&item)?;
    Ok(item)
}

/// Offer an item for sale
///
/// `seller` is the caller; `None` lists house inventory. The item must be
/// owned by exactly that party.
pub fn create_listing(
    writes: &mut WriteSet<'_>,
    policy: &ListingPolicy,
    seller: Option<UserId>,
    item_id: ItemId,
    price: Credits,
    now: DateTime<Utc>,
) -> Result<Listing> {
    let item = writes
        .item(item_id)?
        .filter(|item| item.owner_id == seller)
        .ok_or_else(|| Error::NotFound("Item not found".to_string()))?;

    policy.check_price(price)?;

    if writes.listing_for_item(item.item_id)?.is_some() {
        return Err(Error::Conflict("Item is already listed".to_string()));
    }

    let listing = Listing {
        listing_id: ListingId::new(),
        item_id: item.item_id,
        seller_id: seller,
        list_price: price,
        created_at: now,
    };
    writes.put_listing(&listing)?;
    Ok(listing)
}

/// Withdraw a listing; returns the number of cart entries dropped with it
pub fn cancel_listing(
    writes: &mut WriteSet<'_>,
    seller: Option<UserId>,
    listing_id: ListingId,
) -> Result<usize> {
    let listing = writes
        .listing(listing_id)?
        .ok_or_else(|| Error::NotFound("Listing not found".to_string()))?;

    let owned = writes
        .item(listing.item_id)?
        .map_or(false, |item| item.owner_id == seller);
    if !owned {
        return Err(Error::NotFound("Listing not found".to_string()));
    }

    Ok(writes.remove_listing(&listing)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_store::{CartEntry, Storage, StoreConfig};
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = StoreConfig::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.rocksdb.sync_writes = false;
        (Storage::open(&config).unwrap(), temp_dir)
    }

    fn signup(storage: &Storage, balance: Credits) -> User {
        storage
            .transact(|writes| {
                create_user(
                    writes,
                    NewUser {
                        name: Some("Lin".to_string()),
                        email: "lin@example.com".to_string(),
                        is_guest: false,
                        initial_balance: balance,
                    },
                    Utc::now(),
                )
            })
            .unwrap()
    }

    fn mint(storage: &Storage, owner_id: Option<UserId>) -> Item {
        storage
            .transact(|writes| {
                mint_item(
                    writes,
                    NewItem {
                        name: "TRAPPIST-1e".to_string(),
                        size: 5,
                        category: "temperate".to_string(),
                        owner_id,
                    },
                    Utc::now(),
                )
            })
            .unwrap()
    }

    #[test]
    fn test_price_bounds_inclusive() {
        let policy = ListingPolicy {
            min_listing_price: 100,
            max_listing_price: 200,
        };
        assert!(policy.check_price(100).is_ok());
        assert!(policy.check_price(200).is_ok());
        assert!(matches!(policy.check_price(99), Err(Error::BadRequest(_))));
        assert!(matches!(policy.check_price(201), Err(Error::BadRequest(_))));
    }

    #[test]
    fn test_top_up() {
        let (storage, _temp) = test_storage();
        let user = signup(&storage, 10);

        let updated = storage
            .transact(|writes| top_up(writes, user.user_id, 90))
            .unwrap();
        assert_eq!(updated.balance, 100);

        let err = storage
            .transact(|writes| top_up(writes, user.user_id, 0))
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));

        let err = storage
            .transact(|writes| top_up(writes, UserId::new(), 5))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_mint_requires_existing_owner() {
        let (storage, _temp) = test_storage();
        let err = storage
            .transact(|writes| {
                mint_item(
                    writes,
                    NewItem {
                        name: "Ghost".to_string(),
                        size: 1,
                        category: "gas".to_string(),
                        owner_id: Some(UserId::new()),
                    },
                    Utc::now(),
                )
            })
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_listing_rules() {
        let (storage, _temp) = test_storage();
        let owner = signup(&storage, 0);
        let other = signup(&storage, 0);
        let item = mint(&storage, Some(owner.user_id));
        let policy = ListingPolicy::default();

        let err = storage
            .transact(|writes| {
                create_listing(writes, &policy, Some(other.user_id), item.item_id, 5_000, Utc::now())
            })
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let err = storage
            .transact(|writes| {
                create_listing(writes, &policy, Some(owner.user_id), item.item_id, 1, Utc::now())
            })
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));

        let listing = storage
            .transact(|writes| {
                create_listing(writes, &policy, Some(owner.user_id), item.item_id, 5_000, Utc::now())
            })
            .unwrap();
        assert_eq!(storage.listing_for_item(item.item_id).unwrap(), Some(listing.listing_id));

        let err = storage
            .transact(|writes| {
                create_listing(writes, &policy, Some(owner.user_id), item.item_id, 6_000, Utc::now())
            })
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn test_house_listing_requires_unowned_item() {
        let (storage, _temp) = test_storage();
        let owner = signup(&storage, 0);
        let owned = mint(&storage, Some(owner.user_id));
        let house = mint(&storage, None);
        let policy = ListingPolicy::default();

        assert!(storage
            .transact(|writes| create_listing(writes, &policy, None, owned.item_id, 5_000, Utc::now()))
            .is_err());
        let listing = storage
            .transact(|writes| create_listing(writes, &policy, None, house.item_id, 5_000, Utc::now()))
            .unwrap();
        assert_eq!(listing.seller_id, None);
    }

    #[test]
    fn test_cancel_listing_cascades() {
        let (storage, _temp) = test_storage();
        let owner = signup(&storage, 0);
        let buyer = signup(&storage, 0);
        let item = mint(&storage, Some(owner.user_id));
        let policy = ListingPolicy::default();

        let listing = storage
            .transact(|writes| {
                create_listing(writes, &policy, Some(owner.user_id), item.item_id, 5_000, Utc::now())
            })
            .unwrap();
        storage
            .transact(|writes| {
                writes.put_cart_entry(&CartEntry {
                    buyer_id: buyer.user_id,
                    listing_id: listing.listing_id,
                    added_at: Utc::now(),
                })
            })
            .unwrap();

        let err = storage
            .transact(|writes| cancel_listing(writes, Some(buyer.user_id), listing.listing_id))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let removed = storage
            .transact(|writes| cancel_listing(writes, Some(owner.user_id), listing.listing_id))
            .unwrap();
        assert_eq!(removed, 1);
        assert!(storage.cart_entries(buyer.user_id).unwrap().is_empty());
        assert!(storage.listing_for_item(item.item_id).unwrap().is_none());
    }
}
