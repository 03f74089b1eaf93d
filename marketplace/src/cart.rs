//! Cart manager
//!
//! Resolves a buyer's cart against current listings and validates cart
//! mutations. Reads work on any [`ReadView`]; mutations run inside a
//! [`WriteSet`] on the store writer.

use crate::config::CheckoutPolicy;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use ledger_store::{CartEntry, Item, Listing, ListingId, ReadView, User, UserId, WriteSet};
use serde::Serialize;

/// Cart entry joined with its listing, item and seller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedCartEntry {
    /// Stored entry
    pub entry: CartEntry,

    /// Listing the entry points at
    pub listing: Listing,

    /// Item on offer
    pub item: Item,

    /// Current owner (`None` for house inventory)
    pub seller: Option<User>,
}

impl ResolvedCartEntry {
    /// Seller name as shown to buyers
    pub fn seller_name(&self) -> Option<&str> {
        self.seller.as_ref().map(User::display_name)
    }
}

/// Buyer's cart in insertion order
///
/// Entries whose listing or item no longer exists are skipped.
pub fn get_cart<V: ReadView>(view: &V, buyer_id: UserId) -> Result<Vec<ResolvedCartEntry>> {
    let mut entries = view.cart_entries(buyer_id)?;
    entries.sort_by_key(|entry| entry.added_at);

    let mut resolved = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(listing) = view.listing(entry.listing_id)? else {
            continue;
        };
        let Some(item) = view.item(listing.item_id)? else {
            continue;
        };
        let seller = match item.owner_id {
            Some(owner_id) => view.user(owner_id)?,
            None => None,
        };
        resolved.push(ResolvedCartEntry {
            entry,
            listing,
            item,
            seller,
        });
    }

    Ok(resolved)
}

/// Known, permitted caller
pub(crate) fn authorize<V: ReadView>(
    view: &V,
    policy: &CheckoutPolicy,
    caller: UserId,
) -> Result<User> {
    let user = view.user(caller)?.ok_or_else(Error::unknown_user)?;
    if user.is_guest && !policy.allow_guest_checkout {
        return Err(Error::guest_not_allowed());
    }
    Ok(user)
}

/// Put a listing into the caller's cart
pub fn add_entry(
    writes: &mut WriteSet<'_>,
    policy: &CheckoutPolicy,
    buyer_id: UserId,
    listing_id: ListingId,
    now: DateTime<Utc>,
) -> Result<CartEntry> {
    authorize(&*writes, policy, buyer_id)?;

    let listing = writes
        .listing(listing_id)?
        .ok_or_else(|| Error::NotFound("Listing not found".to_string()))?;
    let item = writes
        .item(listing.item_id)?
        .ok_or_else(|| Error::NotFound("Item not found".to_string()))?;

    if item.owner_id == Some(buyer_id) {
        return Err(Error::SelfPurchase);
    }

    if writes.cart_entry(buyer_id, listing_id)?.is_some() {
        return Err(Error::Conflict("Item is already in your cart".to_string()));
    }

    let entry = CartEntry {
        buyer_id,
        listing_id,
        added_at: now,
    };
    writes.put_cart_entry(&entry)?;
    Ok(entry)
}

/// Take a listing out of the caller's cart
pub fn remove_entry(
    writes: &mut WriteSet<'_>,
    buyer_id: UserId,
    listing_id: ListingId,
) -> Result<()> {
    if !writes.remove_cart_entry(buyer_id, listing_id)? {
        return Err(Error::NotFound("Item is not in your cart".to_string()));
    }
    Ok(())
}
