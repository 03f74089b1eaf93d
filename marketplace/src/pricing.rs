//! Pricing and funds validation
//!
//! Turns a resolved cart into a [`CheckoutPlan`], applying the checkout
//! policy in a fixed order: guest, empty, size, funds. The first failing
//! rule wins.

use crate::cart::ResolvedCartEntry;
use crate::config::CheckoutPolicy;
use crate::error::{Error, Result};
use ledger_store::{Credits, ItemId, ListingId, User, UserId};
use serde::Serialize;

/// One purchased item, priced and named at plan time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutLine {
    /// Listing being bought
    pub listing_id: ListingId,

    /// Price at plan time
    pub list_price: Credits,

    /// Item being bought
    pub item_id: ItemId,

    /// Item name snapshot
    pub item_name: String,

    /// Owner at plan time (`None` for house inventory)
    pub seller_id: Option<UserId>,

    /// Owner name snapshot
    pub seller_name: Option<String>,
}

/// Validated checkout, ready for the writer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutPlan {
    /// Buyer
    pub buyer_id: UserId,

    /// Buyer name snapshot
    pub buyer_name: String,

    /// Sum of line prices
    pub cart_total: Credits,

    /// Lines in cart order
    pub lines: Vec<CheckoutLine>,
}

/// Sum of list prices, `None` on overflow
pub fn cart_total(cart: &[ResolvedCartEntry]) -> Option<Credits> {
    cart.iter()
        .try_fold(0 as Credits, |sum, entry| sum.checked_add(entry.listing.list_price))
}

/// Funds validator
#[derive(Debug, Clone)]
pub struct FundsValidator {
    policy: CheckoutPolicy,
}

impl FundsValidator {
    /// Create new validator
    pub fn new(policy: CheckoutPolicy) -> Self {
        Self { policy }
    }

    /// Policy in force
    pub fn policy(&self) -> &CheckoutPolicy {
        &self.policy
    }

    /// Reject guests when guest checkout is disabled
    pub fn check_guest(&self, buyer: &User) -> Result<()> {
        if buyer.is_guest && !self.policy.allow_guest_checkout {
            return Err(Error::guest_not_allowed());
        }
        Ok(())
    }

    /// Validate the cart and build the plan
    pub fn validate(&self, buyer: &User, cart: &[ResolvedCartEntry]) -> Result<CheckoutPlan> {
        self.check_guest(buyer)?;

        if cart.is_empty() {
            return Err(Error::EmptyCart);
        }

        if cart.len() > self.policy.max_cart_items {
            return Err(Error::CartTooLarge {
                max: self.policy.max_cart_items,
            });
        }

        let total = cart_total(cart).ok_or(Error::InsufficientFunds)?;
        if total > buyer.balance {
            return Err(Error::InsufficientFunds);
        }

        let lines = cart
            .iter()
            .map(|entry| CheckoutLine {
                listing_id: entry.listing.listing_id,
                list_price: entry.listing.list_price,
                item_id: entry.item.item_id,
                item_name: entry.item.name.clone(),
                seller_id: entry.item.owner_id,
                seller_name: entry.seller_name().map(str::to_string),
            })
            .collect();

        Ok(CheckoutPlan {
            buyer_id: buyer.user_id,
            buyer_name: buyer.display_name().to_string(),
            cart_total: total,
            lines,
        })
    }
}
