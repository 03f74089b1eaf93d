//! Property-based tests for marketplace invariants
//!
//! Random trade sequences between a handful of users must preserve:
//! - Conservation: credits only move between users, the house absorbs
//!   payments for system-owned items
//! - Single ownership: every item has exactly the owner its history names
//! - History chain: at most one open record per item, and it is the latest

use marketplace::{Config, ErrorKind, Marketplace, NewItem, NewUser};
use ledger_store::{Credits, Item, User};
use proptest::prelude::*;

const USERS: usize = 4;
const ITEMS: usize = 5;
const START_BALANCE: Credits = 20_000;

/// One step of a random trading session
#[derive(Debug, Clone)]
enum Step {
    /// Owner of `item` lists it at `price` (house lists if unowned)
    List { item: usize, price: Credits },
    /// `buyer` carts the listing of `item`, if any
    Cart { buyer: usize, item: usize },
    /// `buyer` checks out
    Checkout { buyer: usize },
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0..ITEMS, 1_000u64..8_000).prop_map(|(item, price)| Step::List { item, price }),
        (0..USERS, 0..ITEMS).prop_map(|(buyer, item)| Step::Cart { buyer, item }),
        (0..USERS).prop_map(|buyer| Step::Checkout { buyer }),
    ]
}

async fn setup(temp_dir: &tempfile::TempDir) -> (Marketplace, Vec<User>, Vec<Item>) {
    let mut config = Config::default();
    config.store.data_dir = temp_dir.path().to_path_buf();
    config.store.rocksdb.sync_writes = false;
    config.checkout.max_cart_items = 3;
    let market = Marketplace::open(config).await.unwrap();

    let mut users = Vec::new();
    for index in 0..USERS {
        let user = market
            .create_user(NewUser {
                name: Some(format!("trader-{}", index)),
                email: format!("trader{}@example.com", index),
                is_guest: false,
                initial_balance: START_BALANCE,
            })
            .await
            .unwrap();
        users.push(user);
    }

    let mut items = Vec::new();
    for index in 0..ITEMS {
        // Even items start with a user, odd items with the house
        let owner_id = (index % 2 == 0).then(|| users[index % USERS].user_id);
        let item = market
            .mint_item(NewItem {
                name: format!("planet-{}", index),
                size: index as u32,
                category: "random".to_string(),
                owner_id,
            })
            .await
            .unwrap();
        items.push(item);
    }

    (market, users, items)
}

async fn run_steps(market: &Marketplace, users: &[User], items: &[Item], steps: &[Step]) -> Credits {
    let mut house_revenue: Credits = 0;

    for step in steps {
        match step {
            Step::List { item, price } => {
                let item_id = items[*item].item_id;
                let current = market.get_item(item_id).unwrap().unwrap();
                let _ = match current.owner_id {
                    Some(owner) => market.create_listing(owner, item_id, *price).await,
                    None => market.create_house_listing(item_id, *price).await,
                };
            }
            Step::Cart { buyer, item } => {
                let item_id = items[*item].item_id;
                if let Some(listing) = market.active_listing(item_id).unwrap() {
                    let _ = market
                        .add_item_to_cart(users[*buyer].user_id, listing.listing_id)
                        .await;
                }
            }
            Step::Checkout { buyer } => {
                let buyer_id = users[*buyer].user_id;
                let cart = market.get_cart_items(buyer_id).unwrap();
                let house_part: Credits = cart
                    .iter()
                    .filter(|entry| entry.item.owner_id.is_none())
                    .map(|entry| entry.listing.list_price)
                    .sum();

                match market.checkout_cart(buyer_id).await {
                    Ok(_) => house_revenue += house_part,
                    Err(err) => assert!(
                        !err.is_internal(),
                        "checkout failed internally: {:?}",
                        err
                    ),
                }
            }
        }
    }

    house_revenue
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Property: credits are conserved and every chain stays valid
    #[test]
    fn prop_trading_preserves_invariants(steps in prop::collection::vec(step_strategy(), 1..40)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let temp_dir = tempfile::tempdir().unwrap();
            let (market, users, items) = setup(&temp_dir).await;

            let house_revenue = run_steps(&market, &users, &items, &steps).await;

            let total: Credits = users
                .iter()
                .map(|user| market.get_user(user.user_id).unwrap().unwrap().balance)
                .sum();
            prop_assert_eq!(total + house_revenue, START_BALANCE * USERS as Credits);

            for report in market.verify_all_chains().unwrap() {
                prop_assert!(report.is_valid(), "broken chain: {:?}", report);
            }

            for item in &items {
                let current = market.get_item(item.item_id).unwrap().unwrap();
                let history = market.ownership_history(item.item_id).unwrap();
                let open = history.iter().filter(|record| record.end_date.is_none()).count();
                prop_assert!(open <= 1);
                if let Some(last) = history.last() {
                    prop_assert_eq!(Some(last.buyer_id), current.owner_id);
                }
            }

            market.shutdown().await.unwrap();
            Ok(())
        })?;
    }

    /// Property: a failed checkout leaves balances untouched
    #[test]
    fn prop_rejected_checkout_changes_nothing(price in 1_000u64..50_000) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let temp_dir = tempfile::tempdir().unwrap();
            let (market, users, items) = setup(&temp_dir).await;
            let buyer = &users[1];

            let listing = market
                .create_house_listing(items[1].item_id, price)
                .await
                .unwrap();
            market
                .add_item_to_cart(buyer.user_id, listing.listing_id)
                .await
                .unwrap();

            let result = market.checkout_cart(buyer.user_id).await;
            let after = market.get_user(buyer.user_id).unwrap().unwrap().balance;

            if price <= START_BALANCE {
                prop_assert!(result.is_ok());
                prop_assert_eq!(after, START_BALANCE - price);
            } else {
                prop_assert_eq!(result.unwrap_err().kind(), ErrorKind::InsufficientFunds);
                prop_assert_eq!(after, START_BALANCE);
                prop_assert!(market.ownership_history(items[1].item_id).unwrap().is_empty());
            }

            market.shutdown().await.unwrap();
            Ok(())
        })?;
    }
}
