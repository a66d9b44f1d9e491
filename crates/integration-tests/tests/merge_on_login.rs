//! Merge-on-login scenarios: a guest collection found at startup for an
//! authenticated user ends up in the account collection, exactly once, and
//! the guest key is cleared only after the merged state is durable.

use faithline_core::{ProductId, UserId};
use faithline_sync::store::LocalStore;
use faithline_sync::{LoadState, StorageBackend};
use rust_decimal::Decimal;

use faithline_integration_tests::{
    Harness, line_item, wishlist_entry,
};

#[tokio::test]
async fn test_cart_merge_adds_quantities_for_shared_products() {
    faithline_integration_tests::init_tracing();
    let harness = Harness::new();
    let user = UserId::generate();
    let shared = ProductId::generate();
    let guest_only = ProductId::generate();

    // The account already holds 2 of the shared product.
    let mut account_session = harness.cart();
    harness.handle.resolve_authenticated(user);
    account_session.init().await;
    account_session
        .add(faithline_integration_tests::cart_input(shared, 2, 4900))
        .await
        .expect("seed account cart");
    drop(account_session);

    // Meanwhile a guest cart was left behind on this machine.
    harness.seed_guest_cart(&[
        line_item(shared, 3, 4900),
        line_item(guest_only, 1, 1800),
    ]);

    // Next page load: authenticated with a non-empty guest cart.
    let mut cart = harness.cart();
    cart.init().await;

    assert_eq!(cart.state(), LoadState::Ready);
    assert_eq!(cart.backend(), StorageBackend::Account(user));
    assert_eq!(cart.unique_count(), 2);
    assert_eq!(cart.item_count(), 6);
    assert_eq!(harness.local.get("cart"), None, "guest key cleared");

    let rows = harness.cart_store.rows();
    assert_eq!(rows.len(), 2);
    let shared_row = rows
        .iter()
        .find(|row| row.product_id == shared)
        .expect("shared row");
    assert_eq!(shared_row.quantity, 5);
}

#[tokio::test]
async fn test_cart_merge_is_not_repeated_on_next_load() {
    let harness = Harness::new();
    let user = UserId::generate();
    let product = ProductId::generate();

    harness.seed_guest_cart(&[line_item(product, 2, 5900)]);
    harness.handle.resolve_authenticated(user);

    let mut first_load = harness.cart();
    first_load.init().await;
    assert_eq!(first_load.item_count(), 2);
    drop(first_load);

    // The guest key is gone, so a reload just reads the account collection.
    let mut second_load = harness.cart();
    second_load.init().await;
    assert_eq!(second_load.item_count(), 2);
    assert_eq!(harness.cart_store.rows().len(), 1);
}

#[tokio::test]
async fn test_cart_merge_fallback_preserves_guest_items() {
    let harness = Harness::new();
    let user = UserId::generate();
    let product = ProductId::generate();

    harness.seed_guest_cart(&[line_item(product, 2, 3200)]);
    harness.handle.resolve_authenticated(user);

    // The bulk merge save cannot even read the remote rows; the engine
    // replays the guest items through the normal add path instead.
    harness.cart_store.fail_next_list();
    let mut cart = harness.cart();
    cart.init().await;

    assert_eq!(cart.item_count(), 2);
    assert_eq!(harness.local.get("cart"), None);
    assert_eq!(harness.cart_store.rows().len(), 1);
}

#[tokio::test]
async fn test_wishlist_merge_unions_without_duplicates() {
    let harness = Harness::new();
    let user = UserId::generate();
    let shared = ProductId::generate();
    let guest_only = ProductId::generate();

    let mut account_session = harness.wishlist();
    harness.handle.resolve_authenticated(user);
    account_session.init().await;
    account_session
        .toggle(faithline_integration_tests::wishlist_input(shared, 5400))
        .await
        .expect("seed account wishlist");
    drop(account_session);

    harness.seed_guest_wishlist(&[
        wishlist_entry(shared, 5400),
        wishlist_entry(guest_only, 2100),
    ]);

    let mut wishlist = harness.wishlist();
    wishlist.init().await;

    assert_eq!(wishlist.len(), 2, "shared product deduplicated");
    assert!(wishlist.contains(shared));
    assert!(wishlist.contains(guest_only));
    assert_eq!(harness.local.get("wishlist"), None);
    assert_eq!(harness.wishlist_store.rows().len(), 2);
}

#[tokio::test]
async fn test_merge_replay_keeps_failed_items_in_memory() {
    let harness = Harness::new();
    let user = UserId::generate();
    let product = ProductId::generate();

    harness.seed_guest_cart(&[line_item(product, 1, 2500)]);
    harness.handle.resolve_authenticated(user);

    // Every path into the remote store fails: the bulk merge and then the
    // per-item replay. The replay still clears the key, but only after the
    // failed items were logged; the in-memory cart keeps them.
    harness.cart_store.fail_next_list();
    harness.cart_store.fail_all_inserts(true);
    let mut cart = harness.cart();
    cart.init().await;

    // In-memory state holds the guest item even though the remote store
    // refused it; nothing was silently dropped from the session.
    assert_eq!(cart.item_count(), 1);
    harness.cart_store.fail_all_inserts(false);
}

#[tokio::test(start_paused = true)]
async fn test_unresolved_identity_times_out_into_guest_mode() {
    let harness = Harness::new();
    let product = ProductId::generate();
    harness.seed_guest_cart(&[line_item(product, 1, 999)]);

    // The identity provider never answers; paused time runs the wait budget
    // out instantly and the engine proceeds as a guest.
    let mut cart = harness.cart();
    cart.init().await;

    assert_eq!(cart.state(), LoadState::Ready);
    assert_eq!(cart.backend(), StorageBackend::Guest);
    assert_eq!(cart.item_count(), 1);
    assert!(harness.local.get("cart").is_some(), "guest cart untouched");
}

#[tokio::test]
async fn test_sign_out_resets_both_engines_to_guest() {
    let harness = Harness::new();
    let user = UserId::generate();
    harness.handle.resolve_authenticated(user);

    let mut cart = harness.cart();
    let mut wishlist = harness.wishlist();
    cart.init().await;
    wishlist.init().await;

    let product = ProductId::generate();
    cart.add(faithline_integration_tests::cart_input(product, 1, 7500))
        .await
        .expect("add");
    wishlist
        .toggle(faithline_integration_tests::wishlist_input(product, 7500))
        .await
        .expect("toggle");

    harness.handle.resolve_anonymous();
    cart.reset_to_guest();
    wishlist.reset_to_guest();

    assert_eq!(cart.unique_count(), 0);
    assert!(wishlist.is_empty());
    assert_eq!(harness.local.get("cart"), None);
    assert_eq!(harness.local.get("wishlist"), None);
    // The account rows are untouched for the next sign-in.
    assert_eq!(harness.cart_store.rows().len(), 1);
    assert_eq!(harness.wishlist_store.rows().len(), 1);

    let total: Decimal = cart.total();
    assert_eq!(total, Decimal::ZERO);
}
