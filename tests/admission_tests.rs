//! Flash-sale admission tests - concurrency and inventory lifecycle

use std::sync::Arc;
use std::thread;

use gatekeeper::Gatekeeper;
use gatekeeper::config::Config;
use gatekeeper::flashsale::InventoryStatus;
use pretty_assertions::assert_eq;

fn open_sale(item: &str, total: i64, limit: i64) -> Gatekeeper {
    let gk = Gatekeeper::local(Config::default());
    assert!(gk.flashsale_inventory_init(item, total, limit));
    assert!(gk.flashsale_enable(item, true));
    gk
}

#[test]
fn test_three_buyers_then_clamped_by_limit() {
    // GIVEN: 100 units, at most 10 per acquisition
    let gk = open_sale("X", 100, 10);

    // WHEN: three buyers ask for 10 at the same time
    let handles: Vec<_> = (0..3)
        .map(|_| {
            let gk = gk.clone();
            thread::spawn(move || gk.flashsale_acquire_quota("X", 10))
        })
        .collect();
    let confirmed: i64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

    // THEN: all three are served in full
    assert_eq!(confirmed, 30);
    assert_eq!(gk.flashsale_inventory_report("X").booked, 30);

    // AND: a larger request is clamped by the limit, not the remainder
    assert_eq!(gk.flashsale_acquire_quota("X", 15), 10);
    assert_eq!(gk.flashsale_inventory_report("X").booked, 40);
}

#[test]
fn test_no_oversell_under_contention() {
    // GIVEN: demand far above supply
    let gk = open_sale("hot", 250, 9);
    let workers = 48;
    let rounds = 20;

    // WHEN: every worker keeps buying
    let handles: Vec<_> = (0..workers)
        .map(|i| {
            let gk = gk.clone();
            thread::spawn(move || {
                (0..rounds)
                    .map(|r| gk.flashsale_acquire_quota("hot", 1 + (i + r) % 12))
                    .sum::<i64>()
            })
        })
        .collect();
    let confirmed: i64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

    // THEN: exactly the inventory was sold, never more
    let report = gk.flashsale_inventory_report("hot");
    assert_eq!(confirmed, 250);
    assert_eq!(report.booked, 250);
    assert_eq!(report.remaining, 0);
    assert_eq!(gk.flashsale_acquire_quota("hot", 1), 0);
}

#[test]
fn test_concurrent_acquire_and_revoke_stay_in_bounds() {
    let gk = open_sale("churn", 50, 5);

    let buyers: Vec<_> = (0..8)
        .map(|_| {
            let gk = gk.clone();
            thread::spawn(move || {
                let mut held = 0;
                for _ in 0..200 {
                    held += gk.flashsale_acquire_quota("churn", 3);
                    if held > 0 {
                        gk.flashsale_revoke_quota("churn", 1);
                        held -= 1;
                    }
                }
                held
            })
        })
        .collect();
    let held: i64 = buyers.into_iter().map(|h| h.join().unwrap()).sum();

    let report = gk.flashsale_inventory_report("churn");
    assert!(report.booked >= 0 && report.booked <= report.total);
    assert_eq!(report.booked, held);
}

#[test]
fn test_revoke_never_goes_negative() {
    let gk = open_sale("refund", 20, 10);
    assert_eq!(gk.flashsale_acquire_quota("refund", 4), 4);

    assert_eq!(gk.flashsale_revoke_quota("refund", 3), 1);
    assert_eq!(gk.flashsale_revoke_quota("refund", 100), 0);
    assert_eq!(gk.flashsale_inventory_report("refund").booked, 0);

    // Released units can be sold again
    assert_eq!(gk.flashsale_acquire_quota("refund", 10), 10);
}

#[test]
fn test_inventory_lifecycle() {
    let gk = Gatekeeper::local(Config::default());

    // Uninitialized: nothing admitted, report is empty
    assert_eq!(
        gk.flashsale_inventory_report("sku").status,
        InventoryStatus::Uninitialized
    );
    assert_eq!(gk.flashsale_acquire_quota("sku", 1), 0);
    assert!(!gk.flashsale_enable("sku", true));

    // Disabled after init
    assert!(gk.flashsale_inventory_init("sku", 10, 2));
    assert!(!gk.flashsale_inventory_init("sku", 99, 99));
    assert_eq!(
        gk.flashsale_inventory_report("sku").status,
        InventoryStatus::Disabled
    );
    assert_eq!(gk.flashsale_acquire_quota("sku", 1), 0);

    // Enabled, then paused with the booked count intact
    assert!(gk.flashsale_enable("sku", true));
    assert_eq!(gk.flashsale_acquire_quota("sku", 2), 2);
    assert!(gk.flashsale_enable("sku", false));
    assert_eq!(gk.flashsale_acquire_quota("sku", 2), 0);
    let paused = gk.flashsale_inventory_report("sku");
    assert_eq!(paused.status, InventoryStatus::Disabled);
    assert_eq!(paused.booked, 2);

    // Explicit reset is the only way back
    assert!(gk.flashsale_inventory_reset("sku"));
    assert!(!gk.flashsale_inventory_reset("sku"));
    assert!(gk.flashsale_inventory_init("sku", 99, 99));
    assert_eq!(gk.flashsale_inventory_report("sku").booked, 0);
}

#[test]
fn test_independent_items_do_not_share_counters() {
    let gk = Arc::new(open_sale("a", 5, 5));
    assert!(gk.flashsale_inventory_init("b", 5, 5));
    assert!(gk.flashsale_enable("b", true));

    assert_eq!(gk.flashsale_acquire_quota("a", 5), 5);
    assert_eq!(gk.flashsale_acquire_quota("a", 1), 0);
    assert_eq!(gk.flashsale_acquire_quota("b", 3), 3);
}
