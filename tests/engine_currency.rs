//! Currency decisions against an in-memory tracker.

mod common;

use aisummary::engine::{CurrencyCheck, UnlabeledPolicy, last_summary_update};
use aisummary::util::time::epoch_floor;
use common::fixtures::{at, record};
use common::{BOT_NAME, Harness, LEGACY_BOT_NAME, test_config, test_log};

const FIELD: &str = "Status Summary";

#[test]
fn no_own_writes_means_epoch_floor() {
    let _log = test_log("no_own_writes_means_epoch_floor");
    let h = Harness::new(vec![
        record("A-1", "Epic")
            .labeled()
            .change("Alice", at(5), FIELD)
            .build(),
    ]);
    let issue = h.issue("A-1");
    assert_eq!(last_summary_update(&h.engine, &issue).unwrap(), epoch_floor());
}

#[test]
fn last_update_takes_latest_own_summary_write() {
    let _log = test_log("last_update_takes_latest_own_summary_write");
    let h = Harness::new(vec![
        record("A-1", "Epic")
            .labeled()
            .change(BOT_NAME, at(5), FIELD)
            .change(BOT_NAME, at(20), "labels")
            .change(LEGACY_BOT_NAME, at(10), FIELD)
            .change("Alice", at(30), FIELD)
            .build(),
    ]);
    let issue = h.issue("A-1");
    assert_eq!(last_summary_update(&h.engine, &issue).unwrap(), at(10));
}

#[test]
fn issue_changed_after_our_write_is_not_current() {
    let _log = test_log("issue_changed_after_our_write_is_not_current");
    let h = Harness::new(vec![
        record("A-1", "Epic")
            .labeled()
            .updated(at(11))
            .change(BOT_NAME, at(10), FIELD)
            .build(),
        record("A-2", "Epic")
            .labeled()
            .updated(at(10))
            .change(BOT_NAME, at(10), FIELD)
            .build(),
    ]);
    let mut check = CurrencyCheck::new(&h.engine);
    assert!(!check.is_current(&h.issue("A-1")).unwrap());
    assert!(check.is_current(&h.issue("A-2")).unwrap());
}

#[test]
fn child_change_makes_parent_out_of_date() {
    let _log = test_log("child_change_makes_parent_out_of_date");
    let h = Harness::new(vec![
        record("A-1", "Epic")
            .labeled()
            .updated(at(10))
            .change(BOT_NAME, at(10), FIELD)
            .build(),
        record("A-2", "Story").epic("A-1").updated(at(15)).build(),
        record("A-3", "Epic")
            .labeled()
            .updated(at(10))
            .change(BOT_NAME, at(10), FIELD)
            .build(),
        record("A-4", "Story").epic("A-3").updated(at(9)).build(),
    ]);
    let mut check = CurrencyCheck::new(&h.engine);
    assert!(!check.is_current(&h.issue("A-1")).unwrap());
    assert!(check.is_current(&h.issue("A-3")).unwrap());
}

#[test]
fn unlabeled_issue_follows_policy() {
    let _log = test_log("unlabeled_issue_follows_policy");
    let records = || {
        vec![
            record("A-1", "Task")
                .updated(at(1))
                .change(BOT_NAME, at(10), FIELD)
                .build(),
        ]
    };

    let regenerate = Harness::new(records());
    assert_eq!(
        regenerate.engine.config.unlabeled_policy,
        UnlabeledPolicy::Regenerate
    );
    assert!(
        !CurrencyCheck::new(&regenerate.engine)
            .is_current(&regenerate.issue("A-1"))
            .unwrap()
    );

    let mut config = test_config();
    config.unlabeled_policy = UnlabeledPolicy::AlwaysCurrent;
    let always = Harness::with_config(records(), config);
    assert!(
        CurrencyCheck::new(&always.engine)
            .is_current(&always.issue("A-1"))
            .unwrap()
    );
}

#[test]
fn forget_reevaluates_after_a_write() {
    let _log = test_log("forget_reevaluates_after_a_write");
    let h = Harness::new(vec![
        record("A-1", "Epic").labeled().updated(at(5)).build(),
    ]);
    let mut check = CurrencyCheck::new(&h.engine);
    assert!(!check.is_current(&h.issue("A-1")).unwrap());

    let issue = h.issue("A-1");
    issue
        .update_status_summary(&h.engine.cache, "fresh text")
        .unwrap();
    // Memoized until forgotten
    assert!(!check.is_current(&h.issue("A-1")).unwrap());
    check.forget(&issue.key);
    assert!(check.is_current(&h.issue("A-1")).unwrap());
}
