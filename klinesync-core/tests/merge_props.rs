use klinesync_core::{Kline, Series, merge_batches, merge_series};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn kline(open_time: i64, close: f64) -> Kline {
    Kline {
        open_time,
        open: close,
        high: close,
        low: close,
        close,
        volume: 1.0,
        close_time: open_time + 899_999,
        quote_volume: close,
        trade_count: 1,
        taker_buy_base_volume: 0.5,
        taker_buy_quote_volume: close / 2.0,
    }
}

fn arb_kline() -> impl Strategy<Value = Kline> {
    (0i64..500, 0u32..10_000).prop_map(|(slot, px)| kline(slot * 900_000, f64::from(px)))
}

fn arb_series() -> impl Strategy<Value = Series> {
    proptest::collection::vec(arb_kline(), 0..120).prop_map(Series::from_unsorted)
}

fn strictly_ascending(s: &Series) -> bool {
    s.klines().windows(2).all(|w| w[0].open_time < w[1].open_time)
}

proptest! {
    #[test]
    fn empty_is_identity(s in arb_series()) {
        prop_assert_eq!(merge_series(s.clone(), &Series::new()), s.clone());
        prop_assert_eq!(merge_series(Series::new(), &s), s);
    }

    #[test]
    fn merged_is_sorted_and_unique(a in arb_series(), b in arb_series()) {
        let m = merge_series(a, &b);
        prop_assert!(strictly_ascending(&m));
    }

    #[test]
    fn merge_is_idempotent(a in arb_series(), b in arb_series()) {
        let once = merge_series(a, &b);
        let twice = merge_series(once.clone(), &b);
        prop_assert_eq!(&twice, &once);
        prop_assert_eq!(merge_series(once.clone(), &once), once);
    }

    #[test]
    fn incoming_wins_on_conflict(a in arb_series(), b in arb_series()) {
        let incoming: BTreeMap<i64, Kline> = b.iter().map(|k| (k.open_time, *k)).collect();
        let existing: BTreeMap<i64, Kline> = a.iter().map(|k| (k.open_time, *k)).collect();
        let m = merge_series(a, &b);
        for k in &m {
            let expected = incoming.get(&k.open_time).or_else(|| existing.get(&k.open_time));
            prop_assert_eq!(Some(k), expected);
        }
        let keys: std::collections::BTreeSet<i64> =
            existing.keys().chain(incoming.keys()).copied().collect();
        prop_assert_eq!(m.len(), keys.len());
    }

    #[test]
    fn incremental_merges_converge_to_one_backfill(
        batches in proptest::collection::vec(proptest::collection::vec(arb_kline(), 0..40), 0..6)
    ) {
        let mut acc = Series::new();
        for b in &batches {
            acc = merge_series(acc, &Series::from_unsorted(b.clone()));
        }
        prop_assert_eq!(acc, merge_batches(batches));
    }
}

#[test]
fn merge_example_overwrites_shared_row() {
    let existing = Series::from_unsorted(vec![kline(100, 1.0)]);
    let incoming = Series::from_unsorted(vec![kline(100, 2.0), kline(200, 1.0)]);
    let merged = merge_series(existing, &incoming);
    assert_eq!(merged.klines(), &[kline(100, 2.0), kline(200, 1.0)]);
}

#[test]
fn later_batches_win_inside_a_backfill() {
    let merged = merge_batches(vec![
        vec![kline(0, 1.0), kline(900_000, 1.0)],
        vec![kline(900_000, 7.0), kline(1_800_000, 1.0)],
    ]);
    assert_eq!(merged.len(), 3);
    assert!((merged.klines()[1].close - 7.0).abs() < f64::EPSILON);
}

#[test]
fn from_sorted_unique_rejects_duplicates() {
    assert!(Series::from_sorted_unique(vec![kline(0, 1.0), kline(0, 2.0)]).is_err());
    assert!(Series::from_sorted_unique(vec![kline(5, 1.0), kline(1, 2.0)]).is_err());
    assert!(Series::from_sorted_unique(vec![kline(1, 1.0), kline(5, 2.0)]).is_ok());
}
