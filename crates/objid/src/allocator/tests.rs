use crate::{
    AllocationRequest, AppId, ConsumptionSet, FreeIds, ObjectId, Range, RangeAllocation,
    RangeError, RangeSet, TypeRequest, allocate, first_available, next_available,
    next_available_per_range,
};
use proptest::prelude::*;

fn set(pairs: &[(u32, u32)]) -> RangeSet {
    RangeSet::new(
        pairs
            .iter()
            .map(|&(from, to)| Range::new(from, to))
            .collect::<Vec<_>>(),
    )
    .unwrap()
}

#[test]
fn empty_consumption_returns_first_from() {
    let allocation = next_available(&set(&[(50000, 50099)]), &[], 1);
    assert_eq!(allocation.ids, vec![50000]);
    assert!(allocation.success);
}

#[test]
fn fully_consumed_range_fails() {
    let consumed: Vec<ObjectId> = (50000..=50099).collect();
    let allocation = next_available(&set(&[(50000, 50099)]), &consumed, 1);
    assert!(allocation.ids.is_empty());
    assert!(!allocation.success);
}

#[test]
fn moves_on_to_next_range() {
    let allocation = next_available(&set(&[(1, 5), (10, 15)]), &[1, 2, 3, 4, 5], 1);
    assert_eq!(allocation.ids, vec![10]);
    assert!(allocation.success);
}

#[test]
fn fills_gaps_in_order() {
    let allocation = next_available(&set(&[(1, 10)]), &[1, 3, 4, 7], 4);
    assert_eq!(allocation.ids, vec![2, 5, 6, 8]);
    assert!(allocation.success);
}

#[test]
fn ignores_consumed_ids_outside_ranges() {
    let allocation = next_available(&set(&[(100, 102)]), &[1, 50, 100, 500], 2);
    assert_eq!(allocation.ids, vec![101, 102]);
}

#[test]
fn partial_success_keeps_what_was_found() {
    let allocation = next_available(&set(&[(1, 3), (8, 9)]), &[2, 9], 5);
    assert_eq!(allocation.ids, vec![1, 3, 8]);
    assert!(!allocation.success);
}

#[test]
fn zero_count_trivially_succeeds() {
    let allocation = next_available(&set(&[(1, 3)]), &[1, 2, 3], 0);
    assert!(allocation.ids.is_empty());
    assert!(allocation.success);
}

#[test]
fn touching_ranges_do_not_yield_duplicates() {
    let allocation = next_available(&set(&[(1, 3), (3, 5)]), &[], 10);
    assert_eq!(allocation.ids, vec![1, 2, 3, 4, 5]);
    assert!(!allocation.success);
}

#[test]
fn handles_top_of_id_space() {
    let top = ObjectId::MAX;
    let allocation = next_available(&set(&[(top - 2, top)]), &[top - 1], 3);
    assert_eq!(allocation.ids, vec![top - 2, top]);
    assert!(!allocation.success);
}

#[test]
fn first_available_signals_exhaustion_with_none() {
    let ranges = set(&[(7, 8)]);
    assert_eq!(first_available(&ranges, &[7]), Some(8));
    assert_eq!(first_available(&ranges, &[7, 8]), None);
}

#[test]
fn scans_large_spans_linearly() {
    let ranges = set(&[(1, 200_000)]);
    let consumed: Vec<ObjectId> = (1..200_000).collect();
    assert_eq!(next_available(&ranges, &consumed, 1).ids, vec![200_000]);
}

#[test]
fn per_range_allocates_in_every_range() {
    let found = next_available_per_range(&set(&[(10, 12), (1, 3)]), &[1, 10, 11, 12], 2);
    assert_eq!(
        found,
        vec![
            RangeAllocation {
                range: Range::new(1, 3),
                ids: vec![2, 3],
                success: true
            },
            RangeAllocation {
                range: Range::new(10, 12),
                ids: vec![],
                success: false
            },
        ]
    );
}

#[test]
fn free_ids_within_single_range() {
    let range = Range::new(20, 25);
    let free: Vec<_> = FreeIds::within(&range, &[1, 21, 22, 30]).collect();
    assert_eq!(free, vec![20, 23, 24, 25]);
}

#[test]
fn request_allocates_each_type_against_its_consumption() {
    let request = AllocationRequest {
        app_id: AppId::from("app"),
        ranges: vec![Range::new(50010, 50019), Range::new(50000, 50009)],
        per_type: vec![
            TypeRequest::new("table", 2),
            TypeRequest::new("page", 1).per_range(),
        ],
    };
    let consumption = ConsumptionSet::from_unsorted([
        ("table", vec![50000, 50001]),
        ("page", vec![50000, 50010]),
    ]);

    let response = request.execute(&consumption).unwrap();
    assert_eq!(response.app_id, AppId::from("app"));
    assert_eq!(response.results.len(), 3);

    let table = &response.results[0];
    assert_eq!(table.range, None);
    assert_eq!(table.ids, vec![50002, 50003]);
    assert!(table.success);

    assert_eq!(response.results[1].range, Some(Range::new(50000, 50009)));
    assert_eq!(response.results[1].ids, vec![50001]);
    assert_eq!(response.results[2].range, Some(Range::new(50010, 50019)));
    assert_eq!(response.results[2].ids, vec![50011]);
}

#[test]
fn request_with_invalid_ranges_is_rejected() {
    let request = AllocationRequest {
        app_id: AppId::from("app"),
        ranges: vec![Range::new(0, 10)],
        per_type: vec![TypeRequest::new("table", 1)],
    };
    assert_eq!(
        request.execute(&ConsumptionSet::new()),
        Err(RangeError::ZeroBoundary { index: 0 })
    );
}

#[test]
fn allocate_leaves_consumption_untouched() {
    let ranges = set(&[(1, 5)]);
    let consumption = ConsumptionSet::from_unsorted([("enum", vec![1])]);
    let before = consumption.clone();
    let requests = [TypeRequest::new("enum", 1), TypeRequest::new("enum", 1)];

    let results = allocate(&ranges, &requests, &consumption);
    assert_eq!(results[0].ids, vec![2]);
    assert_eq!(results[1].ids, vec![2]);
    assert_eq!(consumption, before);
}

#[cfg(feature = "serde")]
#[test]
fn request_and_response_use_wire_names() {
    use serde_json::json;

    let request: AllocationRequest = serde_json::from_value(json!({
        "appId": "app",
        "ranges": [{"from": 50000, "to": 50099}],
        "perType": [{"type": "codeunit"}, {"type": "table", "count": 2, "perRange": true}]
    }))
    .unwrap();
    assert_eq!(request.per_type[0].count, 1);
    assert!(!request.per_type[0].per_range);
    assert!(request.per_type[1].per_range);

    let response = request.execute(&ConsumptionSet::new()).unwrap();
    assert_eq!(
        serde_json::to_value(&response).unwrap(),
        json!({
            "appId": "app",
            "results": [
                {"type": "codeunit", "range": null, "ids": [50000], "success": true},
                {"type": "table", "range": {"from": 50000, "to": 50099}, "ids": [50000, 50001], "success": true}
            ]
        })
    );
}

fn arb_ranges() -> impl Strategy<Value = RangeSet> {
    prop::collection::vec((1..50u32, 0..20u32), 1..5).prop_map(|parts| {
        let mut next = 1;
        let ranges: Vec<Range> = parts
            .into_iter()
            .map(|(gap, len)| {
                let from = next + gap;
                next = from + len + 1;
                Range::new(from, from + len)
            })
            .collect();
        RangeSet::new(ranges).unwrap()
    })
}

proptest! {
    #[test]
    fn allocated_ids_are_free_in_range_and_ascending(
        ranges in arb_ranges(),
        raw in prop::collection::vec(1..400u32, 0..100),
        count in 0..60usize,
    ) {
        let mut consumed = raw;
        consumed.sort_unstable();
        consumed.dedup();

        let allocation = next_available(&ranges, &consumed, count);
        prop_assert!(allocation.ids.len() <= count);
        prop_assert_eq!(allocation.success, allocation.ids.len() == count);
        prop_assert!(allocation.ids.windows(2).all(|pair| pair[0] < pair[1]));
        for id in &allocation.ids {
            prop_assert!(ranges.contains(*id));
            prop_assert!(consumed.binary_search(id).is_err());
        }
    }

    #[test]
    fn scan_matches_naive_filter(
        ranges in arb_ranges(),
        raw in prop::collection::vec(1..400u32, 0..100),
    ) {
        let mut consumed = raw;
        consumed.sort_unstable();
        consumed.dedup();

        let naive: Vec<ObjectId> = ranges
            .iter()
            .flat_map(|range| range.from..=range.to)
            .filter(|id| !consumed.contains(id))
            .collect();
        let scanned: Vec<ObjectId> = FreeIds::new(&ranges, &consumed).collect();
        prop_assert_eq!(scanned, naive);
    }
}
