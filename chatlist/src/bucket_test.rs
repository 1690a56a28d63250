use super::*;
use chrono::FixedOffset;
use uuid::Uuid;

fn utc(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw).expect("timestamp").with_timezone(&Utc)
}

fn conversation(title: &str, updated_at: &str) -> Conversation {
    let ts = utc(updated_at);
    Conversation {
        id: Uuid::new_v4(),
        title: Some(title.to_owned()),
        user_id: Uuid::nil(),
        created_at: ts,
        updated_at: ts,
    }
}

fn titles(group: &PeriodGroup<Conversation>) -> Vec<&str> {
    group
        .conversations
        .iter()
        .map(|c| c.title.as_deref().unwrap_or_default())
        .collect()
}

fn periods<T>(groups: &[PeriodGroup<T>]) -> Vec<Period> {
    groups.iter().map(|group| group.period).collect()
}

// =============================================================================
// Period
// =============================================================================

#[test]
fn labels_match_sidebar_headings() {
    let labels: Vec<&str> = Period::ALL.iter().map(|p| p.label()).collect();
    assert_eq!(
        labels,
        [
            "Today",
            "Yesterday",
            "Last 7 days",
            "Last month",
            "Last 3 months",
            "Last 6 months",
            "Older",
        ]
    );
}

#[test]
fn all_is_in_declaration_order() {
    let mut sorted = Period::ALL;
    sorted.sort();
    assert_eq!(sorted, Period::ALL);
    assert_eq!(Period::LastSevenDays.to_string(), "Last 7 days");
}

// =============================================================================
// Boundaries
// =============================================================================

#[test]
fn boundaries_are_local_midnights() {
    let now = utc("2026-03-15T14:30:00Z");
    let b = Boundaries::at(&now);
    assert_eq!(b.today.to_string(), "2026-03-15 00:00:00");
    assert_eq!(b.yesterday.to_string(), "2026-03-14 00:00:00");
    assert_eq!(b.last_week.to_string(), "2026-03-08 00:00:00");
    assert_eq!(b.last_month.to_string(), "2026-02-15 00:00:00");
    assert_eq!(b.last_three_months.to_string(), "2025-12-15 00:00:00");
    assert_eq!(b.last_six_months.to_string(), "2025-09-15 00:00:00");
}

#[test]
fn month_subtraction_clamps_to_shorter_month() {
    let now = utc("2026-03-31T10:00:00Z");
    let b = Boundaries::at(&now);
    assert_eq!(b.last_month.to_string(), "2026-02-28 00:00:00");
    assert_eq!(b.last_six_months.to_string(), "2025-09-30 00:00:00");
}

// =============================================================================
// group_by_period
// =============================================================================

#[test]
fn empty_input_yields_no_groups() {
    let groups = group_by_period(Vec::<Conversation>::new(), &utc("2026-03-15T14:00:00Z"));
    assert!(groups.is_empty());
}

#[test]
fn midnight_today_is_today() {
    let now = utc("2026-03-15T14:00:00Z");
    let groups = group_by_period(vec![conversation("edge", "2026-03-15T00:00:00Z")], &now);
    assert_eq!(periods(&groups), [Period::Today]);
}

#[test]
fn just_before_midnight_is_yesterday() {
    let now = utc("2026-03-15T14:00:00Z");
    let groups = group_by_period(vec![conversation("edge", "2026-03-14T23:59:59.999999Z")], &now);
    assert_eq!(periods(&groups), [Period::Yesterday]);
}

#[test]
fn two_hours_and_ten_days_ago() {
    let now = utc("2026-03-15T14:00:00Z");
    let items = vec![
        conversation("recent", "2026-03-15T12:00:00Z"),
        conversation("older", "2026-03-05T14:00:00Z"),
    ];
    let groups = group_by_period(items, &now);
    assert_eq!(periods(&groups), [Period::Today, Period::LastMonth]);
    assert_eq!(titles(&groups[0]), ["recent"]);
    assert_eq!(titles(&groups[1]), ["older"]);
}

#[test]
fn every_bucket_reachable() {
    let now = utc("2026-03-15T14:00:00Z");
    let items = vec![
        conversation("older", "2025-01-01T00:00:00Z"),
        conversation("six", "2025-10-01T00:00:00Z"),
        conversation("three", "2026-01-10T00:00:00Z"),
        conversation("month", "2026-02-20T00:00:00Z"),
        conversation("week", "2026-03-10T00:00:00Z"),
        conversation("yesterday", "2026-03-14T08:00:00Z"),
        conversation("today", "2026-03-15T08:00:00Z"),
    ];
    let groups = group_by_period(items, &now);
    assert_eq!(periods(&groups), Period::ALL);
    let flat: Vec<&str> = groups.iter().flat_map(titles).collect();
    assert_eq!(flat, ["today", "yesterday", "week", "month", "three", "six", "older"]);
}

#[test]
fn future_timestamps_count_as_today() {
    let now = utc("2026-03-15T14:00:00Z");
    let groups = group_by_period(vec![conversation("skew", "2026-03-16T01:00:00Z")], &now);
    assert_eq!(periods(&groups), [Period::Today]);
}

#[test]
fn input_order_is_kept_within_a_bucket() {
    let now = utc("2026-03-15T14:00:00Z");
    let items = vec![
        conversation("b", "2026-03-15T09:00:00Z"),
        conversation("x", "2026-03-01T09:00:00Z"),
        conversation("a", "2026-03-15T13:00:00Z"),
        conversation("c", "2026-03-15T10:00:00Z"),
    ];
    let groups = group_by_period(items, &now);
    assert_eq!(titles(&groups[0]), ["b", "a", "c"]);
    assert_eq!(titles(&groups[1]), ["x"]);
}

#[test]
fn every_item_lands_in_exactly_one_bucket() {
    let now = utc("2026-03-15T14:00:00Z");
    let items: Vec<Conversation> = (0..400)
        .map(|day| {
            let ts = now - chrono::Duration::hours(day * 13);
            conversation(&day.to_string(), &ts.to_rfc3339())
        })
        .collect();
    let groups = group_by_period(items.clone(), &now);
    let total: usize = groups.iter().map(|g| g.conversations.len()).sum();
    assert_eq!(total, items.len());
    assert!(groups.windows(2).all(|pair| pair[0].period < pair[1].period));
}

#[test]
fn grouping_uses_the_timezone_of_now() {
    let instant = utc("2026-03-14T20:00:00Z");
    let item = conversation("evening", "2026-03-14T18:30:00Z");

    let in_utc = group_by_period(vec![item.clone()], &instant);
    assert_eq!(periods(&in_utc), [Period::Today]);

    let plus_five = FixedOffset::east_opt(5 * 3600).unwrap();
    let in_plus_five = group_by_period(vec![item], &instant.with_timezone(&plus_five));
    assert_eq!(periods(&in_plus_five), [Period::Yesterday]);
}

#[test]
fn grouping_is_deterministic_for_same_now() {
    let now = utc("2026-03-15T14:00:00Z");
    let items = vec![
        conversation("a", "2026-03-15T12:00:00Z"),
        conversation("b", "2025-11-01T12:00:00Z"),
    ];
    assert_eq!(group_by_period(items.clone(), &now), group_by_period(items, &now));
}

#[test]
fn groups_borrowed_items() {
    let now = utc("2026-03-15T14:00:00Z");
    let items = [conversation("a", "2026-03-15T12:00:00Z")];
    let groups = group_by_period(items.iter(), &now);
    assert_eq!(groups[0].conversations[0].title.as_deref(), Some("a"));
}
