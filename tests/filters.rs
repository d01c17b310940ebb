mod common;

use chrono_tz::{America, Pacific};
use common::{admin, Fixture};
use pretty_assertions::assert_eq;
use tracker_query::query::SortDirection;
use tracker_query::{Actor, EntityKind, Query};

#[test]
fn status_operators() {
    let f = Fixture::new();
    assert_eq!(f.filtered("status_id", "o", &[], admin()), vec![1, 2, 4, 5, 6]);
    assert_eq!(f.filtered("status_id", "c", &[], admin()), vec![3]);
    assert_eq!(f.filtered("status_id", "=", &["2"], admin()), vec![2, 6]);
    // a negated list keeps rows without a value
    assert_eq!(f.filtered("status_id", "!", &["1"], admin()), vec![2, 3, 6, 7]);
}

#[test]
fn list_and_integer_fields() {
    let f = Fixture::new();
    assert_eq!(f.filtered("tracker_id", "=", &["2"], admin()), vec![2, 5]);
    assert_eq!(f.filtered("priority_id", "=", &["4", "6"], admin()), vec![1, 3, 5, 7]);
    assert_eq!(f.filtered("category_id", "!*", &[], admin()), vec![2, 4, 5, 6, 7]);
    assert_eq!(f.filtered("fixed_version_id", "=", &["2"], admin()), vec![1]);
    assert_eq!(f.filtered("done_ratio", "=", &["30"], admin()), vec![2]);
    assert_eq!(f.filtered("done_ratio", ">=", &["50"], admin()), vec![3, 6]);
    assert_eq!(f.filtered("issue_id", "=", &["1,3"], admin()), vec![1, 3]);
    assert_eq!(f.filtered("is_private", "=", &["1"], admin()), vec![6]);
}

#[test]
fn float_comparisons_and_presence() {
    let f = Fixture::new();
    assert_eq!(f.filtered("estimated_hours", ">=", &["3"], admin()), vec![1, 6]);
    assert_eq!(f.filtered("estimated_hours", "><", &["1", "2"], admin()), vec![2, 4]);
    assert_eq!(f.filtered("estimated_hours", "=", &["1.1"], admin()), vec![2]);
    assert_eq!(f.filtered("estimated_hours", "!*", &[], admin()), vec![3, 5, 7]);
}

#[test]
fn text_matching_is_case_insensitive_and_escaped() {
    let f = Fixture::new();
    assert_eq!(f.filtered("subject", "~", &["RECIPE"], admin()), vec![1, 3]);
    assert_eq!(f.filtered("subject", "^", &["issue"], admin()), vec![4, 7]);
    assert_eq!(f.filtered("subject", "$", &["project"], admin()), vec![4]);
    assert_eq!(f.filtered("description", "!*", &[], admin()), vec![4, 5, 6, 7]);
    // `!~` keeps rows with no value
    assert_eq!(f.filtered("description", "!~", &["recipe"], admin()), vec![3, 4, 5, 6, 7]);
    // a literal percent only matches a percent
    assert_eq!(f.filtered("cf_1", "~", &["%"], admin()), vec![2]);
    assert_eq!(f.filtered("attachment", "~", &["%"], admin()), vec![3]);
    assert_eq!(f.filtered("attachment", "~", &["_"], admin()), vec![3]);
}

#[test]
fn date_operators() {
    let f = Fixture::new();
    assert_eq!(f.filtered("due_date", "t", &[], admin()), vec![1]);
    assert_eq!(f.filtered("due_date", "t+", &["0"], admin()), vec![1]);
    assert_eq!(f.filtered("due_date", "nd", &[], admin()), Vec::<i64>::new());
    assert_eq!(f.filtered("due_date", ">=", &["2011-07-11"], admin()), vec![2]);
    assert_eq!(f.filtered("due_date", "><t+", &["2"], admin()), vec![1, 2]);
    assert_eq!(f.filtered("due_date", "<t+", &["2"], admin()), vec![1, 2]);
    assert_eq!(f.filtered("due_date", "!*", &[], admin()), vec![3, 4, 5, 6, 7]);
    assert_eq!(f.filtered("start_date", "lw", &[], admin()), vec![1]);
    assert_eq!(f.filtered("start_date", "w", &[], admin()), Vec::<i64>::new());
    assert_eq!(f.filtered("start_date", "m", &[], admin()), vec![1]);
    assert_eq!(f.filtered("created_on", ">t-", &["3"], admin()), vec![7]);
    assert_eq!(f.filtered("created_on", "t-", &["4"], admin()), vec![6]);
    assert_eq!(f.filtered("updated_on", "t", &[], admin()), vec![2]);
    assert_eq!(f.filtered("updated_on", "ld", &[], admin()), vec![1]);
    assert_eq!(f.filtered("closed_on", "*", &[], admin()), vec![3]);
}

#[test]
fn day_boundaries_follow_the_actor_time_zone() {
    let f = Fixture::new();
    let utc = admin();
    let auckland = Actor::admin(1).with_time_zone(Pacific::Auckland);
    let new_york = Actor::admin(1).with_time_zone(America::New_York);

    assert_eq!(f.filtered("updated_on", "=", &["2011-07-10"], utc.clone()), vec![2]);
    // 2011-07-10 in Auckland ends at 11:59:59 UTC
    assert_eq!(
        f.filtered("updated_on", "=", &["2011-07-10"], auckland.clone()),
        Vec::<i64>::new()
    );
    assert_eq!(f.filtered("updated_on", "=", &["2011-07-11"], auckland), vec![2]);
    assert_eq!(f.filtered("updated_on", "=", &["2011-07-09"], new_york), vec![1]);
    // plain dates are calendar days whatever the zone
    assert_eq!(f.filtered("due_date", "=", &["2011-07-10"], utc), vec![1]);
}

#[test]
fn people_filters() {
    let f = Fixture::new();
    let jsmith = Actor::user(2);
    let dlopper = Actor::user(3);
    // `me` on the assignee also covers the actor's groups
    assert_eq!(f.filtered("assigned_to_id", "=", &["me"], jsmith.clone()), vec![2, 5]);
    assert_eq!(f.filtered("assigned_to_id", "!*", &[], admin()), vec![3, 7]);
    assert_eq!(f.filtered("author_id", "=", &["me"], dlopper.clone()), vec![2, 5, 6]);
    assert_eq!(f.filtered("watcher_id", "=", &["me"], jsmith), vec![2, 4]);
    assert_eq!(f.filtered("watcher_id", "!", &["3"], admin()), vec![2, 3, 4, 5, 6, 7]);
    assert_eq!(f.filtered("member_of_group", "=", &["10"], admin()), vec![1, 2, 4, 5, 6]);
    assert_eq!(f.filtered("member_of_group", "!*", &[], admin()), vec![3, 7]);
    assert_eq!(f.filtered("assigned_to_role", "=", &["1"], admin()), vec![2]);
    assert_eq!(f.filtered("assigned_to_role", "=", &["2"], admin()), vec![1, 5, 6]);
    assert_eq!(f.filtered("assigned_to_role", "!", &["2"], admin()), vec![2, 3, 4, 7]);
}

#[test]
fn journal_authors_respect_private_notes() {
    let f = Fixture::new();
    let outsider = Actor::user(4);
    assert_eq!(f.filtered("updated_by", "=", &["3"], admin()), vec![1, 2]);
    assert_eq!(f.filtered("updated_by", "=", &["3"], Actor::user(2)), vec![1, 2]);
    assert_eq!(f.filtered("updated_by", "=", &["3"], outsider.clone()), vec![1]);

    assert_eq!(f.filtered("last_updated_by", "=", &["3"], admin()), vec![1, 2]);
    assert_eq!(f.filtered("last_updated_by", "=", &["2"], admin()), Vec::<i64>::new());
    // the private note is skipped, the earlier journal becomes the last one
    assert_eq!(f.filtered("last_updated_by", "=", &["3"], outsider.clone()), vec![1]);
    assert_eq!(f.filtered("last_updated_by", "=", &["2"], outsider), vec![2]);
}

#[test]
fn relation_types() {
    let f = Fixture::new();
    assert_eq!(f.filtered("blocks", "=", &["1"], admin()), vec![6]);
    assert_eq!(f.filtered("blocked", "=", &["6"], admin()), vec![1]);
    assert_eq!(f.filtered("blocks", "*", &[], admin()), vec![6]);
    assert_eq!(f.filtered("blocks", "!*", &[], admin()), vec![1, 2, 3, 4, 5, 7]);
    assert_eq!(f.filtered("duplicates", "=", &["1"], admin()), vec![3]);
    assert_eq!(f.filtered("duplicated", "=", &["3"], admin()), vec![1]);
    assert_eq!(f.filtered("precedes", "*", &[], admin()), vec![5]);
    assert_eq!(f.filtered("follows", "*", &[], admin()), vec![2]);
    assert_eq!(f.filtered("relates", "*", &[], admin()), vec![1, 2, 6, 7]);
}

#[test]
fn relation_project_and_open_operators() {
    let f = Fixture::new();
    assert_eq!(f.filtered("relates", "=p", &["1"], admin()), vec![1, 2, 6, 7]);
    assert_eq!(f.filtered("relates", "=!p", &["1"], admin()), Vec::<i64>::new());
    assert_eq!(f.filtered("relates", "!p", &["1"], admin()), vec![3, 4, 5]);
    // issue 6 is only related to an issue without a status
    assert_eq!(f.filtered("relates", "*o", &[], admin()), vec![1, 2, 7]);
    assert_eq!(f.filtered("relates", "!o", &[], admin()), vec![3, 4, 5, 6]);
}

#[test]
fn tree_filters() {
    let f = Fixture::new();
    assert_eq!(f.filtered("parent_id", "=", &["1"], admin()), vec![3]);
    assert_eq!(f.filtered("parent_id", "*", &[], admin()), vec![3]);
    assert_eq!(f.filtered("child_id", "=", &["3"], admin()), vec![1]);
    assert_eq!(f.filtered("child_id", "*", &[], admin()), vec![1]);
    assert_eq!(f.filtered("child_id", "!*", &[], admin()), vec![2, 3, 4, 5, 6, 7]);
}

#[test]
fn custom_field_filters() {
    let f = Fixture::new();
    // issue 2 carries a value, but the field is not enabled on its tracker
    assert_eq!(f.filtered("cf_2", "=", &["MySQL"], admin()), vec![1, 6]);
    assert_eq!(f.filtered("cf_2", "!", &["MySQL"], admin()), vec![2, 3, 4, 5, 7]);
    assert_eq!(f.filtered("cf_1", "~", &["foo"], admin()), vec![2]);
    assert_eq!(f.filtered("cf_1", "!*", &[], admin()), vec![3, 4, 5, 6, 7]);
    assert_eq!(f.filtered("cf_3", ">=", &["5"], admin()), vec![2]);
    assert_eq!(f.filtered("cf_3", "<=", &["5"], admin()), vec![1]);
    assert_eq!(f.filtered("cf_3", "><", &["1", "20"], admin()), vec![1, 2]);
    assert_eq!(f.filtered("cf_10", ">=", &["5"], admin()), vec![2, 6]);
    assert_eq!(f.filtered("cf_4", "=", &["b"], admin()), vec![1, 2]);
    assert_eq!(f.filtered("cf_4", "=", &["a", "c"], admin()), vec![1, 3]);
    assert_eq!(f.filtered("cf_4", "!", &["b"], admin()), vec![3, 4, 5, 6, 7]);
}

#[test]
fn custom_fields_use_distinct_joins() {
    let f = Fixture::new();
    let mut query = Query::new(EntityKind::Issue);
    query.add_filter("cf_1", "~", ["125"]);
    query.add_filter("cf_3", ">=", ["2"]);
    assert_eq!(f.ids(&query, admin()), vec![1]);

    // one value of each field has to match on its own row
    let mut query = Query::new(EntityKind::Issue);
    query.add_filter("cf_1", "~", ["foo"]);
    query.add_filter("cf_3", "<=", ["5"]);
    assert_eq!(f.ids(&query, admin()), Vec::<i64>::new());
}

#[test]
fn association_chains() {
    let f = Fixture::new();
    assert_eq!(f.filtered("fixed_version.status", "=", &["open"], admin()), vec![2]);
    assert_eq!(f.filtered("fixed_version.due_date", "<=", &["2011-07-10"], admin()), vec![1]);
    assert_eq!(f.filtered("project.cf_7", "~", &["stab"], admin()), vec![1, 2, 3, 6, 7]);
    assert_eq!(f.filtered("author.cf_8", "~", &["9876"], admin()), vec![2, 5, 6]);
    assert_eq!(f.filtered("assigned_to.cf_8", "~", &["1234"], admin()), vec![2]);
    assert_eq!(f.filtered("fixed_version.cf_9", "~", &["eagle"], admin()), vec![1]);
}

#[test]
fn referenced_custom_field_chains() {
    let f = Fixture::new();
    assert_eq!(f.filtered("cf_5.status", "=", &["open"], admin()), vec![1]);
    assert_eq!(f.filtered("cf_5.due_date", "<=", &["2011-07-10"], admin()), vec![2]);
    assert_eq!(f.filtered("cf_5.cf_9", "~", &["fal"], admin()), vec![1]);
    assert_eq!(f.filtered("cf_11.cf_8", "~", &["1234"], admin()), vec![1]);
}

#[test]
fn sorting_appends_id_tie_breaker() {
    let f = Fixture::new();
    let engine = f.engine();
    let context = common::ctx(admin());

    let mut query = Query::new(EntityKind::Issue);
    query.set_sort_criteria([("priority", SortDirection::Desc)]);
    let ids = engine
        .results(&f.storage, &query, &context, None, None)
        .unwrap();
    assert_eq!(ids, vec![3, 6, 4, 2, 7, 5, 1]);

    // values that are not numbers sort with the missing ones
    query.set_sort_criteria([("cf_3", SortDirection::Asc)]);
    let ids = engine
        .results(&f.storage, &query, &context, None, None)
        .unwrap();
    assert_eq!(ids, vec![7, 6, 5, 4, 3, 1, 2]);

    query.set_sort_criteria([("id", SortDirection::Asc)]);
    let ids = engine
        .results(&f.storage, &query, &context, Some(1), Some(3))
        .unwrap();
    assert_eq!(ids, vec![2, 3, 4]);
}

#[test]
fn grouped_results_come_group_first() {
    let f = Fixture::new();
    let engine = f.engine();
    let mut query = Query::new(EntityKind::Issue);
    query.group_by = Some("tracker".into());
    let ids = engine
        .results(&f.storage, &query, &common::ctx(admin()), None, None)
        .unwrap();
    assert_eq!(ids, vec![6, 4, 3, 1, 5, 2, 7]);
}

#[test]
fn text_matching_keeps_non_ascii_letters() {
    let f = Fixture::new();
    f.storage
        .execute_batch("UPDATE issues SET subject = 'Éclair recipe' WHERE id = 7;")
        .unwrap();
    assert_eq!(f.filtered("subject", "~", &["Éclair"], admin()), vec![7]);
    assert_eq!(f.filtered("subject", "~", &["ÉCLAIR"], admin()), vec![7]);
    assert_eq!(f.filtered("subject", "^", &["Écl"], admin()), vec![7]);
    assert_eq!(f.filtered("subject", "!~", &["Éclair"], admin()), vec![1, 2, 3, 4, 5, 6]);
}

