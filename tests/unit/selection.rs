use pgfixture::error::FixtureError;
use pgfixture::resources::ScriptResource;
use pgfixture::selector::{SelectionPolicy, select_scripts};
use rstest::rstest;

fn pool(names: &[&str]) -> Vec<ScriptResource> {
    names
        .iter()
        .map(|name| ScriptResource::new(*name, format!("-- {}", name)))
        .collect()
}

fn selected_names(all: &[ScriptResource], inclusions: &[&str]) -> Vec<String> {
    select_scripts(all, inclusions, SelectionPolicy::Strict)
        .unwrap()
        .iter()
        .map(|script| script.name().to_string())
        .collect()
}

#[rstest]
#[case::all_present(&["A", "B", "C"], &["C", "A", "B"], &["00000-C", "00001-A", "00002-B"])]
#[case::unknown_skipped_without_gap(&["A", "B"], &["A", "missing", "B"], &["00000-A", "00001-B"])]
#[case::empty_inclusions(&["A", "B"], &[], &[])]
#[case::empty_pool(&[], &["A"], &[])]
#[case::unlisted_never_deployed(&["A", "B", "C"], &["B"], &["00000-B"])]
fn test_selection(
    #[case] available: &[&str],
    #[case] inclusions: &[&str],
    #[case] expected: &[&str],
) {
    assert_eq!(selected_names(&pool(available), inclusions), expected);
}

#[test]
fn test_prefixes_are_contiguous_and_sortable() {
    let names: Vec<String> = (0..120).map(|i| format!("Script{}", i)).collect();
    let all: Vec<ScriptResource> = names
        .iter()
        .map(|name| ScriptResource::new(name.clone(), ""))
        .collect();

    let selected = select_scripts(&all, &names, SelectionPolicy::Strict).unwrap();
    assert_eq!(selected.len(), 120);
    for (i, script) in selected.iter().enumerate() {
        assert_eq!(script.ordinal(), i);
        assert_eq!(script.prefix().len(), 5);
        assert_eq!(script.source_name(), names[i]);
    }

    let mut sorted: Vec<&str> = selected.iter().map(|s| s.name()).collect();
    sorted.sort();
    let in_order: Vec<&str> = selected.iter().map(|s| s.name()).collect();
    assert_eq!(sorted, in_order);
}

#[test]
fn test_strict_rejects_duplicate_scripts() {
    let mut all = pool(&["A", "B"]);
    all.push(ScriptResource::new("A", "-- second A"));

    let err = select_scripts(&all, &["A"], SelectionPolicy::Strict).unwrap_err();
    assert!(matches!(err, FixtureError::DuplicateName { .. }));
    assert_eq!(err.to_string(), "Duplicate script name 'A'");
}

#[test]
fn test_permissive_last_write_wins() {
    let mut all = pool(&["A", "B"]);
    all.push(ScriptResource::new("A", "-- second A"));

    let selected = select_scripts(&all, &["A", "B", "A"], SelectionPolicy::Permissive).unwrap();
    let names: Vec<&str> = selected.iter().map(|s| s.name()).collect();
    assert_eq!(names, vec!["00000-A", "00001-B", "00002-A"]);
    assert_eq!(selected[0].content(), "-- second A");
    assert_eq!(selected[2].content(), "-- second A");
}
