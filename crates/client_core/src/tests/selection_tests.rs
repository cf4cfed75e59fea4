use super::*;

fn selection_of(ids: &[&'static str]) -> SelectionSet<&'static str> {
    let mut selection = SelectionSet::new();
    for id in ids {
        selection.toggle_one(id);
    }
    selection
}

fn subsets(universe: &[&'static str]) -> Vec<Vec<&'static str>> {
    (0..1u32 << universe.len())
        .map(|mask| {
            universe
                .iter()
                .enumerate()
                .filter(|(bit, _)| mask & (1u32 << *bit) != 0)
                .map(|(_, id)| *id)
                .collect()
        })
        .collect()
}

#[test]
fn header_state_matches_intersection_for_every_subset_pair() {
    let universe = ["a", "b", "c", "d"];
    for visible in subsets(&universe) {
        for picked in subsets(&universe) {
            let selection = selection_of(&picked);
            let state = header_checkbox_state(visible.iter(), &selection);

            let hits = visible.iter().filter(|id| picked.contains(*id)).count();
            assert_eq!(
                state.checked,
                !visible.is_empty() && hits == visible.len(),
                "visible={visible:?} picked={picked:?}"
            );
            assert_eq!(
                state.indeterminate,
                hits > 0 && hits < visible.len(),
                "visible={visible:?} picked={picked:?}"
            );
            assert!(!(state.checked && state.indeterminate));
        }
    }
}

#[test]
fn empty_visible_set_is_never_checked() {
    let selection = selection_of(&["a"]);
    let visible: [&str; 0] = [];
    assert_eq!(
        header_checkbox_state(visible.iter(), &selection),
        HeaderCheckboxState::default()
    );
}

#[test]
fn indeterminate_then_checked_then_cleared() {
    let visible = ["a", "b", "c"];
    let mut selection = selection_of(&["a", "b"]);
    assert_eq!(
        header_checkbox_state(visible.iter(), &selection),
        HeaderCheckboxState {
            checked: false,
            indeterminate: true,
        }
    );

    assert!(selection.toggle_one(&"c"));
    assert_eq!(
        header_checkbox_state(visible.iter(), &selection),
        HeaderCheckboxState {
            checked: true,
            indeterminate: false,
        }
    );

    selection.toggle_all(visible.iter());
    assert!(selection.is_empty());
}

#[test]
fn toggle_all_twice_from_empty_round_trips() {
    let visible = ["a", "b", "c"];
    let mut selection = SelectionSet::new();
    selection.toggle_all(visible.iter());
    assert_eq!(selection.len(), 3);
    selection.toggle_all(visible.iter());
    assert!(selection.is_empty());
}

#[test]
fn toggle_all_replaces_stale_invisible_picks() {
    let mut selection = selection_of(&["x", "a"]);
    let visible = ["a", "b"];
    selection.toggle_all(visible.iter());
    let ids: Vec<_> = selection.iter().copied().collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[test]
fn toggle_all_clears_when_all_visible_selected_even_with_extras() {
    let mut selection = selection_of(&["a", "b", "x"]);
    selection.toggle_all(["a", "b"].iter());
    assert!(selection.is_empty());
}

#[test]
fn toggle_all_on_empty_visible_clears() {
    let mut selection = selection_of(&["a"]);
    let visible: [&str; 0] = [];
    selection.toggle_all(visible.iter());
    assert!(selection.is_empty());
}

#[test]
fn toggle_one_twice_is_a_no_op() {
    for start in subsets(&["a", "b"]) {
        let original = selection_of(&start);
        let mut selection = original.clone();
        selection.toggle_one(&"a");
        selection.toggle_one(&"a");
        assert_eq!(selection, original);
    }
}

#[test]
fn retain_prunes_missing_ids() {
    let mut selection = selection_of(&["a", "b", "c"]);
    selection.retain(|id| *id != "b");
    let ids: Vec<_> = (&selection).into_iter().copied().collect();
    assert_eq!(ids, vec!["a", "c"]);
    selection.clear();
    assert!(selection.is_empty());
}
