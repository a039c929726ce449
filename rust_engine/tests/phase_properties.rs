use glam::Vec3;
use mocap_engine::modules::{KeyedChannels, PhaseFunction, PhaseKey};
use mocap_engine::Hierarchy;
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum PhaseEdit {
    Key(usize, Option<PhaseKey>),
    Phase(usize, f32),
}

fn phase_key() -> impl Strategy<Value = Option<PhaseKey>> {
    prop_oneof![
        Just(None),
        Just(Some(PhaseKey::In)),
        Just(Some(PhaseKey::Out)),
        Just(Some(PhaseKey::Boundary)),
    ]
}

fn phase_edit(frames: usize) -> impl Strategy<Value = PhaseEdit> {
    prop_oneof![
        (0..=frames + 1, phase_key()).prop_map(|(f, k)| PhaseEdit::Key(f, k)),
        (0..=frames + 1, -2.0f32..2.0).prop_map(|(f, v)| PhaseEdit::Phase(f, v)),
    ]
}

/// 参考实现：恰好一个根且每个骨骼沿父链能到达根
fn is_tree(parents: &[Option<usize>]) -> bool {
    if parents.iter().filter(|p| p.is_none()).count() != 1 {
        return false;
    }
    (0..parents.len()).all(|start| {
        let mut current = start;
        for _ in 0..=parents.len() {
            match parents[current] {
                None => return true,
                Some(parent) => current = parent,
            }
        }
        false
    })
}

proptest! {
    #[test]
    fn phase_local_and_full_recompute_agree(
        edits in prop::collection::vec(phase_edit(30), 0..40)
    ) {
        let mut function = PhaseFunction::new(30);
        for edit in &edits {
            match *edit {
                PhaseEdit::Key(frame, key) => function.set_key(frame, key),
                PhaseEdit::Phase(frame, value) => function.set_phase(frame, value),
            }
        }
        let local = function.phase().to_vec();
        function.interpolate_all();
        prop_assert_eq!(function.phase(), local.as_slice());
        prop_assert!(function.is_key(1));
        prop_assert!(function.is_key(30));
    }

    #[test]
    fn phase_stays_in_unit_range_between_in_and_out(
        a in 2usize..15,
        b in 16usize..29,
        start in 0.0f32..5.0,
    ) {
        let mut function = PhaseFunction::new(30);
        function.set_key(a, Some(PhaseKey::In));
        function.set_key(b, Some(PhaseKey::Out));
        function.set_phase(a, start);
        for frame in a + 1..b {
            let phase = function.phase_at(frame);
            prop_assert!((0.0..=1.0).contains(&phase));
        }
        for frame in (1..a).chain(b + 1..=30) {
            prop_assert_eq!(function.phase_at(frame), 0.0);
        }
    }

    #[test]
    fn hierarchy_accepts_exactly_the_trees(
        parents in prop::collection::vec(prop::option::weighted(0.9, 0usize..12), 1..12)
    ) {
        let count = parents.len();
        let parents: Vec<Option<usize>> = parents.into_iter().map(|p| p.map(|p| p % count)).collect();
        let parts = parents
            .iter()
            .enumerate()
            .map(|(i, p)| (format!("Bone{}", i), *p, Vec3::Y));
        let result = Hierarchy::from_parts(parts);
        prop_assert_eq!(result.is_ok(), is_tree(&parents));

        if let Ok(hierarchy) = result {
            let root = hierarchy.roots().next().unwrap();
            let mut reached = hierarchy.subtree(root);
            reached.sort_unstable();
            prop_assert_eq!(reached, (0..count).collect::<Vec<_>>());
            for i in 0..count {
                prop_assert!(!hierarchy.is_ancestor(i, i));
            }
        }
    }

    #[test]
    fn keyed_values_are_linear_between_keys(
        a in 2usize..20,
        gap in 2usize..20,
        va in -1.0f32..1.0,
        vb in -1.0f32..1.0,
    ) {
        let b = a + gap;
        let mut channels = KeyedChannels::new(50, &["A"]);
        channels.toggle_key(a);
        channels.toggle_key(b);
        channels.set_value("A", a, va);
        channels.set_value("A", b, vb);

        for frame in a..=b {
            let weight = (frame - a) as f32 / gap as f32;
            let expected = (1.0 - weight) * va + weight * vb;
            let value = channels.value("A", frame).unwrap();
            prop_assert!((value - expected).abs() < 1e-6);
        }
    }
}
