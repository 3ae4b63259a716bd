use super::*;
use proptest::prelude::*;
use std::fs;
use tempfile::TempDir;

fn var(name: &str) -> Formula {
    Formula::var(name)
}

fn range(from: usize, to: usize) -> LineRange {
    LineRange::new(from, to).unwrap()
}

/// Writes `len` numbered lines ("line 1" .. "line len") to `root/path`.
fn write_numbered(root: &Path, path: &str, len: usize) {
    let full = root.join(path);
    if let Some(dir) = full.parent() {
        fs::create_dir_all(dir).unwrap();
    }
    let content: String = (1..=len).map(|i| format!("line {}\n", i)).collect();
    fs::write(full, content).unwrap();
}

fn read_lines(root: &Path, path: &str) -> Vec<String> {
    fs::read_to_string(root.join(path))
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

/// 10-line file with "A" over [3,10] nesting "B" over [5,7]; the variant
/// selects A but not B.
fn example_tree() -> (ArtefactTree, NodeId, NodeId, NodeId) {
    let mut tree = ArtefactTree::new("spl");
    let file = tree
        .add_file(tree.root(), "src/example.c", Formula::True, 10)
        .unwrap();
    let a = tree
        .insert_annotation(file, var("A"), range(3, 10), AnnotationStyle::External)
        .unwrap();
    let b = tree
        .insert_annotation(file, var("B"), range(5, 7), AnnotationStyle::External)
        .unwrap();
    (tree, file, a, b)
}

fn select_a_not_b() -> Variant {
    Variant::new(
        "a-only",
        Formula::and([var("A"), Formula::not(var("B"))]),
    )
}

mod end_to_end {
    use super::*;

    #[test]
    fn derives_exactly_the_retained_lines() {
        let (tree, file, _, _) = example_tree();
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        write_numbered(source.path(), "src/example.c", 10);

        let mut ground = GroundTruth::new(ArtefactTree::new("variant"));
        let derived = project_file(
            &tree,
            file,
            &select_a_not_b(),
            source.path(),
            target.path(),
            &mut ground,
        )
        .unwrap();
        assert!(derived.is_some());

        let expected: Vec<String> = [1, 2, 3, 4, 8, 9, 10]
            .iter()
            .map(|i| format!("line {}", i))
            .collect();
        assert_eq!(read_lines(target.path(), "src/example.c"), expected);
    }

    #[test]
    fn excluded_block_is_absent_from_the_matching() {
        let (tree, file, a, b) = example_tree();
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        write_numbered(source.path(), "src/example.c", 10);

        let mut ground = GroundTruth::new(ArtefactTree::new("variant"));
        project_file(
            &tree,
            file,
            &select_a_not_b(),
            source.path(),
            target.path(),
            &mut ground,
        )
        .unwrap();

        let wrapper = tree.annotation_root(file).unwrap();
        assert!(ground.matching.derived(wrapper).is_some());
        assert!(ground.matching.derived(a).is_some());
        assert!(ground.matching.derived(b).is_none());
        assert_eq!(ground.matching.len(), 2);
    }

    #[test]
    fn derived_ranges_account_for_removed_lines() {
        let (tree, file, a, _) = example_tree();
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        write_numbered(source.path(), "src/example.c", 10);

        let mut ground = GroundTruth::new(ArtefactTree::new("variant"));
        project_file(
            &tree,
            file,
            &select_a_not_b(),
            source.path(),
            target.path(),
            &mut ground,
        )
        .unwrap();

        // Lines [5,7] vanish: A shrinks from [3,10] to [3,7], the file from
        // 10 lines to 7.
        let derived_a = ground.matching.derived(a).unwrap();
        assert_eq!(ground.variant_tree.annotation_range(derived_a), range(3, 7));

        let wrapper = tree.annotation_root(file).unwrap();
        let derived_wrapper = ground.matching.derived(wrapper).unwrap();
        assert_eq!(
            ground.variant_tree.annotation_range(derived_wrapper),
            range(1, 7)
        );
    }

    #[test]
    fn derived_blocks_are_external() {
        let (tree, file, a, _) = example_tree();
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        write_numbered(source.path(), "src/example.c", 10);

        let mut ground = GroundTruth::new(ArtefactTree::new("variant"));
        project_file(
            &tree,
            file,
            &select_a_not_b(),
            source.path(),
            target.path(),
            &mut ground,
        )
        .unwrap();

        let derived_a = ground.matching.derived(a).unwrap();
        assert_eq!(
            ground.variant_tree.annotation_style(derived_a),
            AnnotationStyle::External
        );
    }
}

mod internal_blocks {
    use super::*;

    /// 12-line file:
    /// ```text
    ///  1  code
    ///  2  #if A      <- annotation [2,5], Internal
    ///  3  code
    ///  4  code
    ///  5  #endif
    ///  6..12 code
    /// ```
    fn internal_tree() -> (ArtefactTree, NodeId, NodeId) {
        let mut tree = ArtefactTree::new("spl");
        let file = tree
            .add_file(tree.root(), "f.c", Formula::True, 12)
            .unwrap();
        let a = tree
            .insert_annotation(file, var("A"), range(2, 5), AnnotationStyle::Internal)
            .unwrap();
        (tree, file, a)
    }

    #[test]
    fn directive_lines_never_reach_the_variant() {
        let (tree, file, a) = internal_tree();
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        write_numbered(source.path(), "f.c", 12);

        let mut ground = GroundTruth::new(ArtefactTree::new("variant"));
        project_file(
            &tree,
            file,
            &Variant::new("with-a", var("A")),
            source.path(),
            target.path(),
            &mut ground,
        )
        .unwrap();

        // Lines 2 and 5 are the directives; everything else survives.
        let expected: Vec<String> = [1, 3, 4, 6, 7, 8, 9, 10, 11, 12]
            .iter()
            .map(|i| format!("line {}", i))
            .collect();
        assert_eq!(read_lines(target.path(), "f.c"), expected);

        // The block's code [3,4] lands at [2,3] after the #if drops out.
        let derived_a = ground.matching.derived(a).unwrap();
        assert_eq!(ground.variant_tree.annotation_range(derived_a), range(2, 3));
    }

    #[test]
    fn excluding_an_internal_block_drops_its_whole_span() {
        let (tree, file, a) = internal_tree();
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        write_numbered(source.path(), "f.c", 12);

        let mut ground = GroundTruth::new(ArtefactTree::new("variant"));
        project_file(
            &tree,
            file,
            &Variant::new("without-a", Formula::not(var("A"))),
            source.path(),
            target.path(),
            &mut ground,
        )
        .unwrap();

        assert_eq!(read_lines(target.path(), "f.c").len(), 8);
        assert!(ground.matching.derived(a).is_none());
    }

    #[test]
    fn empty_directive_pair_derives_nothing() {
        let mut tree = ArtefactTree::new("spl");
        let file = tree.add_file(tree.root(), "f.c", Formula::True, 5).unwrap();
        // #if on line 2, #endif on line 3: no interior.
        let a = tree
            .insert_annotation(file, var("A"), range(2, 3), AnnotationStyle::Internal)
            .unwrap();
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        write_numbered(source.path(), "f.c", 5);

        let mut ground = GroundTruth::new(ArtefactTree::new("variant"));
        project_file(
            &tree,
            file,
            &Variant::new("with-a", var("A")),
            source.path(),
            target.path(),
            &mut ground,
        )
        .unwrap();

        assert_eq!(read_lines(target.path(), "f.c").len(), 3);
        assert!(ground.matching.derived(a).is_none());
    }
}

mod copy_selection {
    use super::*;

    #[test]
    fn gaps_around_children_belong_to_the_parent() {
        let (tree, file, _, _) = example_tree();
        let wrapper = tree.annotation_root(file).unwrap();
        let ranges = lines_to_copy(&tree, wrapper, &select_a_not_b()).unwrap();
        assert_eq!(ranges, vec![range(1, 2), range(3, 4), range(8, 10)]);
    }

    #[test]
    fn fully_selected_file_copies_every_line() {
        let (tree, file, _, _) = example_tree();
        let wrapper = tree.annotation_root(file).unwrap();
        let all = Variant::new("all", Formula::and([var("A"), var("B")]));
        let ranges = lines_to_copy(&tree, wrapper, &all).unwrap();
        let total: usize = ranges.iter().map(|r| r.len()).sum();
        assert_eq!(total, 10);
    }
}

mod whole_file_exclusion {
    use super::*;

    #[test]
    fn file_covered_by_an_excluded_block_derives_empty() {
        let mut tree = ArtefactTree::new("spl");
        let file = tree.add_file(tree.root(), "f.c", Formula::True, 3).unwrap();
        tree.insert_annotation(file, var("A"), range(1, 3), AnnotationStyle::External)
            .unwrap();

        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        write_numbered(source.path(), "f.c", 3);

        let mut ground = GroundTruth::new(ArtefactTree::new("variant"));
        let derived = project_file(
            &tree,
            file,
            &Variant::new("none", Formula::not(var("A"))),
            source.path(),
            target.path(),
            &mut ground,
        )
        .unwrap();

        assert!(derived.is_none());
        assert!(read_lines(target.path(), "f.c").is_empty());
        assert!(ground.matching.is_empty());
        assert_eq!(ground.derived_paths, vec!["f.c".to_string()]);
    }
}

mod tree_projection {
    use super::*;

    fn two_file_tree() -> ArtefactTree {
        let mut tree = ArtefactTree::new("spl");
        let kept = tree
            .add_file(tree.root(), "kept.c", Formula::True, 4)
            .unwrap();
        tree.insert_annotation(kept, var("A"), range(2, 3), AnnotationStyle::External)
            .unwrap();
        tree.add_file(tree.root(), "cond.c", var("B"), 2).unwrap();
        tree
    }

    #[test]
    fn file_condition_gates_whole_files() {
        let tree = two_file_tree();
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        write_numbered(source.path(), "kept.c", 4);
        write_numbered(source.path(), "cond.c", 2);

        let variant = Variant::new("a-not-b", Formula::and([var("A"), Formula::not(var("B"))]));
        let outcome = project_tree(
            &tree,
            &variant,
            source.path(),
            target.path(),
            &ProjectionConfig::default(),
        )
        .unwrap();

        assert_eq!(outcome.ground_truth.derived_paths, vec!["kept.c"]);
        assert!(target.path().join("kept.c").is_file());
        assert!(!target.path().join("cond.c").exists());
        assert!(outcome.failures.is_empty());
    }

    #[test]
    fn filter_excludes_files_independent_of_features() {
        let tree = two_file_tree();
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        write_numbered(source.path(), "kept.c", 4);
        write_numbered(source.path(), "cond.c", 2);

        let config = ProjectionConfig {
            filter: Some(Box::new(|path: &str| path != "kept.c")),
            ..ProjectionConfig::default()
        };
        let variant = Variant::new("all", Formula::and([var("A"), var("B")]));
        let outcome =
            project_tree(&tree, &variant, source.path(), target.path(), &config).unwrap();

        assert_eq!(outcome.ground_truth.derived_paths, vec!["cond.c"]);
        assert!(!target.path().join("kept.c").exists());
    }

    #[test]
    fn missing_source_aborts_by_default() {
        let tree = two_file_tree();
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        // kept.c is deliberately absent.
        write_numbered(source.path(), "cond.c", 2);

        let variant = Variant::new("all", Formula::and([var("A"), var("B")]));
        let err = project_tree(
            &tree,
            &variant,
            source.path(),
            target.path(),
            &ProjectionConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ProjectionError::MissingSource { .. }));
    }

    #[test]
    fn missing_source_tolerated_when_configured() {
        let tree = two_file_tree();
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        write_numbered(source.path(), "cond.c", 2);

        let config = ProjectionConfig {
            ignore_missing_files: true,
            ..ProjectionConfig::default()
        };
        let variant = Variant::new("all", Formula::and([var("A"), var("B")]));
        let outcome =
            project_tree(&tree, &variant, source.path(), target.path(), &config).unwrap();

        // Missing file is empty success: not derived, not a failure.
        assert_eq!(outcome.ground_truth.derived_paths, vec!["cond.c"]);
        assert!(outcome.failures.is_empty());
    }

    #[test]
    fn failures_are_collected_when_not_exiting_on_error() {
        let tree = two_file_tree();
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        write_numbered(source.path(), "cond.c", 2);

        let config = ProjectionConfig {
            exit_on_error: false,
            ..ProjectionConfig::default()
        };
        let variant = Variant::new("all", Formula::and([var("A"), var("B")]));
        let outcome =
            project_tree(&tree, &variant, source.path(), target.path(), &config).unwrap();

        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].0, "kept.c");
        assert_eq!(outcome.ground_truth.derived_paths, vec!["cond.c"]);
    }

    #[test]
    fn tolerated_missing_files_do_not_mask_other_failures() {
        let mut tree = ArtefactTree::new("spl");
        tree.add_file(tree.root(), "absent.c", Formula::True, 3)
            .unwrap();
        tree.add_file(tree.root(), "short.c", Formula::True, 10)
            .unwrap();
        tree.add_file(tree.root(), "ok.c", Formula::True, 2).unwrap();

        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        // absent.c is never written; short.c has fewer lines than claimed.
        write_numbered(source.path(), "short.c", 4);
        write_numbered(source.path(), "ok.c", 2);

        let config = ProjectionConfig {
            exit_on_error: false,
            ignore_missing_files: true,
            ..ProjectionConfig::default()
        };
        let variant = Variant::new("all", Formula::True);
        let outcome =
            project_tree(&tree, &variant, source.path(), target.path(), &config).unwrap();

        // The missing source is tolerated silently, the short source is
        // still collected as a failure, and later files keep projecting.
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].0, "short.c");
        assert!(matches!(
            outcome.failures[0].1,
            ProjectionError::SourceTooShort { .. }
        ));
        assert_eq!(outcome.ground_truth.derived_paths, vec!["ok.c"]);
    }

    #[test]
    fn source_shorter_than_annotations_is_a_typed_error() {
        let mut tree = ArtefactTree::new("spl");
        let file = tree
            .add_file(tree.root(), "short.c", Formula::True, 10)
            .unwrap();
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        write_numbered(source.path(), "short.c", 4);

        let mut ground = GroundTruth::new(ArtefactTree::new("variant"));
        let err = project_file(
            &tree,
            file,
            &Variant::new("v", Formula::True),
            source.path(),
            target.path(),
            &mut ground,
        )
        .unwrap_err();
        assert!(matches!(err, ProjectionError::SourceTooShort { line: 5, .. }));
    }
}

mod properties {
    use super::*;

    /// Legal nests of ranges within [1, 40], as (from, to, feature index).
    fn legal_blocks() -> impl Strategy<Value = Vec<(usize, usize)>> {
        prop::collection::vec((1usize..=40, 1usize..=40), 0..10).prop_map(|raw| {
            let mut accepted: Vec<(usize, usize)> = Vec::new();
            'next: for (a, b) in raw {
                let (from, to) = if a <= b { (a, b) } else { (b, a) };
                for &(ef, et) in &accepted {
                    let disjoint = to < ef || et < from;
                    let nested = (ef <= from && to <= et) || (from <= ef && et <= to);
                    if !disjoint && !nested {
                        continue 'next;
                    }
                }
                accepted.push((from, to));
            }
            accepted
        })
    }

    proptest! {
        /// Line-count law and ground-truth completeness, checked on the
        /// block derivation alone (no physical files needed).
        #[test]
        fn derivation_obeys_the_line_count_law(
            blocks in legal_blocks(),
            selected_mask in prop::bits::u16::ANY,
        ) {
            let mut tree = ArtefactTree::new("spl");
            let file = tree
                .add_file(tree.root(), "f.c", Formula::True, 40)
                .unwrap();
            let mut inserted = Vec::new();
            for (i, (from, to)) in blocks.iter().enumerate() {
                inserted.push(
                    tree.insert_annotation(
                        file,
                        Formula::var(format!("F{}", i)),
                        LineRange::new(*from, *to).unwrap(),
                        AnnotationStyle::External,
                    )
                    .unwrap(),
                );
            }

            // Select a subset of features; deselect the rest explicitly.
            let selection = Formula::and((0..blocks.len()).map(|i| {
                let v = Formula::var(format!("F{}", i));
                if selected_mask & (1 << (i % 16)) != 0 { v } else { Formula::not(v) }
            }));
            let variant = Variant::new("p", selection);

            let wrapper = tree.annotation_root(file).unwrap();
            let (derived, _) = derive_block(&tree, wrapper, &variant, 0).unwrap();

            let mut ground = GroundTruth::new(ArtefactTree::new("variant"));
            let vfile_len = derived.as_ref().map(|d| d.range.len());
            if let Some(root_block) = derived {
                let vroot = ground.variant_tree.root();
                let vfile = ground
                    .variant_tree
                    .add_file(vroot, "f.c", Formula::True, root_block.range.to())
                    .unwrap();
                let vwrapper = ground.variant_tree.annotation_root(vfile).unwrap();
                ground.matching.insert(wrapper, vwrapper).unwrap();
                for child in root_block.children {
                    materialize(child, &mut ground.variant_tree, vwrapper, &mut ground.matching)
                        .unwrap();
                }

                // Derived never exceeds original.
                prop_assert!(vfile_len.unwrap() <= 40);
                for (original, derived_id) in ground.matching.iter() {
                    let original_len = tree.annotation_range(original).len();
                    let derived_len =
                        ground.variant_tree.annotation_range(derived_id).len();
                    prop_assert!(derived_len <= original_len);
                }

                // Derived siblings + gap lines add up to the parent length,
                // and the derived tree still satisfies the nesting invariant.
                prop_assert!(ground.variant_tree.verify(vfile).is_ok());
                check_sum_law(&ground.variant_tree, vwrapper)?;

                // Completeness: every retained SPL node appears exactly once.
                for &node in &inserted {
                    let retained = variant
                        .is_implementing(&tree.presence_condition(node))
                        .unwrap();
                    let all_lines_survive = ground.matching.derived(node).is_some();
                    if retained {
                        // A retained block may still derive nothing if all
                        // its lines sat in excluded children; otherwise it
                        // must be matched.
                        let has_lines = !lines_to_copy(&tree, node, &variant).unwrap().is_empty();
                        prop_assert_eq!(all_lines_survive, has_lines);
                    } else {
                        prop_assert!(!all_lines_survive);
                    }
                }
            }
        }
    }

    /// Sum of derived child lengths plus directly-owned gap lines equals the
    /// parent's derived length, recursively.
    fn check_sum_law(
        tree: &ArtefactTree,
        node: crate::tree::NodeId,
    ) -> Result<(), TestCaseError> {
        let parent_range = tree.annotation_range(node);
        let mut covered = 0usize;
        let mut cursor = parent_range.from();
        for &child in tree.children(node) {
            let child_range = tree.annotation_range(child);
            covered += child_range.from() - cursor; // gap before child
            covered += child_range.len();
            cursor = child_range.to() + 1;
            check_sum_law(tree, child)?;
        }
        covered += parent_range.to() + 1 - cursor; // trailing gap
        prop_assert_eq!(covered, parent_range.len());
        Ok(())
    }
}
