use pathforge_core::{create_names, BindingNamer, FilterKey, FilterSet, Wildcard};
use proptest::prelude::*;

fn ident() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[a-z][a-z0-9_]{0,8}").unwrap()
}

fn segment() -> impl Strategy<Value = (String, bool, bool, bool)> {
    (ident(), any::<bool>(), any::<bool>(), any::<bool>())
}

fn render((field, inverted, count, distinct): &(String, bool, bool, bool)) -> String {
    format!(
        "{}{field}{}{}",
        if *inverted { "^" } else { "" },
        if *count { "#" } else { "" },
        if *distinct { "!" } else { "" },
    )
}

fn wildcard() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("*"), Just("**"), Just("%"), Just("%%")]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn markers_never_change_identity(seg in segment(), tails in proptest::collection::vec(ident(), 0..4)) {
        let filters: Vec<String> = if tails.is_empty() {
            vec![render(&seg)]
        } else {
            tails.iter().map(|tail| format!("{}.{tail}", render(&seg))).collect()
        };
        let set = FilterSet::parse(&filters);

        prop_assert_eq!(set.len(), 1);
        let key = FilterKey { field: seg.0.clone(), inverted: seg.1 };
        prop_assert_eq!(set.keys().next(), Some(&key));

        let entry = set.get(&seg.0, seg.1).expect("entry");
        prop_assert_eq!(entry.count, seg.2);
        prop_assert_eq!(entry.distinct, seg.3);
        prop_assert_eq!(entry.nested(), tails);
    }

    #[test]
    fn one_key_per_distinct_first_segment(fields in proptest::collection::vec(ident(), 1..8)) {
        let set = FilterSet::parse(&fields);
        let mut unique = fields.clone();
        unique.sort();
        unique.dedup();
        prop_assert_eq!(set.len(), unique.len());
        for field in &fields {
            let entry = set.get(field, false).expect("entry");
            prop_assert!(!entry.has_nested());
        }
    }

    #[test]
    fn wildcards_are_not_keys(w in proptest::collection::vec(wildcard(), 1..5)) {
        let set = FilterSet::parse(&w);
        prop_assert_eq!(set.len(), 0);
        for text in &w {
            prop_assert!(set.has(Wildcard::parse(text).expect("wildcard")));
        }
    }

    #[test]
    fn names_are_positional(prefix in ident(), postfix in ident(), n in 0usize..6) {
        let names = create_names(&prefix, &postfix, n);
        prop_assert_eq!(names.len(), n);
        if let Some(last) = names.last() {
            prop_assert_eq!(last, &format!("{prefix}_{postfix}"));
        }
        for (i, name) in names.iter().take(n.saturating_sub(1)).enumerate() {
            prop_assert_eq!(name, &format!("{prefix}_{i}_{postfix}"));
        }
    }

    #[test]
    fn namer_counts_every_allocation(prefix in ident(), postfix in ident(), n in 1usize..5, repeats in 1usize..4) {
        let mut namer = BindingNamer::new();
        for _ in 0..repeats {
            namer.allocate(&prefix, &postfix, n);
        }
        prop_assert_eq!(namer.len(), n);
        let collisions = namer.collisions().count();
        prop_assert_eq!(collisions, if repeats > 1 { n } else { 0 });
    }
}
