use proptest::collection::btree_set;
use proptest::prelude::*;

/// Distinct blob names with a small alphabet so prefixes overlap
pub fn blob_names_strategy() -> impl Strategy<Value = Vec<String>> {
    btree_set("[abc]{1,3}(/[a-z0-9]{1,4})?", 0..40).prop_map(|names| names.into_iter().collect())
}

/// Prefix lists mixing matching and non-matching prefixes
pub fn prefix_list_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(prop_oneof![Just(String::new()), "[abcd]{1,2}"], 0..4)
}

pub fn page_size_strategy() -> impl Strategy<Value = usize> {
    1usize..8
}
