//! Rule Compiler Property Tests
//!
//! Generates random rule strings and combinator trees and verifies:
//!
//! - Tokenizing words joined by punctuation gives back exactly those words
//! - Every auxiliary query is referenced exactly once by the filter
//! - Only complete `filter(...)` leaves that touch data produce auxiliary queries
//! - `or` monotonicity and the pinned first-child rule for `and`
//! - Compiling the same directive twice gives identical output

#![allow(clippy::unwrap_used)]

use graphauth_rules::schema::TypeDefinition;
use graphauth_rules::{
    tokenize, DirectiveValue, InMemorySchema, ParseContext, RuleNode, RuleNodeKind,
};
use proptest::prelude::*;
use std::collections::HashMap;

fn schema() -> InMemorySchema {
    InMemorySchema::new([
        TypeDefinition::object("Author").field("name", "String"),
        TypeDefinition::object("Post")
            .field("hidden", "Boolean")
            .field("authorId", "String")
            .field("author", "Author"),
    ])
    .unwrap()
}

fn compile(directive: &DirectiveValue) -> RuleNode {
    let schema = schema();
    let mut ctx = ParseContext::new(&schema, "Post");
    ctx.parse_rules(directive).unwrap()
}

/// Leaf rules covering claims-only, inline and filter shapes
fn arb_rule() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("$role"),
        Just("admin"),
        Just(""),
        Just("eq(hidden, false)"),
        Just("eq($ROLE, admin)"),
        Just("filter(eq(authorId, $USER))"),
        Just("filter(eq(author, name, $USER))"),
        Just("hidden"),
        Just("filter(authorId)"),
        Just("eq(author, name, bob)"),
    ]
}

fn leaf(rule: &str) -> DirectiveValue {
    DirectiveValue::object([("rule", DirectiveValue::from(rule))])
}

/// Random combinator directives up to a few levels deep
fn arb_directive() -> impl Strategy<Value = DirectiveValue> {
    let leaf_strategy = arb_rule().prop_map(leaf);
    leaf_strategy.prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4)
                .prop_map(|items| DirectiveValue::object([("or", DirectiveValue::list(items))])),
            prop::collection::vec(inner.clone(), 0..4)
                .prop_map(|items| DirectiveValue::object([("and", DirectiveValue::list(items))])),
            inner.prop_map(|child| DirectiveValue::object([("not", child)])),
        ]
    })
}

/// Identifiers of leaves that should own an auxiliary query
fn query_backed_leaves(node: &RuleNode) -> Vec<u32> {
    node.walk()
        .into_iter()
        .filter_map(|n| match n.kind() {
            RuleNodeKind::Leaf(chain)
                if chain.is_filter()
                    && chain.touches_data()
                    && chain.comparison().is_some()
                    && chain.operand().is_some() =>
            {
                Some(n.rule_id())
            }
            _ => None,
        })
        .collect()
}

fn word() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_$.]{1,8}"
}

fn separator() -> impl Strategy<Value = String> {
    "[{}:(), ]{1,3}"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_tokenizer_recovers_words(
        words in prop::collection::vec((word(), separator()), 0..8),
        lead in "[{}:(), ]{0,2}",
    ) {
        let mut input = lead;
        for (w, sep) in &words {
            input.push_str(w);
            input.push_str(sep);
        }

        let tokens = tokenize(&input);
        prop_assert!(tokens.iter().all(|t| !t.is_empty()));

        let expected: Vec<&str> = words.iter().map(|(w, _)| w.as_str()).collect();
        prop_assert_eq!(tokens.join(" "), expected.join(" "));
    }

    #[test]
    fn prop_queries_match_filter_references(directive in arb_directive()) {
        let node = compile(&directive);
        let queries = node.build_queries();
        let variables: Vec<String> = node
            .build_filter()
            .map(|f| f.variables().into_iter().map(str::to_string).collect())
            .unwrap_or_default();

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for v in &variables {
            *counts.entry(v.as_str()).or_default() += 1;
        }
        for query in &queries {
            prop_assert_eq!(counts.get(query.name()).copied(), Some(1));
        }
        prop_assert_eq!(variables.len(), queries.len());
    }

    #[test]
    fn prop_only_filter_leaves_emit_queries(directive in arb_directive()) {
        let node = compile(&directive);
        let expected = query_backed_leaves(&node);
        let emitted: Vec<u32> = node
            .build_queries()
            .iter()
            .map(|q| q.name().rsplit('_').next().unwrap().parse().unwrap())
            .collect();
        prop_assert_eq!(emitted, expected);
    }

    #[test]
    fn prop_compilation_is_deterministic(directive in arb_directive()) {
        let first = compile(&directive);
        let second = compile(&directive);
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.build_filter(), second.build_filter());
        prop_assert_eq!(first.build_queries(), second.build_queries());
    }

    #[test]
    fn prop_or_is_monotone(
        siblings in prop::collection::vec(arb_directive(), 0..4),
        position in 0usize..4,
    ) {
        let mut items = siblings;
        let at = position.min(items.len());
        items.insert(at, leaf("$role"));
        let node = compile(&DirectiveValue::object([("or", DirectiveValue::list(items))]));
        prop_assert!(node.is_rbac());
    }

    #[test]
    fn prop_and_follows_first_child(items in prop::collection::vec(arb_directive(), 1..4)) {
        let node = compile(&DirectiveValue::object([("and", DirectiveValue::list(items))]));
        let RuleNodeKind::And(children) = node.kind() else {
            panic!("expected and node");
        };
        prop_assert_eq!(node.is_rbac(), children[0].is_rbac());
    }
}
