//! Filter and auxiliary query generation
//!
//! A compiled rule tree is walked twice. [`RuleNode::build_filter`] produces
//! the boolean clause attached to the caller's query; [`RuleNode::build_queries`]
//! produces the standalone blocks that clause depends on. A `filter(...)` leaf
//! shows up in both: as `uid(rule_<name>_<id>)` in the filter and as the
//! query bound to that variable. Both sides derive the name from the node's
//! `rule_id`, so they always agree.
//!
//! `not` passes its child's filter through unchanged; polarity is not
//! inverted.

use crate::rule::{AtomKind, RuleAtom, RuleChain, RuleOperation};
use crate::tree::{RuleId, RuleNode, RuleNodeKind};
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// Variable and block name for the auxiliary query of a filter leaf
pub fn rule_variable(rule_name: &str, rule_id: RuleId) -> String {
    format!("rule_{rule_name}_{rule_id}")
}

/// Boolean connective of a combinator filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BoolOp {
    /// Conjunction
    And,
    /// Disjunction
    Or,
}

impl BoolOp {
    /// Operator name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

/// Right-hand side of a comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FilterArg {
    /// Literal value
    Constant(String),
    /// JWT claim, bound by the executor
    JwtVariable(String),
}

impl FilterArg {
    fn from_atom(atom: &RuleAtom) -> Option<Self> {
        match atom.kind() {
            AtomKind::Constant => Some(Self::Constant(atom.name().to_string())),
            AtomKind::JwtVariable => Some(Self::JwtVariable(atom.name().to_string())),
            AtomKind::Operation(_) | AtomKind::SchemaField { .. } => None,
        }
    }
}

impl fmt::Display for FilterArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(value) => f.write_str(value),
            Self::JwtVariable(name) => write!(f, "${name}"),
        }
    }
}

/// Boolean filter expression embeddable in a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterExpr {
    /// `and` / `or` over sub-filters
    Combinator {
        /// Connective
        op: BoolOp,
        /// Operands, in rule order
        children: Vec<FilterExpr>,
    },
    /// Nodes whose identifiers are bound to a query variable
    UidRef {
        /// Variable produced by an [`AuxQuery`]
        variable: String,
    },
    /// Inline comparison of a predicate against an operand
    Compare {
        /// Comparison function
        func: RuleOperation,
        /// Storage predicate
        predicate: String,
        /// Compared value
        operand: FilterArg,
    },
}

impl FilterExpr {
    /// Variables referenced anywhere in the expression
    pub fn variables(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Combinator { children, .. } => {
                for child in children {
                    child.collect_variables(out);
                }
            }
            Self::UidRef { variable } => out.push(variable),
            Self::Compare { .. } => {}
        }
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Combinator { op, children } => {
                f.write_str("(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " {} ", op.as_str())?;
                    }
                    write!(f, "{child}")?;
                }
                f.write_str(")")
            }
            Self::UidRef { variable } => write!(f, "uid({variable})"),
            Self::Compare {
                func,
                predicate,
                operand,
            } => write!(f, "{}({predicate}, {operand})", func.as_str()),
        }
    }
}

/// One projected edge or attribute of an auxiliary query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryField {
    /// Predicate (or `uid`)
    pub attr: String,
    /// Filter applied to the edge
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterExpr>,
    /// Nested selection
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<QueryField>,
}

impl QueryField {
    fn uid() -> Self {
        Self {
            attr: "uid".to_string(),
            filter: None,
            children: Vec::new(),
        }
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        write!(f, "{:indent$}{}", "", self.attr, indent = depth * 2)?;
        if let Some(filter) = &self.filter {
            write!(f, " @filter({filter})")?;
        }
        if self.children.is_empty() {
            return writeln!(f);
        }
        writeln!(f, " {{")?;
        for child in &self.children {
            child.render(f, depth + 1)?;
        }
        writeln!(f, "{:indent$}}}", "", indent = depth * 2)
    }
}

/// Standalone query computing the identifiers that satisfy one filter leaf
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuxQuery {
    name: String,
    root_type: String,
    cascade: bool,
    selection: Vec<QueryField>,
}

impl AuxQuery {
    /// Block name, also the variable the identifiers are bound to
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type scanned by the root function
    pub fn root_type(&self) -> &str {
        &self.root_type
    }

    /// Whether results lacking a filtered edge are dropped
    pub fn cascade(&self) -> bool {
        self.cascade
    }

    /// Projected fields
    pub fn selection(&self) -> &[QueryField] {
        &self.selection
    }

    fn for_leaf(chain: &RuleChain, rule_id: RuleId) -> Option<Self> {
        if !chain.is_filter() || !chain.touches_data() {
            return None;
        }

        let filter = edge_comparison(chain)?;
        let path = chain.predicate_path();
        // The last predicate is compared; the edges above it are traversed.
        let edges = if path.len() > 1 {
            &path[..path.len() - 1]
        } else {
            &path[..]
        };

        let mut field: Option<QueryField> = None;
        for (depth, attr) in edges.iter().enumerate().rev() {
            let mut children = vec![QueryField::uid()];
            children.extend(field.take());
            field = Some(QueryField {
                attr: (*attr).to_string(),
                filter: if depth + 1 == edges.len() {
                    Some(filter.clone())
                } else {
                    None
                },
                children,
            });
        }

        let mut selection = vec![QueryField::uid()];
        selection.extend(field);

        Some(Self {
            name: rule_variable(chain.rule_name(), rule_id),
            root_type: chain.root_type().to_string(),
            cascade: true,
            selection,
        })
    }
}

impl fmt::Display for AuxQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{name} as {name}(func: type({root}))",
            name = self.name,
            root = self.root_type
        )?;
        if self.cascade {
            f.write_str(" @cascade")?;
        }
        writeln!(f, " {{")?;
        for field in &self.selection {
            field.render(f, 1)?;
        }
        f.write_str("}")
    }
}

/// Comparison of `predicate` against the leaf's operand, if it has everything
/// a comparison needs
fn compare(chain: &RuleChain, predicate: &str) -> Option<FilterExpr> {
    let func = chain.comparison()?;
    let operand = chain.operand().and_then(FilterArg::from_atom)?;
    Some(FilterExpr::Compare {
        func,
        predicate: predicate.to_string(),
        operand,
    })
}

/// Comparison placed on the deepest traversed edge of a `filter(...)` query
fn edge_comparison(chain: &RuleChain) -> Option<FilterExpr> {
    compare(chain, chain.predicate_path().last()?)
}

/// Comparison applied to nodes of the root type, so it uses the root field
fn inline_comparison(chain: &RuleChain) -> Option<FilterExpr> {
    compare(chain, chain.predicate_path().first()?)
}

impl RuleNode {
    /// Filter clause for this subtree, or `None` if it filters nothing
    pub fn build_filter(&self) -> Option<FilterExpr> {
        match self.kind() {
            RuleNodeKind::Or(children) => combine(BoolOp::Or, children),
            RuleNodeKind::And(children) => combine(BoolOp::And, children),
            // Polarity is not inverted.
            RuleNodeKind::Not(child) => child.build_filter(),
            RuleNodeKind::Leaf(chain) if !chain.touches_data() => None,
            RuleNodeKind::Leaf(chain) if chain.is_filter() => {
                if edge_comparison(chain).is_none() {
                    debug!(
                        rule_id = self.rule_id(),
                        rule = %chain,
                        "filter rule has no complete comparison; emitting no query"
                    );
                    return None;
                }
                Some(FilterExpr::UidRef {
                    variable: rule_variable(chain.rule_name(), self.rule_id()),
                })
            }
            RuleNodeKind::Leaf(chain) => {
                let filter = inline_comparison(chain);
                if filter.is_none() {
                    debug!(
                        rule_id = self.rule_id(),
                        rule = %chain,
                        "rule has no complete comparison; contributing no filter"
                    );
                }
                filter
            }
            RuleNodeKind::Empty => None,
        }
    }

    /// Auxiliary queries the filter of this subtree references, in pre-order
    pub fn build_queries(&self) -> Vec<AuxQuery> {
        let mut out = Vec::new();
        self.collect_queries(&mut out);
        out
    }

    fn collect_queries(&self, out: &mut Vec<AuxQuery>) {
        match self.kind() {
            RuleNodeKind::Or(children) | RuleNodeKind::And(children) => {
                for child in children {
                    child.collect_queries(out);
                }
            }
            RuleNodeKind::Not(child) => child.collect_queries(out),
            RuleNodeKind::Leaf(chain) => out.extend(AuxQuery::for_leaf(chain, self.rule_id())),
            RuleNodeKind::Empty => {}
        }
    }
}

fn combine(op: BoolOp, children: &[RuleNode]) -> Option<FilterExpr> {
    let children: Vec<_> = children.iter().filter_map(RuleNode::build_filter).collect();
    if children.is_empty() {
        return None;
    }
    Some(FilterExpr::Combinator { op, children })
}

/// Everything request handling needs for one rule tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledRule {
    /// Decidable from claims alone; filter and queries are then omitted
    pub rbac: bool,
    /// Clause to attach to the caller's query
    pub filter: Option<FilterExpr>,
    /// Blocks to run alongside, and before, the filtered query
    pub queries: Vec<AuxQuery>,
}

impl CompiledRule {
    /// Classify and, unless claims suffice, compile a rule tree
    pub fn for_node(node: &RuleNode) -> Self {
        if node.is_rbac() {
            return Self {
                rbac: true,
                filter: None,
                queries: Vec::new(),
            };
        }
        Self {
            rbac: false,
            filter: node.build_filter(),
            queries: node.build_queries(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::DirectiveValue;
    use crate::schema::{InMemorySchema, TypeDefinition};
    use crate::tree::ParseContext;
    use serde_json::json;

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

    fn parse(value: serde_json::Value) -> RuleNode {
        let schema = schema();
        let mut ctx = ParseContext::new(&schema, "Post");
        ctx.parse_rules(&DirectiveValue::try_from(value).unwrap())
            .unwrap()
    }

    #[test]
    fn test_inline_comparison() {
        let tree = parse(json!({ "rule": "eq(hidden, false)" }));
        let filter = tree.build_filter().unwrap();
        assert_eq!(filter.to_string(), "eq(Post.hidden, false)");
        assert!(tree.build_queries().is_empty());
    }

    #[test]
    fn test_filter_leaf_renders_query() {
        let tree = parse(json!({ "rule": "filter(eq(authorId, $USER))" }));

        assert_eq!(
            tree.build_filter().unwrap().to_string(),
            "uid(rule_Post.authorId_1)"
        );

        let queries = tree.build_queries();
        assert_eq!(queries.len(), 1);
        assert_eq!(
            queries[0].to_string(),
            "rule_Post.authorId_1 as rule_Post.authorId_1(func: type(Post)) @cascade {\n  \
             uid\n  \
             Post.authorId @filter(eq(Post.authorId, $USER)) {\n    \
             uid\n  \
             }\n\
             }"
        );
    }

    #[test]
    fn test_multi_hop_query_nests_edges() {
        let tree = parse(json!({ "rule": "filter(eq(author, name, $USER))" }));
        let queries = tree.build_queries();
        let edge = &queries[0].selection()[1];

        assert_eq!(queries[0].name(), "rule_Post.author_1");
        assert_eq!(edge.attr, "Post.author");
        assert_eq!(
            edge.filter.as_ref().map(ToString::to_string).as_deref(),
            Some("eq(Author.name, $USER)")
        );
        assert_eq!(edge.children, vec![QueryField::uid()]);
    }

    #[test]
    fn test_multi_hop_inline_comparison_uses_root_predicate() {
        let tree = parse(json!({ "rule": "eq(author, name, bob)" }));
        assert_eq!(
            tree.build_filter().unwrap().to_string(),
            "eq(Post.author, bob)"
        );
        assert!(tree.build_queries().is_empty());
    }

    #[test]
    fn test_filter_without_comparison_emits_nothing() {
        let tree = parse(json!({ "rule": "filter(authorId)" }));
        assert!(!tree.is_rbac());
        assert_eq!(tree.build_filter(), None);
        assert!(tree.build_queries().is_empty());

        // Missing operand
        let tree = parse(json!({ "rule": "filter(eq(authorId))" }));
        assert_eq!(tree.build_filter(), None);
        assert!(tree.build_queries().is_empty());
    }

    #[test]
    fn test_combinators_drop_empty_children() {
        let tree = parse(json!({
            "or": [
                { "rule": "$role" },
                { "rule": "eq(hidden, false)" },
                { "rule": "filter(eq(authorId, $USER))" }
            ]
        }));
        assert_eq!(
            tree.build_filter().unwrap().to_string(),
            "(eq(Post.hidden, false) or uid(rule_Post.authorId_4))"
        );

        let only_rbac = parse(json!({ "and": [ { "rule": "$role" }, { "rule": "$admin" } ] }));
        assert_eq!(only_rbac.build_filter(), None);
    }

    #[test]
    fn test_not_passes_child_through() {
        let tree = parse(json!({ "not": { "rule": "filter(eq(authorId, $USER))" } }));
        assert_eq!(
            tree.build_filter().unwrap().to_string(),
            "uid(rule_Post.authorId_2)"
        );
        assert_eq!(tree.build_queries()[0].name(), "rule_Post.authorId_2");
    }

    #[test]
    fn test_incomplete_comparison_yields_nothing() {
        let tree = parse(json!({ "rule": "hidden" }));
        assert!(!tree.is_rbac());
        assert_eq!(tree.build_filter(), None);
    }

    #[test]
    fn test_queries_in_preorder() {
        let tree = parse(json!({
            "and": [
                { "or": [ { "rule": "filter(eq(authorId, $A))" } ] },
                { "not": { "rule": "filter(eq(hidden, $B))" } },
                { "rule": "filter(eq(author, name, $C))" }
            ]
        }));
        let names: Vec<_> = tree
            .build_queries()
            .iter()
            .map(|q| q.name().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "rule_Post.authorId_3",
                "rule_Post.hidden_5",
                "rule_Post.author_6"
            ]
        );
        let filter = tree.build_filter().unwrap();
        assert_eq!(
            filter.variables(),
            vec![
                "rule_Post.authorId_3",
                "rule_Post.hidden_5",
                "rule_Post.author_6"
            ]
        );
    }

    #[test]
    fn test_compiled_rule_short_circuits_rbac() {
        let rbac = parse(json!({ "or": [ { "rule": "$role" }, { "rule": "filter(eq(authorId, $USER))" } ] }));
        let compiled = CompiledRule::for_node(&rbac);
        assert!(compiled.rbac);
        assert!(compiled.filter.is_none());
        assert!(compiled.queries.is_empty());

        let data = parse(json!({ "rule": "filter(eq(authorId, $USER))" }));
        let compiled = CompiledRule::for_node(&data);
        assert!(!compiled.rbac);
        assert_eq!(compiled.queries.len(), 1);
    }

    #[test]
    fn test_filter_serializes_with_type_tags() {
        let tree = parse(json!({ "rule": "eq(hidden, false)" }));
        let json = serde_json::to_value(tree.build_filter().unwrap()).unwrap();
        assert_eq!(json["type"], "compare");
        assert_eq!(json["func"], "eq");
        assert_eq!(json["operand"]["kind"], "constant");
        assert_eq!(json["operand"]["value"], "false");
    }
}
