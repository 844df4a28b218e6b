//! Combinator trees
//!
//! An `@auth` operation entry is a nested boolean structure:
//!
//! ```text
//! { or: [ { rule: "$role" }, { and: [ { rule: "..." }, { not: { rule: "..." } } ] } ] }
//! ```
//!
//! [`ParseContext::parse_rules`] turns it into a [`RuleNode`] tree, numbering
//! nodes in pre-order. The numbers name auxiliary query artifacts, so they are
//! fixed when the tree is built and never regenerated.

use crate::directive::DirectiveValue;
use crate::errors::Result;
use crate::rule::RuleChain;
use crate::schema::SchemaModel;
use serde::Serialize;
use tracing::debug;

/// Pre-order node number, starting at 1 for each schema type
pub type RuleId = u32;

/// Recognized combinator keys, in the order they are tried
const COMBINATOR_KEYS: &[&str] = &["or", "and", "not", "rule"];

/// Node of a compiled rule tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleNode {
    rule_id: RuleId,
    #[serde(flatten)]
    kind: RuleNodeKind,
}

/// Exactly one of the node shapes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "node", content = "children", rename_all = "snake_case")]
pub enum RuleNodeKind {
    /// Any child grants access
    Or(Vec<RuleNode>),
    /// Every child must grant access
    And(Vec<RuleNode>),
    /// Negated child
    Not(Box<RuleNode>),
    /// Classified rule string
    Leaf(RuleChain),
    /// No combinator and no rule
    Empty,
}

impl RuleNode {
    /// Assemble a node directly
    pub fn new(rule_id: RuleId, kind: RuleNodeKind) -> Self {
        Self { rule_id, kind }
    }

    /// Pre-order number
    pub fn rule_id(&self) -> RuleId {
        self.rule_id
    }

    /// Node shape
    pub fn kind(&self) -> &RuleNodeKind {
        &self.kind
    }

    /// Whether the subtree can be decided from caller claims alone
    ///
    /// `And` consults only its first child. That matches the behavior callers
    /// were built against; changing it needs a decision from the owners of
    /// the authorization semantics.
    pub fn is_rbac(&self) -> bool {
        match &self.kind {
            RuleNodeKind::Or(children) => {
                children.is_empty() || children.iter().any(RuleNode::is_rbac)
            }
            RuleNodeKind::And(children) => children.first().map_or(true, RuleNode::is_rbac),
            RuleNodeKind::Not(child) => child.is_rbac(),
            RuleNodeKind::Leaf(chain) => !chain.touches_data(),
            RuleNodeKind::Empty => true,
        }
    }

    /// Nodes of the subtree in pre-order
    pub fn walk(&self) -> Vec<&RuleNode> {
        let mut out = Vec::new();
        self.collect_preorder(&mut out);
        out
    }

    fn collect_preorder<'a>(&'a self, out: &mut Vec<&'a RuleNode>) {
        out.push(self);
        match &self.kind {
            RuleNodeKind::Or(children) | RuleNodeKind::And(children) => {
                for child in children {
                    child.collect_preorder(out);
                }
            }
            RuleNodeKind::Not(child) => child.collect_preorder(out),
            RuleNodeKind::Leaf(_) | RuleNodeKind::Empty => {}
        }
    }
}

/// Transient state while compiling the directives of one schema type
pub struct ParseContext<'s, S: SchemaModel + ?Sized> {
    schema: &'s S,
    current_type: String,
    next_rule_id: RuleId,
}

impl<'s, S: SchemaModel + ?Sized> ParseContext<'s, S> {
    /// Start compiling directives attached to `type_name`
    pub fn new(schema: &'s S, type_name: impl Into<String>) -> Self {
        Self {
            schema,
            current_type: type_name.into(),
            next_rule_id: 1,
        }
    }

    /// Type the directives are attached to
    pub fn current_type(&self) -> &str {
        &self.current_type
    }

    /// Number the next node will receive
    pub fn next_rule_id(&self) -> RuleId {
        self.next_rule_id
    }

    fn allocate_id(&mut self) -> RuleId {
        let id = self.next_rule_id;
        self.next_rule_id += 1;
        id
    }

    /// Compile one combinator object into a tree
    ///
    /// The first present key among `or`, `and`, `not`, `rule` decides the node
    /// shape. Keys with the wrong shape are skipped, leaving that part of the
    /// tree absent. Only a rule that references unresolvable schema data fails.
    pub fn parse_rules(&mut self, rule: &DirectiveValue) -> Result<RuleNode> {
        let rule_id = self.allocate_id();

        let Some(entries) = rule.as_object() else {
            debug!(
                rule_id,
                shape = rule.shape(),
                "auth rule is not an object; treating as empty"
            );
            return Ok(RuleNode::new(rule_id, RuleNodeKind::Empty));
        };

        let mut kind = RuleNodeKind::Empty;
        for key in COMBINATOR_KEYS {
            let Some(value) = entries.get(*key) else {
                continue;
            };
            match self.parse_entry(key, value)? {
                Some(parsed) => {
                    kind = parsed;
                    break;
                }
                None => debug!(
                    rule_id,
                    key = *key,
                    shape = value.shape(),
                    "ignoring auth rule key with unexpected shape"
                ),
            }
        }

        let extra = entries
            .keys()
            .filter(|k| !COMBINATOR_KEYS.contains(&k.as_str()))
            .count();
        if extra > 0 {
            debug!(rule_id, extra, "ignoring unrecognized auth rule keys");
        }

        Ok(RuleNode::new(rule_id, kind))
    }

    fn parse_entry(&mut self, key: &str, value: &DirectiveValue) -> Result<Option<RuleNodeKind>> {
        let kind = match (key, value) {
            ("or", DirectiveValue::List(items)) => RuleNodeKind::Or(self.parse_list(items)?),
            ("and", DirectiveValue::List(items)) => RuleNodeKind::And(self.parse_list(items)?),
            ("not", DirectiveValue::Object(_)) => {
                RuleNodeKind::Not(Box::new(self.parse_rules(value)?))
            }
            ("rule", DirectiveValue::String(text)) => {
                match RuleChain::build(text, &self.current_type, self.schema)? {
                    Some(chain) => RuleNodeKind::Leaf(chain),
                    None => RuleNodeKind::Empty,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(kind))
    }

    fn parse_list(&mut self, items: &[DirectiveValue]) -> Result<Vec<RuleNode>> {
        let mut nodes = Vec::with_capacity(items.len());
        for item in items {
            if item.as_object().is_none() {
                debug!(shape = item.shape(), "skipping non-object combinator operand");
                continue;
            }
            nodes.push(self.parse_rules(item)?);
        }
        Ok(nodes)
    }
}
