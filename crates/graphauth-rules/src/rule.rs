//! Rule atom chains
//!
//! A rule string such as `filter(eq(authorId, $USER))` is tokenized and each
//! word is classified against the schema type the directive is attached to:
//!
//! 1. `$NAME` is a JWT claim variable;
//! 2. a word from the operation table (`filter`, `eq`) is an operation;
//! 3. a field of the current type is a schema field, and the current type
//!    moves to that field's type so the next word can name a nested field;
//! 4. anything else is a constant.
//!
//! The classified atoms are linked as fields, then operations, then operands,
//! each group keeping source order. For the rule above that gives
//! `authorId -> filter -> eq -> USER`.

use crate::errors::{AuthRuleError, Result};
use crate::schema::SchemaModel;
use crate::tokenizer::Tokenizer;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::fmt;

/// Operations a rule may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleOperation {
    /// Restrict to nodes whose identifiers are produced by an auxiliary query
    Filter,
    /// Direct equality comparison
    Eq,
}

/// The fixed operation vocabulary
static OPERATIONS: &[(&str, RuleOperation)] = &[
    ("filter", RuleOperation::Filter),
    ("eq", RuleOperation::Eq),
];

impl RuleOperation {
    /// Look up a word in the operation table
    pub fn lookup(word: &str) -> Option<Self> {
        OPERATIONS
            .iter()
            .find(|(name, _)| *name == word)
            .map(|(_, op)| *op)
    }

    /// Operation name as written in rules
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Filter => "filter",
            Self::Eq => "eq",
        }
    }
}

/// Classification of one rule word
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum AtomKind {
    /// Literal operand or claim name
    Constant,
    /// Member of the operation table
    Operation(RuleOperation),
    /// `$`-prefixed JWT claim variable
    JwtVariable,
    /// Field of the schema type active when the word was classified
    SchemaField {
        /// Storage predicate backing the field
        predicate: String,
        /// Name of the type the field was looked up on
        type_context: String,
    },
}

/// One classified word and the rest of its chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleAtom {
    name: String,
    #[serde(flatten)]
    kind: AtomKind,
    #[serde(skip)]
    next: Option<Box<RuleAtom>>,
}

impl RuleAtom {
    /// Word as written, without the `$` of JWT variables
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Classification
    pub fn kind(&self) -> &AtomKind {
        &self.kind
    }

    /// Next atom in the chain
    pub fn next(&self) -> Option<&RuleAtom> {
        self.next.as_deref()
    }

    /// Storage predicate, for schema fields
    pub fn predicate(&self) -> Option<&str> {
        match &self.kind {
            AtomKind::SchemaField { predicate, .. } => Some(predicate),
            _ => None,
        }
    }

    /// Operation, for operation atoms
    pub fn operation(&self) -> Option<RuleOperation> {
        match self.kind {
            AtomKind::Operation(op) => Some(op),
            _ => None,
        }
    }

    /// True for schema field atoms
    pub fn is_schema_field(&self) -> bool {
        matches!(self.kind, AtomKind::SchemaField { .. })
    }

    /// True for constants and JWT variables
    pub fn is_operand(&self) -> bool {
        matches!(self.kind, AtomKind::Constant | AtomKind::JwtVariable)
    }
}

impl fmt::Display for RuleAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            AtomKind::Constant => write!(f, "Constant({})", self.name),
            AtomKind::Operation(_) => write!(f, "Operation({})", self.name),
            AtomKind::JwtVariable => write!(f, "JwtVariable({})", self.name),
            AtomKind::SchemaField { predicate, .. } => {
                write!(f, "SchemaField({} => {predicate})", self.name)
            }
        }
    }
}

/// A non-empty, classified rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleChain {
    root_type: String,
    head: RuleAtom,
}

impl RuleChain {
    /// Tokenize and classify `rule` against `root_type`
    ///
    /// Returns `Ok(None)` for a rule with no words.
    pub fn build<S>(rule: &str, root_type: &str, schema: &S) -> Result<Option<Self>>
    where
        S: SchemaModel + ?Sized,
    {
        Self::from_tokens(Tokenizer::new(rule), root_type, schema)
    }

    /// Classify already tokenized words against `root_type`
    pub fn from_tokens<'t, S, I>(tokens: I, root_type: &str, schema: &S) -> Result<Option<Self>>
    where
        S: SchemaModel + ?Sized,
        I: IntoIterator<Item = &'t str>,
    {
        let mut fields = Vec::new();
        let mut operations = Vec::new();
        let mut operands = Vec::new();
        let mut current = root_type.to_string();

        for word in tokens {
            if let Some(claim) = word.strip_prefix('$') {
                operands.push((claim.to_string(), AtomKind::JwtVariable));
            } else if let Some(op) = RuleOperation::lookup(word) {
                operations.push((word.to_string(), AtomKind::Operation(op)));
            } else if let Some(field_type) = schema.field_type(&current, word) {
                let predicate = schema.predicate(&current, word).ok_or_else(|| {
                    AuthRuleError::invalid_rule(format!(
                        "field `{word}` on type `{current}` has no storage predicate"
                    ))
                })?;
                if !schema.has_type(field_type) {
                    return Err(AuthRuleError::invalid_rule(format!(
                        "field `{word}` on type `{current}` has unknown type `{field_type}`"
                    )));
                }
                let next_type = field_type.to_string();
                fields.push((
                    word.to_string(),
                    AtomKind::SchemaField {
                        predicate,
                        type_context: std::mem::replace(&mut current, next_type),
                    },
                ));
            } else {
                operands.push((word.to_string(), AtomKind::Constant));
            }
        }

        let head = fields
            .into_iter()
            .chain(operations)
            .chain(operands)
            .rev()
            .fold(None, |next, (name, kind)| {
                Some(Box::new(RuleAtom { name, kind, next }))
            });

        Ok(head.map(|head| Self {
            root_type: root_type.to_string(),
            head: *head,
        }))
    }

    /// Type the rule is attached to
    pub fn root_type(&self) -> &str {
        &self.root_type
    }

    /// First atom
    pub fn head(&self) -> &RuleAtom {
        &self.head
    }

    /// Atoms in chain order
    pub fn atoms(&self) -> Atoms<'_> {
        Atoms {
            next: Some(&self.head),
        }
    }

    /// Number of atoms
    pub fn len(&self) -> usize {
        self.atoms().count()
    }

    /// Always false: a built chain holds at least one atom
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether evaluating the rule needs stored data
    pub fn touches_data(&self) -> bool {
        self.atoms().any(RuleAtom::is_schema_field)
    }

    /// Schema field atoms, outermost first
    pub fn fields(&self) -> impl Iterator<Item = &RuleAtom> {
        self.atoms().filter(|atom| atom.is_schema_field())
    }

    /// Operations, outermost first
    pub fn operations(&self) -> impl Iterator<Item = RuleOperation> + '_ {
        self.atoms().filter_map(RuleAtom::operation)
    }

    /// True when the outermost operation is `filter`
    pub fn is_filter(&self) -> bool {
        self.operations().next() == Some(RuleOperation::Filter)
    }

    /// Innermost comparison operation
    pub fn comparison(&self) -> Option<RuleOperation> {
        self.operations()
            .filter(|op| *op != RuleOperation::Filter)
            .last()
    }

    /// First constant or JWT variable
    pub fn operand(&self) -> Option<&RuleAtom> {
        self.atoms().find(|atom| atom.is_operand())
    }

    /// Storage predicates of the field path, outermost first
    pub fn predicate_path(&self) -> Vec<&str> {
        self.atoms().filter_map(RuleAtom::predicate).collect()
    }

    /// Name used for auxiliary query artifacts
    ///
    /// The first field's predicate, or the first word for rules that touch
    /// no field.
    pub fn rule_name(&self) -> &str {
        self.fields()
            .next()
            .and_then(RuleAtom::predicate)
            .unwrap_or(&self.head.name)
    }
}

impl fmt::Display for RuleChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, atom) in self.atoms().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{atom}")?;
        }
        Ok(())
    }
}

impl Serialize for RuleChain {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let atoms: Vec<&RuleAtom> = self.atoms().collect();
        let mut state = serializer.serialize_struct("RuleChain", 2)?;
        state.serialize_field("root_type", &self.root_type)?;
        state.serialize_field("atoms", &atoms)?;
        state.end()
    }
}

/// Iterator over a chain's atoms
#[derive(Debug, Clone)]
pub struct Atoms<'a> {
    next: Option<&'a RuleAtom>,
}

impl<'a> Iterator for Atoms<'a> {
    type Item = &'a RuleAtom;

    fn next(&mut self) -> Option<Self::Item> {
        let atom = self.next?;
        self.next = atom.next();
        Some(atom)
    }
}
