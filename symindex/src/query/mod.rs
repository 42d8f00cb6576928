// Query resolver - filter to query tree, tree to index lookups

pub mod filter;

use crate::error::{IndexerError, Result};
use crate::indexer::{dedup, Indexer};
use crate::record::normalize_field;
use filter::{ParseNode, TokenKind};

/// The index operation a leaf resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    FindBy,
    FindByPartial,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryToken {
    pub operator: String,
    pub lookup: Option<Lookup>,
    /// Raw field name and literal, as written in the filter
    pub operands: Vec<String>,
}

impl QueryToken {
    fn combinator(operator: &str) -> Self {
        QueryToken {
            operator: operator.to_string(),
            lookup: None,
            operands: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryTree {
    pub token: Option<QueryToken>,
    root: bool,
    pub left: Option<Box<QueryTree>>,
    pub right: Option<Box<QueryTree>>,
}

impl QueryTree {
    pub fn new() -> Self {
        QueryTree {
            root: true,
            ..Default::default()
        }
    }

    fn leaf(token: QueryToken) -> Box<QueryTree> {
        Box::new(QueryTree {
            token: Some(token),
            ..Default::default()
        })
    }

    /// Hang `token` below this node: the root holds a single child, other
    /// nodes fill left, then right.
    pub fn insert(&mut self, token: QueryToken) -> Result<()> {
        let slot = if self.root || self.left.is_none() {
            &mut self.left
        } else {
            &mut self.right
        };
        if slot.is_some() {
            return Err(IndexerError::NotImplemented(format!(
                "filter too deeply nested at '{}'",
                token.operator
            )));
        }
        *slot = Some(Self::leaf(token));
        Ok(())
    }

    fn left_mut(&mut self) -> Result<&mut QueryTree> {
        self.left
            .as_deref_mut()
            .ok_or_else(|| IndexerError::Other("query tree has no left branch".into()))
    }

    /// Collect primary keys for every lookup in the tree, left, right, then
    /// this node.
    pub fn resolve(&self, indexer: &Indexer, type_name: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        self.resolve_into(indexer, type_name, &mut keys)?;
        Ok(dedup(keys))
    }

    fn resolve_into(&self, indexer: &Indexer, type_name: &str, keys: &mut Vec<String>) -> Result<()> {
        if let Some(left) = &self.left {
            left.resolve_into(indexer, type_name, keys)?;
        }
        if let Some(right) = &self.right {
            right.resolve_into(indexer, type_name, keys)?;
        }

        let Some(token) = &self.token else {
            return Ok(());
        };
        let Some(lookup) = token.lookup else {
            return Ok(());
        };
        let (field, value) = sanitize(&token.operands)?;
        let found = match lookup {
            Lookup::FindBy => indexer.find_by(type_name, &field, &value)?,
            Lookup::FindByPartial => {
                indexer.find_by_partial(type_name, &field, &format!("{value}*"))?
            }
        };
        log::debug!("{} {field} '{value}': {} hit(s)", token.operator, found.len());
        keys.extend(found);
        Ok(())
    }
}

/// Parse `filter` and fold it into a query tree.
pub fn build(filter: &str) -> Result<QueryTree> {
    let node = filter::parse(filter)?;
    let mut tree = QueryTree::new();
    build_tree(&node, &mut tree)?;
    if tree.left.is_none() {
        return Err(IndexerError::NotImplemented(format!(
            "filter '{filter}' has no comparison or function"
        )));
    }
    Ok(tree)
}

fn build_tree(node: &ParseNode, tree: &mut QueryTree) -> Result<()> {
    match node.token.kind {
        TokenKind::Function => match node.token.value.as_str() {
            "startswith" => tree.insert(QueryToken {
                operator: node.token.value.clone(),
                lookup: Some(Lookup::FindByPartial),
                operands: operands(node)?,
            }),
            other => Err(IndexerError::NotImplemented(format!("function {other}"))),
        },
        TokenKind::Logical => match node.token.value.as_str() {
            op @ ("or" | "and") => {
                if op == "and" {
                    log::warn!("'and' in filter is resolved as a union of its operands");
                }
                tree.insert(QueryToken::combinator(op))?;
                let branch = tree.left_mut()?;
                for child in &node.children {
                    build_tree(child, branch)?;
                }
                Ok(())
            }
            other => Err(IndexerError::NotImplemented(format!("operator {other}"))),
        },
        TokenKind::Comparison => match node.token.value.as_str() {
            "eq" => tree.insert(QueryToken {
                operator: node.token.value.clone(),
                lookup: Some(Lookup::FindBy),
                operands: operands(node)?,
            }),
            other => Err(IndexerError::NotImplemented(format!("operator {other}"))),
        },
        // Bare properties and literals carry no lookup
        _ => Ok(()),
    }
}

/// The `(property, literal)` pair of a lookup node.
fn operands(node: &ParseNode) -> Result<Vec<String>> {
    match node.children.as_slice() {
        [field, value]
            if field.token.kind == TokenKind::Property
                && matches!(
                    value.token.kind,
                    TokenKind::StringLiteral | TokenKind::Number | TokenKind::Boolean
                ) =>
        {
            Ok(vec![field.token.value.clone(), value.token.value.clone()])
        }
        _ => Err(IndexerError::NotImplemented(format!(
            "'{}' needs a field and a literal",
            node.token.value
        ))),
    }
}

/// Field name in registered form and the unquoted value.
fn sanitize(operands: &[String]) -> Result<(String, String)> {
    let [field, value] = operands else {
        return Err(IndexerError::Filter(format!(
            "expected 2 operands, got {}",
            operands.len()
        )));
    };
    let value = match value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')) {
        Some(inner) => inner.replace("''", "'"),
        None => value.clone(),
    };
    Ok((normalize_field(field), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, IndexDeclaration};
    use crate::index::IndexKind;
    use crate::record::DynamicRecord;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const ACCOUNT: &str = "accounts.Account";

    fn setup() -> (TempDir, Indexer) {
        let tmp = TempDir::new().unwrap();
        let indexer = Indexer::new(Config::disk(tmp.path().to_string_lossy()));
        for (field, kind) in [
            ("OnPremisesSamAccountName", IndexKind::Unique),
            ("Mail", IndexKind::Unique),
            ("DisplayName", IndexKind::NonUnique),
        ] {
            indexer
                .add_index(&IndexDeclaration::new(ACCOUNT, field, "accounts", kind))
                .unwrap();
        }
        for (id, sam, mail, name) in [
            ("a1", "MrDootDoot", "doot@example.com", "Mr Doot"),
            ("a2", "einstein", "einstein@example.org", "Albert Einstein"),
            ("a3", "marie", "marie@example.org", "Marie O'Brien"),
        ] {
            let record = DynamicRecord::new(
                ACCOUNT,
                serde_json::json!({
                    "id": id,
                    "on_premises_sam_account_name": sam,
                    "mail": mail,
                    "display_name": name,
                }),
            )
            .unwrap();
            indexer.add(&record).unwrap();
        }
        (tmp, indexer)
    }

    #[test]
    fn test_eq_and_startswith() {
        let (_tmp, indexer) = setup();
        assert_eq!(
            indexer
                .query(ACCOUNT, "on_premises_sam_account_name eq 'MrDootDoot'")
                .unwrap(),
            vec!["a1"]
        );
        assert_eq!(
            indexer
                .query(ACCOUNT, "startswith(on_premises_sam_account_name,'MrDoo')")
                .unwrap(),
            vec!["a1"]
        );
    }

    #[test]
    fn test_or_combines_both_sides() {
        let (_tmp, indexer) = setup();
        let hits = indexer
            .query(
                ACCOUNT,
                "on_premises_sam_account_name eq 'einstein' or mail eq 'doot@example.com'",
            )
            .unwrap();
        assert_eq!(hits, vec!["a2", "a1"]);

        let hits = indexer
            .query(ACCOUNT, "mail eq 'doot@example.com' or startswith(mail,'doot')")
            .unwrap();
        assert_eq!(hits, vec!["a1"]);
    }

    #[test]
    fn test_and_is_a_union() {
        let (_tmp, indexer) = setup();
        let hits = indexer
            .query(ACCOUNT, "mail eq 'doot@example.com' and mail eq 'marie@example.org'")
            .unwrap();
        assert_eq!(hits, vec!["a1", "a3"]);
    }

    #[test]
    fn test_no_match_is_empty() {
        let (_tmp, indexer) = setup();
        assert!(indexer
            .query(ACCOUNT, "mail eq 'nobody@example.com'")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_escaped_quote_in_value() {
        let (_tmp, indexer) = setup();
        assert_eq!(
            indexer
                .query(ACCOUNT, "display_name eq 'Marie O''Brien'")
                .unwrap(),
            vec!["a3"]
        );
    }

    #[test]
    fn test_unsupported_constructs() {
        let (_tmp, indexer) = setup();
        for filter in [
            "mail ne 'doot@example.com'",
            "contains(mail,'doot')",
            "not (mail eq 'doot@example.com')",
            "uid_number gt 5",
            "mail",
        ] {
            assert!(
                matches!(
                    indexer.query(ACCOUNT, filter),
                    Err(IndexerError::NotImplemented(_))
                ),
                "{filter}"
            );
        }
    }

    #[test]
    fn test_tree_shape_and_depth_limit() {
        let tree = build("a eq '1' or b eq '2'").unwrap();
        let or = tree.left.as_ref().unwrap();
        assert_eq!(or.token.as_ref().unwrap().operator, "or");
        assert_eq!(or.left.as_ref().unwrap().token.as_ref().unwrap().operands[0], "a");
        assert_eq!(or.right.as_ref().unwrap().token.as_ref().unwrap().operands[0], "b");

        assert!(build("a eq '1' or b eq '2' or c eq '3'").is_ok());
        assert!(matches!(
            build("(a eq '1' or b eq '2') or (c eq '3' or d eq '4')"),
            Err(IndexerError::NotImplemented(_))
        ));
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(
            sanitize(&["display_name".into(), "'Mr ''X'''".into()]).unwrap(),
            ("DisplayName".to_string(), "Mr 'X'".to_string())
        );
        assert_eq!(
            sanitize(&["uid_number".into(), "20000".into()]).unwrap(),
            ("UidNumber".to_string(), "20000".to_string())
        );
        assert!(sanitize(&["a".into()]).is_err());
    }
}
