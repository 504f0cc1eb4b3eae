//! Canonical search operators, alias resolution, and the operator whitelist.
//!
//! Two spellings reach the wire: the legacy `$`-prefixed form (`$ne`) and the
//! bare form (`ne`). Both resolve to one canonical token so that downstream
//! consumers only ever see one representation.

use serde_json::Value;
use std::collections::HashMap;

macro_rules! search_operators {
    ($(($variant:ident, $bare:literal, $canonical:literal)),+ $(,)?) => {
        /// The full operator vocabulary accepted in where/include trees.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum SearchOperator {
            $($variant,)+
        }

        impl SearchOperator {
            pub const ALL: &'static [SearchOperator] = &[$(SearchOperator::$variant,)+];

            /// The bare alias spelling (`ne`, `notIn`, ...).
            pub fn bare(&self) -> &'static str {
                match self {
                    $(SearchOperator::$variant => $bare,)+
                }
            }

            /// The canonical token written back into prepared trees.
            pub fn canonical(&self) -> &'static str {
                match self {
                    $(SearchOperator::$variant => $canonical,)+
                }
            }

            fn from_bare(key: &str) -> Option<Self> {
                match key {
                    $($bare => Some(SearchOperator::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

search_operators! {
    (Eq, "eq", "$eq"),
    (Ne, "ne", "$ne"),
    (Gte, "gte", "$gte"),
    (Gt, "gt", "$gt"),
    (Lte, "lte", "$lte"),
    (Lt, "lt", "$lt"),
    (Not, "not", "$not"),
    (Is, "is", "$is"),
    (In, "in", "$in"),
    (NotIn, "notIn", "$notIn"),
    (Like, "like", "$like"),
    (NotLike, "notLike", "$notLike"),
    (ILike, "iLike", "$iLike"),
    (NotILike, "notILike", "$notILike"),
    (StartsWith, "startsWith", "$startsWith"),
    (EndsWith, "endsWith", "$endsWith"),
    (Substring, "substring", "$substring"),
    (Regexp, "regexp", "$regexp"),
    (NotRegexp, "notRegexp", "$notRegexp"),
    (IRegexp, "iRegexp", "$iRegexp"),
    (NotIRegexp, "notIRegexp", "$notIRegexp"),
    (Between, "between", "$between"),
    (NotBetween, "notBetween", "$notBetween"),
    (Overlap, "overlap", "$overlap"),
    (Contains, "contains", "$contains"),
    (Contained, "contained", "$contained"),
    (Adjacent, "adjacent", "$adjacent"),
    (StrictLeft, "strictLeft", "$strictLeft"),
    (StrictRight, "strictRight", "$strictRight"),
    (NoExtendRight, "noExtendRight", "$noExtendRight"),
    (NoExtendLeft, "noExtendLeft", "$noExtendLeft"),
    (And, "and", "$and"),
    (Or, "or", "$or"),
    (Any, "any", "$any"),
    (All, "all", "$all"),
    (Col, "col", "$col"),
}

impl SearchOperator {
    /// Resolve either spelling of an operator key.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::from_bare(key.strip_prefix('$').unwrap_or(key))
    }
}

/// Rewrite every recognized operator key in the tree (recursively, through
/// objects and arrays) to its canonical token.
pub fn replace_operators(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let keys: Vec<String> = map.keys().cloned().collect();
            for key in keys {
                if let Some(mut inner) = map.remove(&key) {
                    replace_operators(&mut inner);
                    let canonical = SearchOperator::from_key(&key)
                        .map(|op| op.canonical().to_string())
                        .unwrap_or(key);
                    map.insert(canonical, inner);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                replace_operators(item);
            }
        }
        _ => {}
    }
}

/// Outcome of a whitelist check: `operators` lists every disallowed operator
/// encountered, in canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhitelistCheck {
    pub success: bool,
    pub operators: Vec<String>,
}

/// Permitted-operator table: canonical-or-alias name -> allowed flag. An
/// operator passes if its canonical form or any alias is present and truthy.
#[derive(Debug, Clone, Default)]
pub struct OperatorWhitelist {
    entries: HashMap<String, bool>,
}

impl OperatorWhitelist {
    pub fn new(entries: HashMap<String, bool>) -> Self {
        OperatorWhitelist { entries }
    }

    /// Convenience constructor allowing a fixed operator set.
    pub fn allowing<I, S>(ops: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        OperatorWhitelist {
            entries: ops.into_iter().map(|s| (s.into(), true)).collect(),
        }
    }

    pub fn allows(&self, op: SearchOperator) -> bool {
        self.entries.get(op.canonical()).copied().unwrap_or(false)
            || self.entries.get(op.bare()).copied().unwrap_or(false)
    }

    /// Walk a where/include tree collecting every operator-shaped key; report
    /// all disallowed operators, not just the first.
    pub fn check(&self, tree: &Value) -> WhitelistCheck {
        let mut disallowed: Vec<String> = Vec::new();
        self.walk(tree, &mut disallowed);
        WhitelistCheck {
            success: disallowed.is_empty(),
            operators: disallowed,
        }
    }

    fn walk(&self, value: &Value, disallowed: &mut Vec<String>) {
        match value {
            Value::Object(map) => {
                for (key, inner) in map {
                    if let Some(op) = SearchOperator::from_key(key) {
                        let canonical = op.canonical().to_string();
                        if !self.allows(op) && !disallowed.contains(&canonical) {
                            disallowed.push(canonical);
                        }
                    }
                    self.walk(inner, disallowed);
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.walk(item, disallowed);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn both_spellings_resolve_to_one_canonical_token() {
        for op in SearchOperator::ALL {
            assert_eq!(SearchOperator::from_key(op.bare()), Some(*op));
            assert_eq!(SearchOperator::from_key(op.canonical()), Some(*op));
        }
        assert_eq!(SearchOperator::from_key("nope"), None);
    }

    #[test]
    fn replace_is_spelling_independent() {
        let mut legacy = json!({ "value1": { "$ne": "x" }, "$or": [{ "a": { "$like": "%y%" } }] });
        let mut bare = json!({ "value1": { "ne": "x" }, "or": [{ "a": { "like": "%y%" } }] });
        replace_operators(&mut legacy);
        replace_operators(&mut bare);
        assert_eq!(legacy, bare);
        assert_eq!(
            legacy,
            json!({ "value1": { "$ne": "x" }, "$or": [{ "a": { "$like": "%y%" } }] })
        );
    }

    #[test]
    fn field_names_survive_replacement() {
        let mut tree = json!({ "status": "open", "nested": { "inner": 1 } });
        let before = tree.clone();
        replace_operators(&mut tree);
        assert_eq!(tree, before);
    }

    #[test]
    fn whitelist_accepts_either_spelling() {
        let wl = OperatorWhitelist::allowing(["eq", "$like"]);
        assert!(wl.allows(SearchOperator::Eq));
        assert!(wl.allows(SearchOperator::Like));
        assert!(!wl.allows(SearchOperator::Or));
    }

    #[test]
    fn check_reports_every_disallowed_operator() {
        let wl = OperatorWhitelist::allowing(["eq"]);
        let tree = json!({
            "a": { "$like": "%x%" },
            "$or": [{ "b": { "eq": 1 } }, { "c": { "gt": 2 } }]
        });
        let result = wl.check(&tree);
        assert!(!result.success);
        let mut ops = result.operators.clone();
        ops.sort();
        assert_eq!(ops, vec!["$gt", "$like", "$or"]);
    }

    #[test]
    fn falsy_whitelist_entry_disallows() {
        let mut entries = HashMap::new();
        entries.insert("like".to_string(), false);
        let wl = OperatorWhitelist::new(entries);
        let result = wl.check(&json!({ "a": { "$like": "%x%" } }));
        assert_eq!(result.operators, vec!["$like"]);
    }
}
