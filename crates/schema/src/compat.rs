//! Compatibility of a database declaration with the live engine configuration.
//!
//! Value fields may be added to an existing database: they carry no ordering
//! and existing records simply lack them. Key fields may never be added,
//! removed, retyped or reordered, since every stored key was encoded with the
//! original key layout. Declared parameters must match the live ones.

use quill_store::{Configuration, FieldSpec};

use crate::schema::ConfigPair;

/// Outcome of comparing a proposed definition against the live one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compatibility {
    /// The database does not exist yet; the whole definition must be applied.
    Absent,
    /// The live definition already satisfies the proposal.
    Compatible,
    /// The proposal adds value fields; these pairs must be applied.
    Widened(Vec<ConfigPair>),
    /// The proposal conflicts with the live definition.
    Incompatible {
        /// Which entry conflicts.
        reason: String,
    },
}

/// Compares `proposed` (from [`Schema::define_db`](crate::Schema::define_db))
/// with the live configuration of database `name`.
///
/// Live parameters the proposal does not mention are accepted as they are.
pub fn check(name: &str, proposed: &[ConfigPair], live: &Configuration) -> Compatibility {
    let db_prefix = format!("db.{name}.");
    if live.with_prefix(&db_prefix).next().is_none() {
        return Compatibility::Absent;
    }

    let register_key = format!("db.{name}.scheme");
    let scheme_prefix = format!("{register_key}.");
    let proposed_value = |key: &str| proposed.iter().find(|p| p.key == key).map(|p| p.value.as_str());

    // Every live field must be proposed unchanged
    for (key, live_value) in live.with_prefix(&scheme_prefix) {
        let field = &key[scheme_prefix.len()..];
        match proposed_value(key) {
            None => {
                return Compatibility::Incompatible {
                    reason: format!("field '{field}' ({live_value}) is missing from the declaration"),
                };
            },
            Some(value) if value != live_value => {
                return Compatibility::Incompatible {
                    reason: format!("field '{field}' changed from '{live_value}' to '{value}'"),
                };
            },
            Some(_) => {},
        }
    }

    // Every proposed parameter must already be live with the same value
    for pair in proposed {
        let is_param = pair.key.starts_with(&db_prefix)
            && pair.key != register_key
            && !pair.key.starts_with(&scheme_prefix);
        if !is_param {
            continue;
        }
        match live.get(&pair.key) {
            Some(value) if value == pair.value => {},
            Some(value) => {
                return Compatibility::Incompatible {
                    reason: format!("parameter '{}' is '{value}', declared '{}'", pair.key, pair.value),
                };
            },
            None => {
                return Compatibility::Incompatible {
                    reason: format!("parameter '{}' is not set on the existing database", pair.key),
                };
            },
        }
    }

    // New fields widen the database as long as none of them is a key field
    let mut widened = Vec::new();
    for pair in proposed.iter().filter(|p| p.key.starts_with(&scheme_prefix)) {
        if live.contains_key(&pair.key) {
            continue;
        }
        let field = &pair.key[scheme_prefix.len()..];
        let is_key = FieldSpec::parse(&pair.value).map(|spec| spec.key_index.is_some()).unwrap_or(true);
        if is_key {
            return Compatibility::Incompatible {
                reason: format!("key field '{field}' cannot be added to an existing database"),
            };
        }
        widened.push(ConfigPair::new(register_key.as_str(), field));
        widened.push(pair.clone());
    }

    if widened.is_empty() { Compatibility::Compatible } else { Compatibility::Widened(widened) }
}
