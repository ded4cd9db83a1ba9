//! Generalized patches: the self-describing wire shape produced by event-diff
//! derivation (§4.5) and consumed by the replay engine (§4.6).
//!
//! Field names and the `type`/`action` discriminators are fixed by design
//! §6 and are not renamed here even where Rust naming conventions would
//! otherwise suggest `camelCase` -> `snake_case`.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::{DocumentError, DocumentResult};

/// `-1` on the wire means "append"; this is the normalized in-memory form.
pub const APPEND: i64 = -1;

/// One primitive change, with identifiers that may be concrete
/// (`"<counter>@<peer>"`) or symbolic (`"$k"`) depending on whether the
/// patch has been generalized yet (design §4.5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WirePatch", into = "WirePatch")]
pub enum Patch {
    TreeCreate {
        target: String,
        parent: String,
        index: i64,
        /// Inline node template, for a non-copy create (redundant-init
        /// suppression collapses the node's first writes into this).
        data: Option<Json>,
        /// Copy provenance: present instead of `data` when the node was
        /// produced by `copy_node` (design §4.5 rule 3).
        source_id: Option<String>,
    },
    TreeDelete {
        target: String,
    },
    TreeMove {
        target: String,
        parent: String,
        index: i64,
    },
    Map {
        target: String,
        key: String,
        value: Json,
    },
    Text {
        target: String,
        index: usize,
        delete: usize,
        insert: String,
    },
}

impl Patch {
    /// The node this patch targets, before symbolic resolution.
    pub fn target(&self) -> &str {
        match self {
            Patch::TreeCreate { target, .. }
            | Patch::TreeDelete { target }
            | Patch::TreeMove { target, .. }
            | Patch::Map { target, .. }
            | Patch::Text { target, .. } => target,
        }
    }
}

/// Flat, serde-friendly mirror of the wire shape in design §6; `Patch`
/// converts to/from this so the public enum can stay ergonomic while the
/// JSON on the wire keeps exactly the fixed field names.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WirePatch {
    r#type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    index: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Json>,
    #[serde(rename = "sourceId", default, skip_serializing_if = "Option::is_none")]
    source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delete: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    insert: Option<String>,
}

impl TryFrom<WirePatch> for Patch {
    type Error = DocumentError;

    fn try_from(w: WirePatch) -> Result<Self, Self::Error> {
        let missing = |field: &str| DocumentError::invalid_input(format!("patch missing field '{field}'"));
        let target = w.target.ok_or_else(|| missing("target"))?;

        match w.r#type.as_str() {
            "tree" => match w.action.as_deref() {
                Some("create") => Ok(Patch::TreeCreate {
                    target,
                    parent: w.parent.ok_or_else(|| missing("parent"))?,
                    index: w.index.unwrap_or(APPEND),
                    data: w.data,
                    source_id: w.source_id,
                }),
                Some("delete") => Ok(Patch::TreeDelete { target }),
                Some("move") => Ok(Patch::TreeMove {
                    target,
                    parent: w.parent.ok_or_else(|| missing("parent"))?,
                    index: w.index.unwrap_or(APPEND),
                }),
                other => Err(DocumentError::invalid_input(format!(
                    "unknown tree patch action {other:?}"
                ))),
            },
            "map" => Ok(Patch::Map {
                target,
                key: w.key.ok_or_else(|| missing("key"))?,
                value: w.value.unwrap_or(Json::Null),
            }),
            "text" => Ok(Patch::Text {
                target,
                index: w.index.unwrap_or(0).max(0) as usize,
                delete: w.delete.unwrap_or(0),
                insert: w.insert.unwrap_or_default(),
            }),
            other => Err(DocumentError::invalid_input(format!("unknown patch type '{other}'"))),
        }
    }
}

impl From<Patch> for WirePatch {
    fn from(p: Patch) -> Self {
        match p {
            Patch::TreeCreate { target, parent, index, data, source_id } => WirePatch {
                r#type: "tree".into(),
                action: Some("create".into()),
                target: Some(target),
                parent: Some(parent),
                index: Some(index),
                data,
                source_id,
                key: None,
                value: None,
                delete: None,
                insert: None,
            },
            Patch::TreeDelete { target } => WirePatch {
                r#type: "tree".into(),
                action: Some("delete".into()),
                target: Some(target),
                ..empty_wire()
            },
            Patch::TreeMove { target, parent, index } => WirePatch {
                r#type: "tree".into(),
                action: Some("move".into()),
                target: Some(target),
                parent: Some(parent),
                index: Some(index),
                ..empty_wire()
            },
            Patch::Map { target, key, value } => WirePatch {
                r#type: "map".into(),
                target: Some(target),
                key: Some(key),
                value: Some(value),
                ..empty_wire()
            },
            Patch::Text { target, index, delete, insert } => WirePatch {
                r#type: "text".into(),
                target: Some(target),
                index: Some(index as i64),
                delete: Some(delete),
                insert: Some(insert),
                ..empty_wire()
            },
        }
    }
}

fn empty_wire() -> WirePatch {
    WirePatch {
        r#type: String::new(),
        action: None,
        target: None,
        parent: None,
        index: None,
        data: None,
        source_id: None,
        key: None,
        value: None,
        delete: None,
        insert: None,
    }
}

/// Bundles patches by `target` into display groups; a pure view derivation
/// over a recorded history (design §4.5, "Grouping for UI").
pub fn group_by_target(patches: &[Patch]) -> Vec<(String, Vec<Patch>)> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: std::collections::HashMap<String, Vec<Patch>> = std::collections::HashMap::new();

    for patch in patches {
        let key = patch.target().to_string();
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(patch.clone());
    }

    order
        .into_iter()
        .map(|k| {
            let v = groups.remove(&k).unwrap_or_default();
            (k, v)
        })
        .collect()
}

/// Walks a JSON-like value, substituting every string that matches
/// `vars`'s key through the map, leaving unmatched strings (including
/// still-unresolved symbols) untouched. This models the "reflection over
/// `Record<string, unknown>` patch values" replacement described in
/// design §9 as a uniform tree walk with a substitution predicate.
pub fn substitute(value: &Json, vars: &std::collections::HashMap<String, String>) -> Json {
    match value {
        Json::String(s) => match vars.get(s) {
            Some(resolved) => Json::String(resolved.clone()),
            None => Json::String(s.clone()),
        },
        Json::Array(items) => Json::Array(items.iter().map(|v| substitute(v, vars)).collect()),
        Json::Object(map) => Json::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute(v, vars)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_tree_create_through_wire_shape() {
        let patch = Patch::TreeCreate {
            target: "$1".into(),
            parent: "0@1".into(),
            index: APPEND,
            data: Some(json!({"kind": "element", "tag": "li"})),
            source_id: None,
        };
        let wire = serde_json::to_value(&patch).unwrap();
        assert_eq!(wire["type"], "tree");
        assert_eq!(wire["action"], "create");
        assert_eq!(wire["index"], -1);

        let back: Patch = serde_json::from_value(wire).unwrap();
        assert_eq!(back, patch);
    }

    #[test]
    fn substitutes_symbols_recursively() {
        let mut vars = std::collections::HashMap::new();
        vars.insert("$0".to_string(), "5@9".to_string());
        let data = json!({"kind": "ref", "target": "$0"});
        let resolved = substitute(&data, &vars);
        assert_eq!(resolved["target"], "5@9");
    }

    #[test]
    fn groups_by_target_preserving_first_seen_order() {
        let a = Patch::TreeDelete { target: "1@1".into() };
        let b = Patch::TreeDelete { target: "2@1".into() };
        let c = Patch::Map { target: "1@1".into(), key: "k".into(), value: Json::Null };
        let groups = group_by_target(&[a.clone(), b.clone(), c.clone()]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "1@1");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, "2@1");
    }
}
