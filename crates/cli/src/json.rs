//! JSON documents as plan contexts.

use serde_json::{Map, Value as Json};
use stageplan_decision::{Value, Variable};
use stageplan_execution::{Stage, StageError};

/// JSON pointer for a dotted field path (`a.b` becomes `/a/b`).
pub fn field_pointer(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path.replace('.', "/"))
    }
}

/// Variable reading a field of the document; missing fields read as null.
pub fn field_variable(path: &str) -> Variable<Json> {
    let pointer = field_pointer(path);
    Variable::primary(path, move |doc: &Json| Value::from(doc.pointer(&pointer)))
}

fn slot<'a>(doc: &'a mut Json, path: &str) -> Result<&'a mut Json, StageError> {
    let mut current = doc;
    for part in path.split('.') {
        if current.is_null() {
            *current = Json::Object(Map::new());
        }
        let object = current.as_object_mut().ok_or_else(|| {
            StageError::new(format!("Cannot reach {}: {} is not inside an object", path, part))
        })?;
        current = object.entry(part.to_string()).or_insert(Json::Null);
    }
    Ok(current)
}

/// Stage assigning fields of the document.
pub fn set_stage(name: impl Into<String>, fields: Map<String, Json>) -> Stage<Json> {
    Stage::sync(name, move |doc: &mut Json| {
        for (path, value) in &fields {
            *slot(doc, path)? = value.clone();
        }
        Ok(())
    })
}

/// Stage appending a value to an array field, creating it when missing.
pub fn append_stage(name: impl Into<String>, field: String, value: Json) -> Stage<Json> {
    Stage::sync(name, move |doc: &mut Json| {
        let target = slot(doc, &field)?;
        if target.is_null() {
            *target = Json::Array(Vec::new());
        }
        match target.as_array_mut() {
            Some(items) => {
                items.push(value.clone());
                Ok(())
            }
            None => Err(StageError::new(format!("Field {} is not an array", field))),
        }
    })
}

/// Merge two documents produced by branches that ran side by side.
///
/// Objects merge key by key, arrays keep the left items and add the right
/// items missing from the left, anything else is taken from the right.
pub fn merge(left: Json, right: Json) -> Json {
    match (left, right) {
        (Json::Object(mut left), Json::Object(right)) => {
            for (key, value) in right {
                let merged = match left.remove(&key) {
                    Some(existing) => merge(existing, value),
                    None => value,
                };
                left.insert(key, merged);
            }
            Json::Object(left)
        }
        (Json::Array(mut left), Json::Array(right)) => {
            for item in right {
                if !left.contains(&item) {
                    left.push(item);
                }
            }
            Json::Array(left)
        }
        (_, right) => right,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stageplan_decision::LiveContext;
    use stageplan_decision::DecisionContext;

    #[test]
    fn test_field_pointer() {
        assert_eq!(field_pointer("a"), "/a");
        assert_eq!(field_pointer("a.b"), "/a/b");
        assert_eq!(field_pointer("/x/0"), "/x/0");
    }

    #[test]
    fn test_field_variable() {
        let doc = json!({"user": {"role": "admin"}, "count": 3});
        let context = LiveContext::new(&doc);

        assert_eq!(context.get(&field_variable("user.role")).unwrap(), Value::from("admin"));
        assert_eq!(context.get(&field_variable("count")).unwrap(), Value::from(3i64));
        assert_eq!(context.get(&field_variable("missing")).unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_set_stage_creates_nested_fields() {
        let fields = json!({"status": "done", "meta.by": "bot"});
        let stage = set_stage("set", fields.as_object().unwrap().clone());

        let out = stage.call(json!({})).await.unwrap();
        assert_eq!(out, json!({"status": "done", "meta": {"by": "bot"}}));
    }

    #[tokio::test]
    async fn test_set_stage_rejects_non_object() {
        let fields = json!({"a.b": 1});
        let stage = set_stage("set", fields.as_object().unwrap().clone());

        assert!(stage.call(json!({"a": 5})).await.is_err());
    }

    #[tokio::test]
    async fn test_append_stage() {
        let stage = append_stage("log", "log".to_string(), json!("x"));

        let out = stage.call(json!({})).await.unwrap();
        assert_eq!(out, json!({"log": ["x"]}));

        let out = stage.call(out).await.unwrap();
        assert_eq!(out, json!({"log": ["x", "x"]}));

        assert!(stage.call(json!({"log": 1})).await.is_err());
    }

    #[test]
    fn test_merge() {
        let left = json!({"log": ["a", "b"], "status": "left", "only_left": 1});
        let right = json!({"log": ["a", "c"], "status": "right", "nested": {"x": 1}});

        assert_eq!(
            merge(left, right),
            json!({
                "log": ["a", "b", "c"],
                "status": "right",
                "only_left": 1,
                "nested": {"x": 1}
            })
        );
    }
}
