use super::*;
use serde_json::json;
use std::sync::Arc;

fn store() -> Arc<ContextStore> {
    Arc::new(ContextStore::new())
}

#[test]
fn test_child_reads_parent_value() {
    let store = store();
    let request = store.root().child();
    request.set("user", json!("ada"));
    let task = request.child();
    assert_eq!(task.get("user").unwrap(), json!("ada"));
}

#[test]
fn test_sibling_value_invisible() {
    let store = store();
    let root = store.root();
    let a = root.child();
    let b = root.child();
    a.set("x", json!(1));
    let err = b.get("x").unwrap_err();
    assert!(matches!(err, ContextError::KeyNotFound { ref key } if key == "x"));
}

#[test]
fn test_child_shadows_parent_without_writing_it() {
    let store = store();
    let parent = store.root().child();
    parent.set("k", json!("parent"));
    let child = parent.child();
    child.set("k", json!("child"));
    assert_eq!(child.get("k").unwrap(), json!("child"));
    assert_eq!(parent.get("k").unwrap(), json!("parent"));
}

#[test]
fn test_live_view_of_ancestor_writes() {
    let store = store();
    let parent = store.root().child();
    let child = parent.child();
    parent.set("late", json!(true));
    assert_eq!(child.get("late").unwrap(), json!(true));
}

#[test]
fn test_descendant_values_invisible_to_parent() {
    let store = store();
    let parent = store.root().child();
    let child = parent.child();
    child.set("inner", json!(1));
    assert!(parent.get("inner").is_err());
}

#[test]
fn test_get_or_and_typed_get() {
    let store = store();
    let unit = store.root().child();
    assert_eq!(unit.get_or("missing", json!("fallback")), json!("fallback"));
    unit.set("n", json!(42));
    let n: u32 = unit.get_as("n").unwrap();
    assert_eq!(n, 42);
    let err = unit.get_as::<String>("n").unwrap_err();
    assert!(matches!(err, ContextError::Decode { .. }));
}

#[test]
fn test_units_released_with_last_handle() {
    let store = store();
    assert_eq!(store.len(), 1);
    let request = store.root().child();
    let task = request.child();
    let request_id = request.id();
    drop(request);
    // The sub-task still pins its parent.
    assert!(store.contains(request_id));
    drop(task);
    assert!(!store.contains(request_id));
    assert_eq!(store.len(), 1);
}

#[test]
fn test_root_never_released() {
    let store = store();
    let root_id = store.root_id();
    drop(store.root());
    assert!(store.contains(root_id));
    assert!(!store.release(root_id));
}

#[test]
fn test_raw_id_api() {
    let store = store();
    let parent = store.new_unit(None);
    let child = store.new_unit(Some(parent));
    assert_eq!(store.parent_of(parent), Some(store.root_id()));
    store.set(parent, "k", json!("v")).unwrap();
    assert_eq!(store.get(child, "k").unwrap(), json!("v"));
    assert!(store.release(child));
    assert!(matches!(
        store.get(child, "k").unwrap_err(),
        ContextError::UnknownUnit { .. }
    ));
    assert!(store.set(child, "k", json!(1)).is_err());
}

#[test]
fn test_ids_are_monotonic() {
    let store = store();
    let a = store.new_unit(None);
    let b = store.new_unit(None);
    assert!(b > a);
}

#[test]
fn test_populate_well_known_keys() {
    let store = store();
    let unit = store.root().child();
    let request = RequestContext::new("post", "/global/ada?lang=en&x=1")
        .with_header("Content-Type", "application/x-www-form-urlencoded")
        .with_header("User-Agent", "test")
        .with_cookie("sid", "abc")
        .with_body("name=ada&age=36");
    populate(&unit, &request).unwrap();

    assert_eq!(unit.query().unwrap().get("lang").map(String::as_str), Some("en"));
    assert_eq!(unit.form().unwrap().get("age"), Some(&json!("36")));
    assert_eq!(unit.cookies().unwrap().get("sid").map(String::as_str), Some("abc"));

    let server = unit.server().unwrap();
    assert_eq!(server.get("REQUEST_METHOD"), Some(&json!("POST")));
    assert_eq!(server.get("REQUEST_URI"), Some(&json!("/global/ada?lang=en&x=1")));
    assert_eq!(server.get("QUERY_STRING"), Some(&json!("lang=en&x=1")));
    assert_eq!(server.get("HTTP_USER_AGENT"), Some(&json!("test")));

    let session = unit.session().unwrap();
    assert_eq!(
        session.get("UNIQUE_REQUEST_ID"),
        Some(&json!(request.request_id.to_string()))
    );
    assert!(session.get("__start_time").is_some());

    assert_eq!(unit.request().unwrap(), request);
}

#[test]
fn test_request_json_body_round_trips_base64() {
    let request = RequestContext::new("GET", "/").with_body(vec![0u8, 159, 146, 150]);
    let encoded = serde_json::to_value(&request).unwrap();
    assert!(encoded["body"].is_string());
    let decoded: RequestContext = serde_json::from_value(encoded).unwrap();
    assert_eq!(decoded.body, vec![0u8, 159, 146, 150]);
}

#[test]
fn test_json_body_is_form() {
    let request = RequestContext::new("POST", "/x")
        .with_header("content-type", "application/json")
        .with_body(r#"{"a":1}"#);
    assert_eq!(request.form().get("a"), Some(&json!(1)));
}

#[test]
fn test_spawned_subtask_sees_request_values() {
    let store = store();
    let request = store.root().child();
    request.set("user", json!("ada"));
    let handle = request
        .spawn(|unit| {
            let parent_visible = unit.get("user").unwrap();
            unit.set("local", json!(1));
            parent_visible
        })
        .unwrap();
    assert_eq!(handle.join().unwrap(), json!("ada"));
    assert!(request.get("local").is_err());
}
