//! Integration tests for attribute get/set/delete on the context store.

use ambient::{Context, ContextError};
use std::sync::Arc;

/// A value set on the context reads back within the same task
#[test]
fn test_basic_get_set() {
    let ctx = ambient::context();
    ctx.set("name", "Alvin".to_string());

    assert_eq!(ctx.get::<String>("name").unwrap().as_str(), "Alvin");
    assert_eq!(ctx.get_cloned::<String>("name").as_deref(), Some("Alvin"));
    assert!(ctx.keys().contains(&"name".to_string()));

    ctx.delete("name");
}

/// Deleting a key makes it read as absent, however it was set
#[test]
fn test_delete() {
    let ctx = Context::new();

    ctx.set("name", "Alvin".to_string());
    assert!(ctx.delete("name"));
    assert!(ctx.get::<String>("name").is_none());

    ctx.set_value("name", Arc::new("Alvin".to_string()));
    assert!(ctx.delete("name"));
    assert!(ctx.get_value("name").is_none());
    assert!(!ctx.contains("name"));
}

/// Deleting an unset key is a no-op, not an error
#[test]
fn test_delete_unset_key() {
    let ctx = Context::new();
    assert!(!ctx.delete("never-set"));
    assert!(ctx.get::<String>("never-set").is_none());

    ctx.set("other", 1u8);
    assert!(!ctx.delete("never-set"));
    assert_eq!(ctx.keys(), vec!["other".to_string()]);
}

#[test]
fn test_overwrite_keeps_latest_value() {
    let ctx = Context::new();
    ctx.set("count", 1u64);
    ctx.set("count", 2u64);
    assert_eq!(*ctx.get::<u64>("count").unwrap(), 2);

    // Rebinding with another type replaces the old binding entirely.
    ctx.set("count", "two".to_string());
    assert!(ctx.get::<u64>("count").is_none());
    assert_eq!(ctx.get_cloned::<String>("count").as_deref(), Some("two"));
}

#[test]
fn test_try_get_reports_type_mismatch() {
    let ctx = Context::new();
    ctx.set("id", 7i64);

    match ctx.try_get::<String>("id") {
        Err(ContextError::TypeMismatch { key, expected }) => {
            assert_eq!(key, "id");
            assert!(expected.contains("String"));
        }
        other => panic!("expected type mismatch, got {:?}", other.map(|v| v.is_some())),
    }
    assert_eq!(*ctx.try_get::<i64>("id").unwrap().unwrap(), 7);
}

/// Reserved-looking names are ordinary attributes; the tenant slot lives elsewhere
#[test]
fn test_tenant_api_names_are_plain_keys() {
    let ctx = Context::new();
    assert!(ctx.get::<String>("get_current_tenant").is_none());

    ctx.set("get_current_tenant", "just a string".to_string());
    assert!(ctx.get_current_tenant::<String>().is_none());
    assert_eq!(ctx.tenant_depth(), 0);
}

#[test]
fn test_clones_share_state() {
    let ctx = Context::new();
    let other = ctx.clone();
    ctx.set("shared", true);
    assert_eq!(other.get_cloned::<bool>("shared"), Some(true));

    // Separate stores do not.
    let unrelated = Context::new();
    assert!(unrelated.get::<bool>("shared").is_none());
}

#[test]
fn test_clear_drops_all_attributes() {
    let ctx = Context::new();
    ctx.set("a", 1u8);
    ctx.set("b", 2u8);
    assert_eq!(ctx.keys(), vec!["a".to_string(), "b".to_string()]);

    ctx.clear();
    assert!(ctx.keys().is_empty());
    assert!(ctx.get::<u8>("a").is_none());
}
