//! In-memory manifest schema migrations.
//!
//! Migrations operate on raw JSON so older layouts never have to be
//! representable by the current types. The next State Manager write persists
//! the migrated form.

use crate::manifest::SCHEMA_VERSION;
use serde_json::{Map, Value};

/// Bring a raw manifest up to [`SCHEMA_VERSION`].
pub fn migrate_manifest(mut value: Value) -> Result<Value, String> {
    let Some(obj) = value.as_object_mut() else {
        return Err("manifest must be a JSON object".to_string());
    };

    let version = match obj.get("schema_version") {
        None => 1,
        Some(v) => v
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| format!("schema_version must be a positive integer, got {v}"))?,
    };

    if version > SCHEMA_VERSION {
        return Err(format!(
            "schema_version {version} is newer than supported version {SCHEMA_VERSION}"
        ));
    }

    if version < 2 {
        migrate_v1_to_v2(obj)?;
    }
    normalize_flat_phase_history(obj);

    Ok(value)
}

// ---------------------------------------------------------------------------
// v1 -> v2
// ---------------------------------------------------------------------------

/// v1 kept phases under `phases.<spec|plan|build|docs>` with `finalized_at`
/// as the end marker, and checkpoint progress under `plan_state`.
fn migrate_v1_to_v2(obj: &mut Map<String, Value>) -> Result<(), String> {
    if let Some(Value::Object(phases)) = obj.remove("phases") {
        let mut history = Map::new();
        for (legacy, current) in [
            ("spec", "intent"),
            ("plan", "design"),
            ("build", "execute"),
            ("docs", "document"),
        ] {
            let Some(Value::Object(span)) = phases.get(legacy) else {
                continue;
            };
            let started = span.get("started_at").cloned().unwrap_or(Value::Null);
            let completed = span
                .get("finalized_at")
                .or_else(|| span.get("completed_at"))
                .cloned()
                .unwrap_or(Value::Null);
            history.insert(
                current.to_string(),
                serde_json::json!({ "started_at": started, "completed_at": completed }),
            );
        }
        obj.entry("phase_history")
            .or_insert_with(|| Value::Object(history));
    }

    if let Some(plan_state) = obj.remove("plan_state") {
        obj.entry("build_progress").or_insert(plan_state);
    }

    if let Some(Value::Array(commits)) = obj.get_mut("commits") {
        for commit in commits.iter_mut().filter_map(Value::as_object_mut) {
            if let Some(cp) = commit.remove("checkpoint_id") {
                commit.entry("checkpoint").or_insert(cp);
            }
        }
    }

    let created_at = obj
        .get("created_at")
        .cloned()
        .ok_or_else(|| "missing created_at".to_string())?;
    obj.entry("updated_at").or_insert(created_at.clone());
    if let Some(Value::Array(commits)) = obj.get_mut("commits") {
        for commit in commits.iter_mut().filter_map(Value::as_object_mut) {
            commit
                .entry("created_at")
                .or_insert_with(|| created_at.clone());
        }
    }

    obj.entry("current_phase")
        .or_insert_with(|| Value::String("intent".to_string()));
    obj.entry("status")
        .or_insert_with(|| Value::String("active".to_string()));
    if !obj.contains_key("topic") {
        let topic = obj.get("session_id").cloned().unwrap_or(Value::Null);
        obj.insert("topic".to_string(), topic);
    }

    obj.insert("schema_version".to_string(), Value::from(2));
    Ok(())
}

/// Some writers stored history as flat `<phase>_started_at` /
/// `<phase>_completed_at` keys using the legacy phase names.
fn normalize_flat_phase_history(obj: &mut Map<String, Value>) {
    let Some(Value::Object(history)) = obj.get_mut("phase_history") else {
        return;
    };
    if !history.keys().any(|k| k.ends_with("_started_at") || k.ends_with("_completed_at")) {
        return;
    }
    let flat = std::mem::take(history);
    for (legacy, current) in [
        ("spec", "intent"),
        ("plan", "design"),
        ("build", "execute"),
        ("docs", "document"),
        ("intent", "intent"),
        ("design", "design"),
        ("execute", "execute"),
        ("document", "document"),
    ] {
        let started = flat.get(&format!("{legacy}_started_at"));
        let completed = flat.get(&format!("{legacy}_completed_at"));
        if started.is_none() && completed.is_none() {
            continue;
        }
        history.insert(
            current.to_string(),
            serde_json::json!({
                "started_at": started.cloned().unwrap_or(Value::Null),
                "completed_at": completed.cloned().unwrap_or(Value::Null),
            }),
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
