//! Rebuild engine: payload validation and forest planning.
//!
//! A rebuild replaces one layout with the submitted forest. Everything here is
//! pure; the repository runs the planned rows inside a single transaction.

use serde_json::Value;

use crate::{
    error::{MenuError, MenuResult},
    localized::LocalizedText,
    menu::nested_set::check_depth,
    models::{MenuItemInput, page_id},
};

/// PlannedNode
///
/// A row ready for insertion. `parent` indexes into the plan itself; the plan is in
/// pre-order, so a parent always precedes its children.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedNode {
    pub parent: Option<usize>,
    pub name: LocalizedText,
    pub properties: Value,
    pub visibility: bool,
    pub left_bound: i32,
    pub right_bound: i32,
}

/// validate_forest
///
/// Checks the whole payload before anything is touched. The first offending value is
/// reported with its path, e.g. `items[2].children[0].properties.target.type`.
/// Forests nested deeper than [`MAX_MENU_DEPTH`](crate::menu::nested_set::MAX_MENU_DEPTH)
/// are rejected at the first item past the limit.
pub fn validate_forest(items: &[MenuItemInput]) -> MenuResult<()> {
    validate_level(items, "items", 0)
}

fn validate_level(items: &[MenuItemInput], prefix: &str, parent_level: usize) -> MenuResult<()> {
    for (i, item) in items.iter().enumerate() {
        let path = format!("{}[{}]", prefix, i);
        check_depth(parent_level, 0, &path)?;
        validate_name(&item.name, &path)?;
        validate_properties(&item.properties, &path)?;
        validate_level(&item.children, &format!("{}.children", path), parent_level + 1)?;
    }
    Ok(())
}

/// A name map must carry at least one non-blank entry.
pub fn validate_name(name: &LocalizedText, path: &str) -> MenuResult<()> {
    if name.is_empty() {
        return Err(MenuError::validation(
            format!("{}.name", path),
            "at least one language entry is required",
        ));
    }
    if let Some((lang, _)) = name.iter().find(|(_, v)| v.trim().is_empty()) {
        return Err(MenuError::validation(
            format!("{}.name.{}", path, lang),
            "must not be blank",
        ));
    }
    Ok(())
}

/// validate_properties
///
/// `properties` must be an object whose `target` has `type` "page" (with an integer
/// `id`) or "link". Extra keys are allowed anywhere.
pub fn validate_properties(properties: &Value, path: &str) -> MenuResult<()> {
    let props_path = format!("{}.properties", path);
    let Some(props) = properties.as_object() else {
        return Err(MenuError::validation(props_path, "must be an object"));
    };

    let target_path = format!("{}.target", props_path);
    let Some(target) = props.get("target").and_then(Value::as_object) else {
        return Err(MenuError::validation(target_path, "must be an object"));
    };

    match target.get("type").and_then(Value::as_str) {
        Some("page") => match target.get("id") {
            Some(id) if page_id(id).is_some() => Ok(()),
            Some(_) => Err(MenuError::validation(
                format!("{}.id", target_path),
                "must be an integer page id",
            )),
            None => Err(MenuError::validation(
                format!("{}.id", target_path),
                "is required when type is \"page\"",
            )),
        },
        Some("link") => Ok(()),
        _ => Err(MenuError::validation(
            format!("{}.type", target_path),
            "must be \"page\" or \"link\"",
        )),
    }
}

/// plan_forest
///
/// Flattens a validated forest into pre-order rows with bounds assigned by a
/// depth-first walk starting at 1, exactly the bounds repeated `create` calls would
/// have produced.
pub fn plan_forest(items: &[MenuItemInput]) -> Vec<PlannedNode> {
    let mut plan = Vec::new();
    let mut counter = 1;
    plan_level(items, None, &mut counter, &mut plan);
    plan
}

fn plan_level(
    items: &[MenuItemInput],
    parent: Option<usize>,
    counter: &mut i32,
    plan: &mut Vec<PlannedNode>,
) {
    for item in items {
        let index = plan.len();
        plan.push(PlannedNode {
            parent,
            name: item.name.clone(),
            properties: item.properties.clone(),
            visibility: item.visibility.unwrap_or(true),
            left_bound: *counter,
            right_bound: 0,
        });
        *counter += 1;
        plan_level(&item.children, Some(index), counter, plan);
        plan[index].right_bound = *counter;
        *counter += 1;
    }
}
