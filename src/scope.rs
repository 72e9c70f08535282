//! The scope stack: layered lookup of global data, named iteration
//! variables, the implicit current item, and loop metadata.
//!
//! Frames are pushed one per `{{#foreach}}` nesting level and popped when the
//! transformer finishes an iteration's recursive descent. Conditionals do not
//! push frames — `{{#if}}` inside a loop sees exactly the loop's frame,
//! per spec.md §4.4 ("conditions do not fall back to global just because a
//! member is missing on the loop item").

use crate::value::Value;
use std::rc::Rc;

/// One loop nesting level: a current item, optional named binding, and loop
/// metadata (`@index`, `@count`, `@first`, `@last`).
#[derive(Debug, Clone)]
struct Frame {
    /// The name bound by `{{#foreach name in path}}`, if any.
    name: Option<String>,
    /// The element of the collection this iteration is processing.
    current_item: Value,
    /// Zero-based position within the collection.
    index: usize,
    /// Total length of the collection.
    count: usize,
}

impl Frame {
    fn is_first(&self) -> bool {
        self.index == 0
    }

    fn is_last(&self) -> bool {
        self.index + 1 == self.count
    }

    /// Resolves one of the reserved `@index`/`@count`/`@first`/`@last`
    /// identifiers against this frame's metadata.
    fn loop_metadata(&self, name: &str) -> Option<Value> {
        match name {
            "@index" => Some(Value::Integer(self.index as i64)),
            "@count" => Some(Value::Integer(self.count as i64)),
            "@first" => Some(Value::Bool(self.is_first())),
            "@last" => Some(Value::Bool(self.is_last())),
            _ => None,
        }
    }
}

/// A layered variable-lookup context. Cheap to clone: the global root is
/// reference-counted and frames are small.
#[derive(Debug, Clone)]
pub struct Scope {
    global: Rc<Value>,
    frames: Vec<Frame>,
}

impl Scope {
    /// Creates a root scope with no loop frames, backed by `global`.
    pub fn new(global: Value) -> Self {
        Scope { global: Rc::new(global), frames: Vec::new() }
    }

    /// Pushes a new loop frame for iteration `index` of `count`, with
    /// `current_item` bound as the element and, if `name` is given, also
    /// reachable by that identifier.
    pub fn push_loop(&self, name: Option<String>, current_item: Value, index: usize, count: usize) -> Scope {
        let mut frames = self.frames.clone();
        frames.push(Frame { name, current_item, index, count });
        Scope { global: Rc::clone(&self.global), frames }
    }

    /// The current item of the innermost loop, or the global root if not
    /// inside any loop — used for relative (`.`-prefixed) paths.
    pub fn current_item(&self) -> Option<Value> {
        match self.frames.last() {
            Some(frame) => Some(frame.current_item.clone()),
            None => Some((*self.global).clone()),
        }
    }

    /// Resolves a bare identifier per the precedence in spec.md §4.4:
    /// 1. named binding of the innermost frame,
    /// 2. property on the innermost current item,
    /// 3. named bindings and current items of enclosing frames, outward,
    /// 4. global root.
    ///
    /// `@`-prefixed identifiers are loop metadata and always resolve against
    /// the innermost frame regardless of nesting depth (spec.md §4.4).
    pub fn resolve_identifier(&self, name: &str) -> Option<Value> {
        if name.starts_with('@') {
            return self.frames.last().and_then(|f| f.loop_metadata(name));
        }

        for frame in self.frames.iter().rev() {
            if frame.name.as_deref() == Some(name) {
                return Some(frame.current_item.clone());
            }
            if let Some(value) = frame.current_item.get_member(name) {
                return Some(value);
            }
        }

        self.global.get_member(name)
    }

    /// Resolves `text` as a literal key against the same precedence chain as
    /// [`Scope::resolve_identifier`], without splitting on dots. Used by the
    /// path resolver to implement "a flat key shadows the nested path of the
    /// same spelling" (spec.md §9): `text` here is a whole dotted path
    /// spelling, e.g. `"Customer.Name"`, looked up as one member name.
    pub fn resolve_literal(&self, text: &str) -> Option<Value> {
        for frame in self.frames.iter().rev() {
            if frame.name.as_deref() == Some(text) {
                return Some(frame.current_item.clone());
            }
            if let Some(value) = frame.current_item.get_member(text) {
                return Some(value);
            }
        }
        self.global.get_member(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn mapping(entries: &[(&str, Value)]) -> Value {
        let mut map = IndexMap::new();
        for (k, v) in entries {
            map.insert((*k).to_string(), v.clone());
        }
        Value::Mapping(map)
    }

    #[test]
    fn scope_locality_item_shadows_root() {
        let root = mapping(&[("p", Value::String("root-p".into()))]);
        let scope = Scope::new(root);
        let item = mapping(&[("p", Value::String("item-p".into()))]);
        let loop_scope = scope.push_loop(None, item, 0, 1);
        assert_eq!(loop_scope.resolve_identifier("p").unwrap().to_string(), "item-p");
    }

    #[test]
    fn root_only_member_still_visible_inside_loop() {
        let root = mapping(&[("q", Value::String("root-q".into()))]);
        let scope = Scope::new(root);
        let item = mapping(&[("p", Value::String("item-p".into()))]);
        let loop_scope = scope.push_loop(None, item, 0, 1);
        assert_eq!(loop_scope.resolve_identifier("q").unwrap().to_string(), "root-q");
    }

    #[test]
    fn missing_on_item_does_not_fall_back_to_root_member_of_same_name_path() {
        // interview.settings.isEnabled: root has `interview` without `settings`,
        // each item has its own `interview.settings.isEnabled = true`.
        let mut item_interview = IndexMap::new();
        item_interview.insert(
            "settings".to_string(),
            mapping(&[("isEnabled", Value::Bool(true))]),
        );
        let item = mapping(&[("interview", Value::Mapping(item_interview))]);

        let root = mapping(&[("interview", mapping(&[]))]);
        let scope = Scope::new(root);
        let loop_scope = scope.push_loop(None, item, 0, 1);

        let interview = loop_scope.resolve_identifier("interview").unwrap();
        let settings = interview.get_member("settings").unwrap();
        let enabled = settings.get_member("isEnabled").unwrap();
        assert!(enabled.is_truthy());
    }

    #[test]
    fn loop_metadata_reports_first_and_last() {
        let scope = Scope::new(Value::Null);
        let first = scope.push_loop(None, Value::Integer(1), 0, 3);
        assert_eq!(first.resolve_identifier("@first").unwrap().to_string(), "true");
        assert_eq!(first.resolve_identifier("@last").unwrap().to_string(), "false");
        let last = scope.push_loop(None, Value::Integer(3), 2, 3);
        assert_eq!(last.resolve_identifier("@last").unwrap().to_string(), "true");
    }

    #[test]
    fn nested_loop_inner_at_metadata_is_innermost() {
        let scope = Scope::new(Value::Null);
        let outer = scope.push_loop(Some("category".into()), Value::Integer(10), 0, 2);
        let inner = outer.push_loop(None, Value::Integer(20), 1, 2);
        assert_eq!(inner.resolve_identifier("@index").unwrap().to_string(), "1");
    }

    #[test]
    fn named_binding_visible_from_inner_scope() {
        let scope = Scope::new(Value::Null);
        let outer = scope.push_loop(
            Some("category".into()),
            mapping(&[("Name", Value::String("Fruit".into()))]),
            0,
            1,
        );
        let inner = outer.push_loop(Some("item".into()), Value::Integer(1), 0, 1);
        let category = inner.resolve_identifier("category").unwrap();
        assert_eq!(category.get_member("Name").unwrap().to_string(), "Fruit");
    }
}
