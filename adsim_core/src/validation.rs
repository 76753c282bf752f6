//! Declarative field rules evaluated against create and update payloads.
//!
//! Every platform describes its resources as an ordered `&'static [Rule]`
//! table. Evaluation walks the table once, stops at the first violation and
//! hands back the parent references it saw so the caller can check them
//! against storage afterwards.

use serde_json::{Map, Value};

use crate::error::{Constraint, ValidationError};
use crate::platform::PlatformAdapter;
use crate::resource::types::ResourceType;

/// Whether a payload creates a resource or patches an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Create,
    Update,
}

/// One entry of a rule table. Paths are dotted (`budget.amount`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Must be present and non-blank on create. On update it may be left
    /// out, but not blanked.
    Required(&'static str),
    /// When present, must not be an empty string, array or object.
    NonEmpty(&'static str),
    /// When present, must be one of the listed strings.
    OneOf(&'static str, &'static [&'static str]),
    /// When present, must be a number (or numeric string) above zero.
    Positive(&'static str),
    /// When present, must be an array whose every element is listed.
    Elements(&'static str, &'static [&'static str]),
    /// Required on create when another field holds a given value.
    RequiredWhen {
        field: &'static str,
        when: &'static str,
        equals: &'static str,
    },
    /// May not differ from the stored value on update.
    Immutable(&'static str),
    /// Holds a reference to a parent that must exist in the same scope.
    Reference(&'static str, ResourceType),
}

/// A parent reference found in a payload, not yet resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub field: &'static str,
    pub target: ResourceType,
    pub raw: Value,
}

/// Runs the adapter's table for `resource_type` against `fields`.
///
/// `existing` carries the stored fields on update and feeds the
/// [`Rule::Immutable`] checks.
pub fn check(
    adapter: &dyn PlatformAdapter,
    resource_type: ResourceType,
    mode: Mode,
    fields: &Map<String, Value>,
    existing: Option<&Map<String, Value>>,
) -> Result<Vec<Reference>, ValidationError> {
    evaluate(adapter.rules(resource_type), mode, fields, existing, |constraint| {
        adapter.violation_code(constraint)
    })
}

/// Table evaluation with an explicit code mapper.
pub fn evaluate(
    rules: &[Rule],
    mode: Mode,
    fields: &Map<String, Value>,
    existing: Option<&Map<String, Value>>,
    code: impl Fn(&Constraint) -> String,
) -> Result<Vec<Reference>, ValidationError> {
    let fail = |field: &str, constraint: Constraint| {
        let code = code(&constraint);
        Err(ValidationError::new(field, constraint, code))
    };
    let mut references = Vec::new();

    for rule in rules {
        match *rule {
            Rule::Required(path) => match lookup(fields, path) {
                None if mode == Mode::Create => return fail(path, Constraint::Required),
                Some(value) if is_blank(value) => return fail(path, Constraint::Required),
                _ => {}
            },
            Rule::NonEmpty(path) => {
                if let Some(value) = present(fields, path) {
                    if is_empty(value) {
                        return fail(path, Constraint::NonEmpty);
                    }
                }
            }
            Rule::OneOf(path, allowed) => {
                if let Some(value) = present(fields, path) {
                    if !value.as_str().is_some_and(|v| allowed.contains(&v)) {
                        return fail(path, Constraint::OneOf(allowed));
                    }
                }
            }
            Rule::Positive(path) => {
                if let Some(value) = present(fields, path) {
                    if !as_number(value).is_some_and(|n| n > 0.0) {
                        return fail(path, Constraint::Positive);
                    }
                }
            }
            Rule::Elements(path, allowed) => {
                if let Some(value) = present(fields, path) {
                    let valid = value.as_array().is_some_and(|items| {
                        items
                            .iter()
                            .all(|item| item.as_str().is_some_and(|v| allowed.contains(&v)))
                    });
                    if !valid {
                        return fail(path, Constraint::Elements(allowed));
                    }
                }
            }
            Rule::RequiredWhen { field, when, equals } => {
                if mode == Mode::Create
                    && lookup(fields, when).and_then(Value::as_str) == Some(equals)
                    && present(fields, field).is_none_or(is_blank)
                {
                    return fail(field, Constraint::Required);
                }
            }
            Rule::Immutable(path) => {
                if mode == Mode::Update {
                    if let (Some(proposed), Some(stored)) = (lookup(fields, path), existing) {
                        if lookup(stored, path) != Some(proposed) {
                            return fail(path, Constraint::Immutable);
                        }
                    }
                }
            }
            Rule::Reference(path, target) => {
                if let Some(value) = present(fields, path) {
                    references.push(Reference { field: path, target, raw: value.clone() });
                }
            }
        }
    }
    Ok(references)
}

/// Resolves a dotted path inside a JSON object.
pub fn lookup<'a>(fields: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = fields.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Like [`lookup`], but treats an explicit `null` as absent.
fn present<'a>(fields: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    lookup(fields, path).filter(|value| !value.is_null())
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Numbers and numeric strings (`"1500000"`), as sent by the platforms that
/// serialise money as strings. `inf` and `NaN` are not numbers here.
pub fn as_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const STATUSES: &[&str] = &["ACTIVE", "PAUSED"];
    const PLACEMENTS: &[&str] = &["FEED", "STORY"];

    const RULES: &[Rule] = &[
        Rule::Required("name"),
        Rule::NonEmpty("name"),
        Rule::OneOf("status", STATUSES),
        Rule::Positive("budget.amount"),
        Rule::Elements("placements", PLACEMENTS),
        Rule::RequiredWhen { field: "bid", when: "bidding", equals: "MANUAL" },
        Rule::Immutable("objective"),
        Rule::Reference("parent_id", ResourceType::MetaCampaign),
    ];

    fn run(mode: Mode, fields: Value, existing: Option<Value>) -> Result<Vec<Reference>, ValidationError> {
        let fields = fields.as_object().cloned().unwrap();
        let existing = existing.map(|e| e.as_object().cloned().unwrap());
        evaluate(RULES, mode, &fields, existing.as_ref(), |c| format!("{:?}", c))
    }

    #[test]
    fn first_violation_wins() {
        let err = run(Mode::Create, json!({"status": "BOGUS"}), None).unwrap_err();
        assert_eq!(err.field, "name");
        assert_eq!(err.constraint, Constraint::Required);
        assert_eq!(err.code, "Required");
    }

    #[test]
    fn required_is_create_only_but_blocks_blanking() {
        assert!(run(Mode::Update, json!({"status": "PAUSED"}), None).is_ok());
        let err = run(Mode::Update, json!({"name": null}), None).unwrap_err();
        assert_eq!(err.constraint, Constraint::Required);
        let err = run(Mode::Update, json!({"name": "  "}), None).unwrap_err();
        assert_eq!(err.constraint, Constraint::Required);
    }

    #[test]
    fn vocabularies_and_numbers() {
        let err = run(Mode::Create, json!({"name": "a", "status": "LIVE"}), None).unwrap_err();
        assert_eq!(err.constraint, Constraint::OneOf(STATUSES));

        let err = run(Mode::Create, json!({"name": "a", "budget": {"amount": "0"}}), None).unwrap_err();
        assert_eq!(err.field, "budget.amount");
        assert_eq!(err.constraint, Constraint::Positive);
        assert!(run(Mode::Create, json!({"name": "a", "budget": {"amount": "12.5"}}), None).is_ok());

        let err = run(Mode::Create, json!({"name": "a", "placements": ["FEED", "REELS"]}), None).unwrap_err();
        assert_eq!(err.constraint, Constraint::Elements(PLACEMENTS));
        assert!(run(Mode::Create, json!({"name": "a", "placements": []}), None).is_ok());
    }

    #[test]
    fn non_finite_strings_are_not_positive() {
        for amount in ["inf", "+infinity", "NaN", "1e400"] {
            let err = run(Mode::Create, json!({"name": "a", "budget": {"amount": amount}}), None).unwrap_err();
            assert_eq!(err.constraint, Constraint::Positive, "{}", amount);
        }
        assert_eq!(as_number(&json!("1e3")), Some(1000.0));
    }

    #[test]
    fn conditional_requirement() {
        let err = run(Mode::Create, json!({"name": "a", "bidding": "MANUAL"}), None).unwrap_err();
        assert_eq!(err.field, "bid");
        assert!(run(Mode::Create, json!({"name": "a", "bidding": "AUTO"}), None).is_ok());
        assert!(run(Mode::Update, json!({"bidding": "MANUAL"}), None).is_ok());
    }

    #[test]
    fn immutable_fields_only_checked_on_update() {
        let stored = json!({"name": "a", "objective": "SALES"});
        assert!(run(Mode::Update, json!({"objective": "SALES"}), Some(stored.clone())).is_ok());
        let err = run(Mode::Update, json!({"objective": "LEADS"}), Some(stored)).unwrap_err();
        assert_eq!(err.constraint, Constraint::Immutable);
        assert!(run(Mode::Create, json!({"name": "a", "objective": "LEADS"}), None).is_ok());
    }

    #[test]
    fn references_are_collected_not_resolved() {
        let refs = run(Mode::Create, json!({"name": "a", "parent_id": 42}), None).unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].field, "parent_id");
        assert_eq!(refs[0].raw, json!(42));
    }

    #[test]
    fn dotted_lookup() {
        let fields = json!({"a": {"b": {"c": 1}}, "x": 2});
        let fields = fields.as_object().unwrap();
        assert_eq!(lookup(fields, "a.b.c"), Some(&json!(1)));
        assert_eq!(lookup(fields, "x.y"), None);
        assert_eq!(lookup(fields, "missing"), None);
    }
}
