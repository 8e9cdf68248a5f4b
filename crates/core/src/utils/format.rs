use crate::consts::DEFAULT_SUMMARY_DEPTH;
use crate::values::Value;

#[derive(Debug, Clone)]
pub struct FormatOptions {
    /// Print the type of every child, not just the top-level value
    pub show_types: bool,
    /// Show proxy class names instead of the classes they stand in for
    pub raw_types: bool,
    pub depth: usize,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            show_types: false,
            raw_types: false,
            depth: DEFAULT_SUMMARY_DEPTH,
        }
    }
}

/// Renders a value the way `frame variable` prints it:
/// `(SourceDerived *) object = 0x0000000000003000 { ... }`
pub fn format_value(value: &Value, label: &str, options: &FormatOptions) -> String {
    let mut out = String::new();
    write_value(&mut out, value, label, options, 0, true);
    out
}

fn type_label(value: &Value, options: &FormatOptions) -> String {
    if options.raw_types {
        value.raw_type_name().to_string()
    } else {
        value.type_name().to_string()
    }
}

fn write_value(
    out: &mut String,
    value: &Value,
    label: &str,
    options: &FormatOptions,
    level: usize,
    with_type: bool,
) {
    let indent = "  ".repeat(level);
    out.push_str(&indent);
    if with_type {
        out.push_str(&format!("({}) ", type_label(value, options)));
    }
    out.push_str(label);

    if let Some(text) = value.value_string() {
        out.push_str(" = ");
        out.push_str(&text);
    } else if value.child_names().is_empty() {
        out.push_str(" = <unavailable>");
    }

    let children = if level < options.depth {
        value.child_names()
    } else {
        Vec::new()
    };

    if !children.is_empty() {
        out.push_str(" {\n");
        for name in children {
            match value.get_child_member_with_name(&name, value.policy()) {
                Ok(child) => {
                    write_value(out, &child, &name, options, level + 1, options.show_types);
                }
                Err(e) => {
                    out.push_str(&format!("{}  {} = <error: {}>", indent, name, e));
                }
            }
            out.push('\n');
        }
        out.push_str(&indent);
        out.push('}');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LensConfig, ResolutionPolicy, SnapshotFile};
    use crate::snapshot::load_session;

    fn evaluate(path: &str, policy: ResolutionPolicy) -> Value {
        let snapshot =
            SnapshotFile::from_json(include_str!("../../tests/fixtures/kvo_observer.json")).unwrap();
        let session = load_session(snapshot, LensConfig::default()).unwrap();
        session.frame(1).unwrap().evaluate(path, policy).unwrap()
    }

    #[test]
    fn test_types_never_show_proxy() {
        let value = evaluate("myObserver->_source", ResolutionPolicy::DynamicAllowRunTarget);
        let options = FormatOptions {
            show_types: true,
            ..FormatOptions::default()
        };
        let text = format_value(&value, "myObserver->_source", &options);

        assert!(text.starts_with("(SourceDerived *) myObserver->_source = 0x0000000000003000 {"));
        assert!(text.contains("  (int) _derivedValue = 30\n"));
        assert!(!text.contains("NSKVONotify"));
    }

    #[test]
    fn test_raw_types() {
        let value = evaluate("myObserver->_source", ResolutionPolicy::DynamicAllowRunTarget);
        let options = FormatOptions {
            raw_types: true,
            ..FormatOptions::default()
        };
        let text = format_value(&value, "myObserver->_source", &options);

        assert!(text.starts_with("(NSKVONotifying_SourceDerived *) "));
        assert!(text.contains("  _derivedValue = 30\n"));
    }

    #[test]
    fn test_static_and_scalar_values() {
        let value = evaluate("myObserver->_source", ResolutionPolicy::NoDynamic);
        let text = format_value(&value, "_source", &FormatOptions::default());
        assert!(text.starts_with("(Source *) _source = 0x0000000000003000 {"));
        assert!(!text.contains("_derivedValue"));

        let counter = evaluate("counter", ResolutionPolicy::DynamicNoRunTarget);
        assert_eq!(
            format_value(&counter, "counter", &FormatOptions::default()),
            "(int) counter = 7"
        );

        let null = evaluate("nullObject", ResolutionPolicy::DynamicNoRunTarget);
        assert_eq!(
            format_value(&null, "nullObject", &FormatOptions::default()),
            "(SourceBase *) nullObject = 0x0000000000000000"
        );
    }
}
