//! Kernel fragments and the expression-provider contract.
//!
//! A fragment contributes expression text, argument declarations, library
//! text and optionally layout metadata. Three adapters exist, one per way a
//! caller usually has this information at hand: a bare string, a struct with
//! named fields, or a key/value mapping.

use std::collections::BTreeMap;

use crate::layout::LayoutSpec;
use crate::schema::ArgumentSpec;
use crate::{CodegenError, CodegenResult};

/// Mapping key holding the expression text.
pub const KEY_EXPRESSION: &str = "expression";
/// Mapping key holding the argument declarations.
pub const KEY_ARGUMENTS: &str = "arguments";
/// Mapping key holding library text.
pub const KEY_LIBRARY: &str = "library";
/// Mapping key holding layout metadata.
pub const KEY_LAYOUT: &str = "layout";

/// Read access to the parts of a fragment.
pub trait ExpressionProvider {
    /// Expression (body) text, if any.
    fn expression_text(&self) -> Option<&str>;

    /// Argument declarations contributed by this fragment.
    fn arguments(&self) -> &[ArgumentSpec];

    /// Helper functions or other text emitted before the kernel.
    fn library_text(&self) -> Option<&str>;

    /// Layout metadata, if the fragment carries any.
    fn layout(&self) -> Option<&LayoutSpec>;
}

/// A fragment that is only expression text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFragment(pub String);

impl ExpressionProvider for TextFragment {
    fn expression_text(&self) -> Option<&str> {
        Some(self.0.as_str())
    }

    fn arguments(&self) -> &[ArgumentSpec] {
        &[]
    }

    fn library_text(&self) -> Option<&str> {
        None
    }

    fn layout(&self) -> Option<&LayoutSpec> {
        None
    }
}

/// A fragment with named parts.
#[derive(Debug, Clone, Default)]
pub struct ObjectFragment {
    /// Expression text.
    pub expression: Option<String>,
    /// Argument declarations.
    pub arguments: Vec<ArgumentSpec>,
    /// Library text.
    pub library: Option<String>,
    /// Layout metadata.
    pub layout: Option<LayoutSpec>,
}

impl ObjectFragment {
    /// Create a fragment with the given expression.
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: Some(expression.into()),
            ..Default::default()
        }
    }

    /// Add an argument declaration.
    pub fn with_argument(mut self, argument: ArgumentSpec) -> Self {
        self.arguments.push(argument);
        self
    }

    /// Add several argument declarations.
    pub fn with_arguments(mut self, arguments: impl IntoIterator<Item = ArgumentSpec>) -> Self {
        self.arguments.extend(arguments);
        self
    }

    /// Set the library text.
    pub fn with_library(mut self, library: impl Into<String>) -> Self {
        self.library = Some(library.into());
        self
    }

    /// Set the layout metadata.
    pub fn with_layout(mut self, layout: LayoutSpec) -> Self {
        self.layout = Some(layout);
        self
    }
}

impl ExpressionProvider for ObjectFragment {
    fn expression_text(&self) -> Option<&str> {
        self.expression.as_deref()
    }

    fn arguments(&self) -> &[ArgumentSpec] {
        &self.arguments
    }

    fn library_text(&self) -> Option<&str> {
        self.library.as_deref()
    }

    fn layout(&self) -> Option<&LayoutSpec> {
        self.layout.as_ref()
    }
}

/// A value stored in a [`MappingFragment`].
#[derive(Debug, Clone)]
pub enum FragmentValue {
    /// Text (expression or library).
    Text(String),
    /// Argument declarations.
    Arguments(Vec<ArgumentSpec>),
    /// Layout metadata.
    Layout(LayoutSpec),
}

impl From<&str> for FragmentValue {
    fn from(text: &str) -> Self {
        FragmentValue::Text(text.to_string())
    }
}

impl From<String> for FragmentValue {
    fn from(text: String) -> Self {
        FragmentValue::Text(text)
    }
}

impl From<Vec<ArgumentSpec>> for FragmentValue {
    fn from(arguments: Vec<ArgumentSpec>) -> Self {
        FragmentValue::Arguments(arguments)
    }
}

impl From<LayoutSpec> for FragmentValue {
    fn from(layout: LayoutSpec) -> Self {
        FragmentValue::Layout(layout)
    }
}

/// A fragment stored as a key/value mapping.
///
/// Recognised keys are [`KEY_EXPRESSION`], [`KEY_ARGUMENTS`], [`KEY_LIBRARY`]
/// and [`KEY_LAYOUT`]. Other keys are kept but ignored; a key holding the
/// wrong kind of value reads as absent.
#[derive(Debug, Clone, Default)]
pub struct MappingFragment {
    entries: BTreeMap<String, FragmentValue>,
}

impl MappingFragment {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FragmentValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a value, replacing any previous value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FragmentValue>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Raw access to a key.
    pub fn get(&self, key: &str) -> Option<&FragmentValue> {
        self.entries.get(key)
    }

    fn text(&self, key: &str) -> Option<&str> {
        match self.entries.get(key) {
            Some(FragmentValue::Text(text)) => Some(text.as_str()),
            _ => None,
        }
    }
}

impl ExpressionProvider for MappingFragment {
    fn expression_text(&self) -> Option<&str> {
        self.text(KEY_EXPRESSION)
    }

    fn arguments(&self) -> &[ArgumentSpec] {
        match self.entries.get(KEY_ARGUMENTS) {
            Some(FragmentValue::Arguments(arguments)) => arguments.as_slice(),
            _ => &[],
        }
    }

    fn library_text(&self) -> Option<&str> {
        self.text(KEY_LIBRARY)
    }

    fn layout(&self) -> Option<&LayoutSpec> {
        match self.entries.get(KEY_LAYOUT) {
            Some(FragmentValue::Layout(layout)) => Some(layout),
            _ => None,
        }
    }
}

/// Any fragment form.
#[derive(Debug, Clone)]
pub enum Fragment {
    /// Plain expression text.
    Text(TextFragment),
    /// Named parts.
    Object(ObjectFragment),
    /// Key/value mapping.
    Mapping(MappingFragment),
}

impl Fragment {
    /// Short name of the adapter, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Fragment::Text(_) => "text",
            Fragment::Object(_) => "object",
            Fragment::Mapping(_) => "mapping",
        }
    }

    fn provider(&self) -> &dyn ExpressionProvider {
        match self {
            Fragment::Text(f) => f as &dyn ExpressionProvider,
            Fragment::Object(f) => f as &dyn ExpressionProvider,
            Fragment::Mapping(f) => f as &dyn ExpressionProvider,
        }
    }

    /// Expression text that is present and not blank.
    ///
    /// `role` names the fragment in the error (`primary`, `postprocess`).
    pub fn require_expression(&self, role: &str) -> CodegenResult<&str> {
        if let Some(text) = self.expression_text().filter(|t| !t.trim().is_empty()) {
            return Ok(text);
        }

        let reason = match self {
            Fragment::Text(_) => "expression text is empty".to_string(),
            Fragment::Object(f) if f.expression.is_some() => "expression text is empty".to_string(),
            Fragment::Object(_) => "object fragment has no expression".to_string(),
            Fragment::Mapping(m) => match m.get(KEY_EXPRESSION) {
                None => format!("mapping has no `{KEY_EXPRESSION}` key"),
                Some(FragmentValue::Text(_)) => "expression text is empty".to_string(),
                Some(_) => format!("mapping key `{KEY_EXPRESSION}` does not hold text"),
            },
        };

        Err(CodegenError::ExpressionResolution {
            fragment: role.to_string(),
            reason,
        })
    }
}

impl ExpressionProvider for Fragment {
    fn expression_text(&self) -> Option<&str> {
        self.provider().expression_text()
    }

    fn arguments(&self) -> &[ArgumentSpec] {
        self.provider().arguments()
    }

    fn library_text(&self) -> Option<&str> {
        self.provider().library_text()
    }

    fn layout(&self) -> Option<&LayoutSpec> {
        self.provider().layout()
    }
}

impl From<&str> for Fragment {
    fn from(text: &str) -> Self {
        Fragment::Text(TextFragment(text.to_string()))
    }
}

impl From<String> for Fragment {
    fn from(text: String) -> Self {
        Fragment::Text(TextFragment(text))
    }
}

impl From<TextFragment> for Fragment {
    fn from(fragment: TextFragment) -> Self {
        Fragment::Text(fragment)
    }
}

impl From<ObjectFragment> for Fragment {
    fn from(fragment: ObjectFragment) -> Self {
        Fragment::Object(fragment)
    }
}

impl From<MappingFragment> for Fragment {
    fn from(fragment: MappingFragment) -> Self {
        Fragment::Mapping(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_forms_expose_the_same_parts() {
        let args = vec![ArgumentSpec::global_buffer("x", "float")];

        let object: Fragment = ObjectFragment::new("x[gid] += 1.0f;")
            .with_arguments(args.clone())
            .with_library("float one() { return 1.0f; }")
            .into();
        let mapping: Fragment = MappingFragment::new()
            .with(KEY_EXPRESSION, "x[gid] += 1.0f;")
            .with(KEY_ARGUMENTS, args)
            .with(KEY_LIBRARY, "float one() { return 1.0f; }")
            .into();

        for fragment in [&object, &mapping] {
            assert_eq!(fragment.expression_text(), Some("x[gid] += 1.0f;"));
            assert_eq!(fragment.arguments().len(), 1);
            assert_eq!(fragment.library_text(), Some("float one() { return 1.0f; }"));
        }

        let text = Fragment::from("x[gid] += 1.0f;");
        assert_eq!(text.kind(), "text");
        assert!(text.arguments().is_empty());
        assert_eq!(text.require_expression("primary").unwrap(), "x[gid] += 1.0f;");
    }

    #[test]
    fn test_missing_expression_reasons() {
        let empty: Fragment = MappingFragment::new().into();
        let err = empty.require_expression("primary").unwrap_err();
        assert_eq!(
            err,
            CodegenError::ExpressionResolution {
                fragment: "primary".to_string(),
                reason: "mapping has no `expression` key".to_string(),
            }
        );

        let wrong_kind: Fragment = MappingFragment::new()
            .with(KEY_EXPRESSION, Vec::<ArgumentSpec>::new())
            .into();
        assert!(wrong_kind
            .require_expression("primary")
            .unwrap_err()
            .to_string()
            .contains("does not hold text"));

        let blank = Fragment::from("   \n");
        assert!(blank.require_expression("postprocess").is_err());

        let no_expr: Fragment = ObjectFragment::default().into();
        assert!(no_expr.require_expression("primary").is_err());
    }

    #[test]
    fn test_mapping_ignores_unknown_keys() {
        let fragment = MappingFragment::new()
            .with(KEY_EXPRESSION, "y = 1;")
            .with("comment", "ignored");
        assert_eq!(fragment.expression_text(), Some("y = 1;"));
        assert!(fragment.library_text().is_none());
        assert!(fragment.layout().is_none());
    }
}
