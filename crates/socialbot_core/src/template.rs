use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Key/value data rendered into the snippet template. The recognized key set
/// is whatever the template references; the renderer is agnostic.
pub type TemplateData = BTreeMap<String, String>;

pub fn load_template(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .with_context(|| format!("failed to read template {}", path.display()))
}

/// Substitute `{{key}}` placeholders (inner whitespace allowed) from `data`.
/// Placeholders without a matching key are left untouched.
pub fn render_snippet(template: &str, data: &TemplateData) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        let Some(close_offset) = rest[open + 2..].find("}}") else {
            break;
        };
        let close = open + 2 + close_offset;
        let key = rest[open + 2..close].trim();
        match data.get(key) {
            Some(value) => {
                output.push_str(&rest[..open]);
                output.push_str(value);
            }
            None => output.push_str(&rest[..close + 2]),
        }
        rest = &rest[close + 2..];
    }
    output.push_str(rest);
    output
}
