//! Output dialects: the textual templates of the downstream assembler.
//!
//! A dialect is a read-only record of format strings with positional `{}`
//! holes. The default instance targets the rgbds-style retro assembler;
//! alternative dialects can be loaded from `key:value` template files. A
//! malformed template line is a warning, not a failure; the default for
//! that key stays in effect.

use std::io::BufRead;

use crate::diagnostics::Reporter;

/// Textual templates for every directive the emitter produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialect {
    /// Byte directive, no holes.
    pub byte: String,
    /// String data directive; hole: text.
    pub string: String,
    /// Numeric literal; hole: value.
    pub number: String,
    /// Exported label; hole: name.
    pub label: String,
    /// Local label; hole: name.
    pub local_label: String,
    /// Section directive; holes: name, section type.
    pub section: String,
    /// Comment; hole: text.
    pub comment: String,
    /// Macro invocation opener; hole: macro name.
    pub macro_open: String,
    /// Macro invocation terminator, no holes.
    pub macro_end: String,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            byte: "db".to_owned(),
            string: "db \"{}\", 0".to_owned(),
            number: "{}".to_owned(),
            label: "{}::".to_owned(),
            local_label: ".{}".to_owned(),
            section: "SECTION \"{} evscript section\", {}".to_owned(),
            comment: "; {}".to_owned(),
            macro_open: "{} ".to_owned(),
            macro_end: String::new(),
        }
    }
}

/// Fill a template's `{}` holes left to right.
///
/// Surplus holes are left verbatim; surplus values are ignored. Hole-count
/// mismatches are caught at load time, not here.
pub fn expand(template: &str, values: &[&str]) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;
    let mut values = values.iter();
    while let Some(hole) = rest.find("{}") {
        result.push_str(&rest[..hole]);
        match values.next() {
            Some(value) => result.push_str(value),
            None => result.push_str("{}"),
        }
        rest = &rest[hole + 2..];
    }
    result.push_str(rest);
    result
}

/// Number of `{}` holes in a template.
fn hole_count(template: &str) -> usize {
    template.matches("{}").count()
}

impl Dialect {
    /// Load a dialect from a template file, one `key:value` entry per
    /// line. Blank lines and lines starting with `#` are skipped. Unknown
    /// keys, missing separators, and hole-count mismatches warn and leave
    /// the default template in place.
    pub fn load<R: BufRead>(reader: R, reporter: &Reporter) -> std::io::Result<Self> {
        let mut dialect = Self::default();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                reporter.warn(format!("malformed dialect line: {line}"));
                continue;
            };
            let key = key.trim();
            let value = value.to_owned();
            let slot = match key {
                "byte" => &mut dialect.byte,
                "str" => &mut dialect.string,
                "number" => &mut dialect.number,
                "label" => &mut dialect.label,
                "local_label" => &mut dialect.local_label,
                "section" => &mut dialect.section,
                "comment" => &mut dialect.comment,
                "macro_open" => &mut dialect.macro_open,
                "macro_end" => &mut dialect.macro_end,
                _ => {
                    reporter.warn(format!("{key} is not a dialect template"));
                    continue;
                }
            };
            let expected = hole_count(slot);
            if hole_count(&value) != expected {
                reporter.warn(format!(
                    "dialect template {key} must have {expected} hole(s); keeping the default"
                ));
                continue;
            }
            *slot = value;
        }
        Ok(dialect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_fills_holes_in_order() {
        assert_eq!(expand("{}::", &["main"]), "main::");
        assert_eq!(
            expand("SECTION \"{} evscript section\", {}", &["main", "ROMX"]),
            "SECTION \"main evscript section\", ROMX"
        );
        assert_eq!(expand("db", &[]), "db");
    }

    #[test]
    fn expand_leaves_surplus_holes() {
        assert_eq!(expand("{} and {}", &["one"]), "one and {}");
    }

    #[test]
    fn default_dialect_is_the_retro_assembler() {
        let dialect = Dialect::default();
        assert_eq!(dialect.byte, "db");
        assert_eq!(expand(&dialect.local_label, &["loop"]), ".loop");
        assert_eq!(expand(&dialect.string, &["hi"]), "db \"hi\", 0");
        assert_eq!(dialect.macro_end, "");
    }

    #[test]
    fn load_overrides_and_validates() {
        let reporter = Reporter::with_color(false);
        let source = "\
byte:.byt
label:{}:
# a comment
local_label:@{}
section:ORG {}
nonsense line
unknown_key:{}
";
        let dialect = Dialect::load(source.as_bytes(), &reporter).unwrap();
        assert_eq!(dialect.byte, ".byt");
        assert_eq!(dialect.label, "{}:");
        assert_eq!(dialect.local_label, "@{}");
        // Wrong hole count keeps the default.
        assert_eq!(dialect.section, Dialect::default().section);
    }
}
