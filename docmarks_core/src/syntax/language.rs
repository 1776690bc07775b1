//! Language detection and lexical rules.
//!
//! Detects programming languages from file extensions and provides the
//! comment, string and keyword rules the standard lexer runs on.

use std::path::Path;

/// Supported programming languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    C,
    Cpp,
    Json,
    #[default]
    PlainText,
}

/// Lexical rules of one language.
#[derive(Debug, Clone, Copy)]
pub struct LanguageRules {
    pub line_comment: Option<&'static str>,
    pub block_comment: Option<(&'static str, &'static str)>,
    /// Block comments nest (`/* /* */ */` is one comment).
    pub nested_comments: bool,
    pub quotes: &'static [char],
    /// Tripled quotes open a string that may span lines.
    pub triple_quotes: bool,
    /// Ordinary strings continue across line feeds.
    pub multiline_strings: bool,
    pub keywords: &'static [&'static str],
}

const RUST_KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move",
    "mut", "pub", "ref", "return", "self", "Self", "static", "struct", "super", "trait", "true",
    "type", "unsafe", "use", "where", "while",
];

const PYTHON_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

const JS_KEYWORDS: &[&str] = &[
    "async", "await", "break", "case", "catch", "class", "const", "continue", "default",
    "delete", "do", "else", "export", "extends", "false", "finally", "for", "function", "if",
    "import", "in", "instanceof", "let", "new", "null", "return", "super", "switch", "this",
    "throw", "true", "try", "typeof", "undefined", "var", "void", "while", "yield",
];

const TS_KEYWORDS: &[&str] = &[
    "abstract", "any", "as", "async", "await", "boolean", "break", "case", "catch", "class",
    "const", "continue", "declare", "default", "delete", "do", "else", "enum", "export",
    "extends", "false", "finally", "for", "function", "if", "implements", "import", "in",
    "instanceof", "interface", "let", "namespace", "new", "null", "number", "private",
    "protected", "public", "readonly", "return", "string", "super", "switch", "this", "throw",
    "true", "try", "type", "typeof", "undefined", "var", "void", "while", "yield",
];

const C_KEYWORDS: &[&str] = &[
    "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
    "enum", "extern", "float", "for", "goto", "if", "inline", "int", "long", "register",
    "return", "short", "signed", "sizeof", "static", "struct", "switch", "typedef", "union",
    "unsigned", "void", "volatile", "while",
];

const CPP_KEYWORDS: &[&str] = &[
    "auto", "bool", "break", "case", "catch", "char", "class", "const", "constexpr",
    "continue", "default", "delete", "do", "double", "else", "enum", "explicit", "extern",
    "false", "float", "for", "friend", "if", "inline", "int", "long", "namespace", "new",
    "nullptr", "operator", "private", "protected", "public", "return", "short", "signed",
    "sizeof", "static", "struct", "switch", "template", "this", "throw", "true", "try",
    "typedef", "typename", "union", "unsigned", "using", "virtual", "void", "volatile", "while",
];

const JSON_KEYWORDS: &[&str] = &["true", "false", "null"];

impl Language {
    /// Returns all available languages.
    pub fn all() -> &'static [Language] {
        &[
            Language::Rust,
            Language::Python,
            Language::JavaScript,
            Language::TypeScript,
            Language::C,
            Language::Cpp,
            Language::Json,
            Language::PlainText,
        ]
    }

    /// Detects language from a file path based on extension.
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::PlainText)
    }

    /// Detects language from a file extension.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "rs" => Self::Rust,
            "py" | "pyw" | "pyi" => Self::Python,
            "js" | "jsx" | "mjs" | "cjs" => Self::JavaScript,
            "ts" | "tsx" | "mts" | "cts" => Self::TypeScript,
            "c" | "h" => Self::C,
            "cpp" | "cc" | "cxx" | "c++" | "hpp" | "hh" | "hxx" | "h++" => Self::Cpp,
            "json" | "jsonc" | "json5" => Self::Json,
            _ => Self::PlainText,
        }
    }

    /// Returns the display name of the language.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rust => "Rust",
            Self::Python => "Python",
            Self::JavaScript => "JavaScript",
            Self::TypeScript => "TypeScript",
            Self::C => "C",
            Self::Cpp => "C++",
            Self::Json => "JSON",
            Self::PlainText => "Plain Text",
        }
    }

    /// Returns the lexical rules for this language.
    pub fn rules(&self) -> LanguageRules {
        const SLASH_BLOCK: Option<(&str, &str)> = Some(("/*", "*/"));
        match self {
            Self::Rust => LanguageRules {
                line_comment: Some("//"),
                block_comment: SLASH_BLOCK,
                nested_comments: true,
                quotes: &['"'],
                triple_quotes: false,
                multiline_strings: true,
                keywords: RUST_KEYWORDS,
            },
            Self::Python => LanguageRules {
                line_comment: Some("#"),
                block_comment: None,
                nested_comments: false,
                quotes: &['"', '\''],
                triple_quotes: true,
                multiline_strings: false,
                keywords: PYTHON_KEYWORDS,
            },
            Self::JavaScript | Self::TypeScript => LanguageRules {
                line_comment: Some("//"),
                block_comment: SLASH_BLOCK,
                nested_comments: false,
                quotes: &['"', '\'', '`'],
                triple_quotes: false,
                multiline_strings: false,
                keywords: if *self == Self::JavaScript {
                    JS_KEYWORDS
                } else {
                    TS_KEYWORDS
                },
            },
            Self::C | Self::Cpp => LanguageRules {
                line_comment: Some("//"),
                block_comment: SLASH_BLOCK,
                nested_comments: false,
                quotes: &['"', '\''],
                triple_quotes: false,
                multiline_strings: false,
                keywords: if *self == Self::C { C_KEYWORDS } else { CPP_KEYWORDS },
            },
            Self::Json => LanguageRules {
                line_comment: None,
                block_comment: None,
                nested_comments: false,
                quotes: &['"'],
                triple_quotes: false,
                multiline_strings: false,
                keywords: JSON_KEYWORDS,
            },
            Self::PlainText => LanguageRules {
                line_comment: None,
                block_comment: None,
                nested_comments: false,
                quotes: &[],
                triple_quotes: false,
                multiline_strings: false,
                keywords: &[],
            },
        }
    }

    /// Returns whether this language has any rules beyond plain words.
    pub fn has_highlighting(&self) -> bool {
        !matches!(self, Self::PlainText)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_extension() {
        assert_eq!(Language::from_extension("rs"), Language::Rust);
        assert_eq!(Language::from_extension("RS"), Language::Rust);
        assert_eq!(Language::from_extension("py"), Language::Python);
        assert_eq!(Language::from_extension("js"), Language::JavaScript);
        assert_eq!(Language::from_extension("ts"), Language::TypeScript);
        assert_eq!(Language::from_extension("c"), Language::C);
        assert_eq!(Language::from_extension("cpp"), Language::Cpp);
        assert_eq!(Language::from_extension("json"), Language::Json);
        assert_eq!(Language::from_extension("txt"), Language::PlainText);
    }

    #[test]
    fn test_from_path() {
        assert_eq!(Language::from_path(Path::new("main.rs")), Language::Rust);
        assert_eq!(
            Language::from_path(Path::new("/path/to/config.json")),
            Language::Json
        );
        assert_eq!(Language::from_path(Path::new("README")), Language::PlainText);
    }

    #[test]
    fn test_rules() {
        let rust = Language::Rust.rules();
        assert_eq!(rust.line_comment, Some("//"));
        assert!(rust.nested_comments);
        assert!(rust.keywords.contains(&"fn"));

        let python = Language::Python.rules();
        assert_eq!(python.block_comment, None);
        assert!(python.triple_quotes);

        assert!(Language::PlainText.rules().quotes.is_empty());
        assert!(Language::all().iter().all(|l| l.rules().keywords.len() < 100));
    }
}
