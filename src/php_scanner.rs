//! Static PHP source scanning
//!
//! Finds the class-like declarations of a PHP file without executing it.
//! Comments, string literals and inline HTML are blanked out first, the
//! remainder is tokenized, and a single pass tracks `namespace` blocks and
//! `use` imports so `extends` clauses resolve to fully-qualified names.

use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use crate::error::Result;

/// Cached regex splitting blanked PHP source into tokens
static TOKEN_REGEX: OnceLock<Regex> = OnceLock::new();

/// Get or initialize the token regex
fn get_token_regex() -> &'static Regex {
    TOKEN_REGEX.get_or_init(|| {
        let ident = r"[A-Za-z_\x{80}-\x{10FFFF}][A-Za-z0-9_\x{80}-\x{10FFFF}]*";
        Regex::new(&format!(
            r"\${ident}|\\?{ident}(?:\\{ident})*\\?|::|->|[{{}};,()]"
        ))
        .expect("Failed to compile PHP token regex")
    })
}

/// Kind of a class-like declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Class,
    Interface,
    Trait,
    Enum,
}

/// A class-like declaration found in a source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDeclaration {
    /// Fully-qualified name without a leading backslash
    pub name: String,
    pub kind: ClassKind,
    pub is_abstract: bool,
    /// Fully-qualified name of the `extends` target (classes only)
    pub parent: Option<String>,
}

impl ClassDeclaration {
    /// Name without its namespace
    pub fn short_name(&self) -> &str {
        self.name.rsplit('\\').next().unwrap_or(&self.name)
    }

    /// Whether PHP could instantiate this declaration
    pub fn is_instantiable(&self) -> bool {
        self.kind == ClassKind::Class && !self.is_abstract
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'a> {
    Name(&'a str),
    Variable,
    Punct(&'a str),
}

impl Token<'_> {
    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Name(name) if name.eq_ignore_ascii_case(keyword))
    }

    fn is_punct(&self, punct: &str) -> bool {
        matches!(self, Token::Punct(p) if *p == punct)
    }
}

/// Read and scan the PHP file at `path`
pub async fn scan_file(path: &Path) -> Result<Vec<ClassDeclaration>> {
    let bytes = tokio::fs::read(path).await?;
    Ok(scan_source(&String::from_utf8_lossy(&bytes)))
}

/// Scan PHP `source` for class-like declarations, in source order
pub fn scan_source(source: &str) -> Vec<ClassDeclaration> {
    let code = strip_non_code(source);
    let tokens = tokenize(&code);
    DeclarationParser::new(&tokens).run()
}

fn tokenize(code: &str) -> Vec<Token<'_>> {
    get_token_regex()
        .find_iter(code)
        .map(|m| match m.as_str() {
            text @ ("::" | "->" | "{" | "}" | ";" | "," | "(" | ")") => Token::Punct(text),
            text if text.starts_with('$') => Token::Variable,
            text => Token::Name(text),
        })
        .collect()
}

struct DeclarationParser<'t, 'a> {
    tokens: &'t [Token<'a>],
    namespace: String,
    /// Lowercased alias -> fully-qualified name
    imports: HashMap<String, String>,
    depth: usize,
    namespace_depth: usize,
    braced_namespace: bool,
    declarations: Vec<ClassDeclaration>,
}

impl<'t, 'a> DeclarationParser<'t, 'a> {
    fn new(tokens: &'t [Token<'a>]) -> Self {
        Self {
            tokens,
            namespace: String::new(),
            imports: HashMap::new(),
            depth: 0,
            namespace_depth: 0,
            braced_namespace: false,
            declarations: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<ClassDeclaration> {
        let mut i = 0;
        while i < self.tokens.len() {
            i = self.step(i);
        }
        self.declarations
    }

    fn token(&self, i: usize) -> Option<&'t Token<'a>> {
        self.tokens.get(i)
    }

    /// Whether the token before `i` turns a keyword into a member or constant access
    fn is_member_access(&self, i: usize) -> bool {
        i > 0
            && self
                .token(i - 1)
                .is_some_and(|prev| prev.is_punct("::") || prev.is_punct("->"))
    }

    fn step(&mut self, i: usize) -> usize {
        let Some(token) = self.token(i).cloned() else {
            return i + 1;
        };

        match token {
            Token::Punct("{") => {
                self.depth += 1;
                i + 1
            }
            Token::Punct("}") => {
                self.depth = self.depth.saturating_sub(1);
                if self.braced_namespace && self.depth < self.namespace_depth {
                    self.namespace.clear();
                    self.imports.clear();
                    self.namespace_depth = 0;
                    self.braced_namespace = false;
                }
                i + 1
            }
            Token::Name(_) if self.is_member_access(i) => i + 1,
            Token::Name(name) if name.eq_ignore_ascii_case("namespace") => self.namespace_statement(i),
            Token::Name(name)
                if name.eq_ignore_ascii_case("use") && self.depth == self.namespace_depth =>
            {
                self.use_statement(i)
            }
            Token::Name(name) => {
                let kind = match name.to_ascii_lowercase().as_str() {
                    "class" => ClassKind::Class,
                    "interface" => ClassKind::Interface,
                    "trait" => ClassKind::Trait,
                    "enum" => ClassKind::Enum,
                    _ => return i + 1,
                };
                self.declaration(i, kind)
            }
            _ => i + 1,
        }
    }

    fn namespace_statement(&mut self, i: usize) -> usize {
        let mut next = i + 1;
        let name = match self.token(next) {
            Some(Token::Name(name)) => {
                next += 1;
                name.trim_matches('\\').to_string()
            }
            _ => String::new(),
        };

        self.namespace = name;
        self.imports.clear();

        if self.token(next).is_some_and(|t| t.is_punct("{")) {
            self.braced_namespace = true;
            self.namespace_depth = self.depth + 1;
        } else {
            self.braced_namespace = false;
            self.namespace_depth = self.depth;
        }
        next
    }

    fn use_statement(&mut self, i: usize) -> usize {
        let mut j = i + 1;

        // Closure `use (...)` binds variables, not names
        if self.token(j).is_some_and(|t| t.is_punct("(")) {
            return j;
        }
        if self
            .token(j)
            .is_some_and(|t| t.is_keyword("function") || t.is_keyword("const"))
        {
            return self.skip_past(j, ";");
        }

        while let Some(token) = self.token(j) {
            match token {
                Token::Punct(";") => return j + 1,
                Token::Name(prefix)
                    if prefix.ends_with('\\')
                        && self.token(j + 1).is_some_and(|t| t.is_punct("{")) =>
                {
                    let prefix = prefix.trim_start_matches('\\').to_string();
                    j = self.group_items(j + 2, &prefix);
                }
                Token::Name(_) => j = self.import_item(j, ""),
                _ => j += 1,
            }
        }
        j
    }

    /// Parse `{ A, B as C }` after a group prefix; returns the index after `}`
    fn group_items(&mut self, mut j: usize, prefix: &str) -> usize {
        while let Some(token) = self.token(j) {
            match token {
                Token::Punct("}") => return j + 1,
                Token::Name(name) if name.eq_ignore_ascii_case("function") || name.eq_ignore_ascii_case("const") => {
                    // Skip the function or constant name that follows
                    j += 2;
                }
                Token::Name(_) => j = self.import_item(j, prefix),
                _ => j += 1,
            }
        }
        j
    }

    /// Register `Name [as Alias]` at `j`; returns the index after it
    fn import_item(&mut self, j: usize, prefix: &str) -> usize {
        let Some(Token::Name(name)) = self.token(j).cloned() else {
            return j + 1;
        };
        let full = format!("{}{}", prefix, name.trim_start_matches('\\'));
        let full = full.trim_end_matches('\\').to_string();

        let (alias, next) = match (self.token(j + 1), self.token(j + 2)) {
            (Some(as_kw), Some(Token::Name(alias))) if as_kw.is_keyword("as") => {
                (alias.to_string(), j + 3)
            }
            _ => (
                full.rsplit('\\').next().unwrap_or(&full).to_string(),
                j + 1,
            ),
        };

        self.imports.insert(alias.to_ascii_lowercase(), full);
        next
    }

    fn declaration(&mut self, i: usize, kind: ClassKind) -> usize {
        // `new class`, `Foo::class` and `$x->class` are not declarations
        if self.is_member_access(i)
            || (i > 0 && self.token(i - 1).is_some_and(|t| t.is_keyword("new")))
        {
            return i + 1;
        }

        let Some(Token::Name(short_name)) = self.token(i + 1).cloned() else {
            return i + 1;
        };
        if short_name.contains('\\') {
            return i + 1;
        }

        let mut is_abstract = false;
        let mut back = i;
        while back > 0 {
            match self.token(back - 1) {
                Some(t) if t.is_keyword("abstract") => is_abstract = true,
                Some(t) if t.is_keyword("final") || t.is_keyword("readonly") => {}
                _ => break,
            }
            back -= 1;
        }

        let mut next = i + 2;
        let mut parent = None;
        if self.token(next).is_some_and(|t| t.is_keyword("extends")) {
            if let Some(Token::Name(parent_name)) = self.token(next + 1).cloned() {
                if kind == ClassKind::Class {
                    parent = Some(self.resolve(parent_name));
                }
                next += 2;
            } else {
                next += 1;
            }
        }

        self.declarations.push(ClassDeclaration {
            name: qualify(&self.namespace, short_name),
            kind,
            is_abstract: is_abstract && kind == ClassKind::Class,
            parent,
        });
        next
    }

    fn skip_past(&self, mut j: usize, punct: &str) -> usize {
        while let Some(token) = self.token(j) {
            j += 1;
            if token.is_punct(punct) {
                break;
            }
        }
        j
    }

    /// Resolve a class reference the way PHP does at compile time
    fn resolve(&self, name: &str) -> String {
        resolve_name(name, &self.namespace, &self.imports)
    }
}

fn qualify(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}\\{}", namespace, name)
    }
}

fn resolve_name(name: &str, namespace: &str, imports: &HashMap<String, String>) -> String {
    if let Some(fully_qualified) = name.strip_prefix('\\') {
        return fully_qualified.to_string();
    }

    let (first, rest) = match name.split_once('\\') {
        Some((first, rest)) => (first, Some(rest)),
        None => (name, None),
    };

    if first.eq_ignore_ascii_case("namespace") {
        return qualify(namespace, rest.unwrap_or_default());
    }

    if let Some(imported) = imports.get(&first.to_ascii_lowercase()) {
        return match rest {
            Some(rest) => format!("{}\\{}", imported, rest),
            None => imported.clone(),
        };
    }

    qualify(namespace, name)
}

/// Blank out everything that is not PHP code, keeping line structure
fn strip_non_code(source: &str) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut i = 0;
    let mut in_php = false;

    let at = |i: usize, s: &str| s.chars().enumerate().all(|(k, c)| chars.get(i + k) == Some(&c));
    let blank = |out: &mut String, c: char| out.push(if c == '\n' { '\n' } else { ' ' });

    while i < chars.len() {
        let c = chars[i];

        if !in_php {
            let open = if at(i, "<?php") {
                5
            } else if at(i, "<?=") {
                3
            } else if at(i, "<?") {
                2
            } else {
                0
            };
            if open > 0 {
                for _ in 0..open {
                    out.push(' ');
                }
                i += open;
                in_php = true;
            } else {
                blank(&mut out, c);
                i += 1;
            }
            continue;
        }

        let next = chars.get(i + 1).copied();
        match c {
            '?' if next == Some('>') => {
                out.push_str("  ");
                i += 2;
                in_php = false;
            }
            '#' if next != Some('[') => i = skip_line_comment(&chars, i, &mut out),
            '/' if next == Some('/') => i = skip_line_comment(&chars, i, &mut out),
            '/' if next == Some('*') => {
                out.push_str("  ");
                i += 2;
                while i < chars.len() && !at(i, "*/") {
                    blank(&mut out, chars[i]);
                    i += 1;
                }
                if i < chars.len() {
                    out.push_str("  ");
                    i += 2;
                }
            }
            '\'' | '"' | '`' => {
                out.push(' ');
                i += 1;
                while i < chars.len() && chars[i] != c {
                    if chars[i] == '\\' && i + 1 < chars.len() {
                        blank(&mut out, chars[i]);
                        i += 1;
                    }
                    blank(&mut out, chars[i]);
                    i += 1;
                }
                if i < chars.len() {
                    out.push(' ');
                    i += 1;
                }
            }
            '<' if at(i, "<<<") => i = skip_heredoc(&chars, i, &mut out),
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// Blank a `//` or `#` comment; it ends at a newline or a closing `?>`
fn skip_line_comment(chars: &[char], mut i: usize, out: &mut String) -> usize {
    while i < chars.len() && chars[i] != '\n' {
        if chars[i] == '?' && chars.get(i + 1) == Some(&'>') {
            return i;
        }
        out.push(' ');
        i += 1;
    }
    i
}

fn is_ident_char(c: char) -> bool {
    c == '_' || c.is_alphanumeric() || !c.is_ascii()
}

/// Blank a heredoc or nowdoc starting at `<<<`
fn skip_heredoc(chars: &[char], start: usize, out: &mut String) -> usize {
    let mut i = start + 3;
    while i < chars.len() && (chars[i] == ' ' || chars[i] == '\t') {
        i += 1;
    }
    if i < chars.len() && (chars[i] == '\'' || chars[i] == '"') {
        i += 1;
    }
    let label_start = i;
    while i < chars.len() && is_ident_char(chars[i]) {
        i += 1;
    }
    let label: Vec<char> = chars[label_start..i].to_vec();

    if label.is_empty() {
        // Not a heredoc after all, keep `<<<` as code
        out.push_str("<<<");
        return start + 3;
    }

    for c in &chars[start..i] {
        out.push(if *c == '\n' { '\n' } else { ' ' });
    }

    // Blank whole lines until one starts (after indentation) with the label
    let mut line_start = true;
    while i < chars.len() {
        if line_start {
            let mut j = i;
            while j < chars.len() && (chars[j] == ' ' || chars[j] == '\t') {
                j += 1;
            }
            let ends = chars[j..].starts_with(&label)
                && chars
                    .get(j + label.len())
                    .is_none_or(|c| !is_ident_char(*c));
            if ends {
                for _ in i..j + label.len() {
                    out.push(' ');
                }
                return j + label.len();
            }
        }
        line_start = chars[i] == '\n';
        out.push(if chars[i] == '\n' { '\n' } else { ' ' });
        i += 1;
    }
    i
}
