//! Include reference argument parsing

use indexmap::IndexMap;

/// A parsed `{file.i args...}` reference
///
/// Arguments are either all named (`&name=value`) or all positional. Named
/// arguments can also be reached by position, in the order given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncludeArgs {
    pub file_name: String,
    pub named: IndexMap<String, String>,
    pub numbered: Vec<String>,
}

impl IncludeArgs {
    /// Parse the text between the braces, escapes already resolved
    pub fn parse(text: &str) -> Self {
        let mut cursor = Cursor::new(text);
        cursor.skip_whitespace();
        let file_name = cursor.gobble();
        cursor.skip_whitespace();

        let mut args = Self {
            file_name,
            ..Default::default()
        };

        if cursor.peek() == Some('&') {
            while !cursor.at_end() {
                cursor.skip_whitespace();
                if cursor.peek() != Some('&') {
                    // Not a named argument; drop it
                    cursor.gobble();
                    continue;
                }
                cursor.bump();
                let name = cursor.name();
                let value = if cursor.peek() == Some('=') {
                    cursor.bump();
                    cursor.skip_whitespace();
                    cursor.gobble()
                } else {
                    String::new()
                };
                if name.is_empty() {
                    continue;
                }
                args.numbered.push(value.clone());
                args.named.insert(name.to_lowercase(), value);
            }
        } else {
            while !cursor.at_end() {
                args.numbered.push(cursor.gobble());
                cursor.skip_whitespace();
            }
        }
        args
    }

    /// Value of `{N}`, 1-based; missing arguments are empty
    pub fn numbered_arg(&self, number: usize) -> &str {
        number
            .checked_sub(1)
            .and_then(|i| self.numbered.get(i))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn named_arg(&self, name: &str) -> Option<&str> {
        self.named.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Expansion of `{*}`
    pub fn all_numbered(&self) -> String {
        self.numbered.join(" ")
    }

    /// Expansion of `{&*}`
    pub fn all_named(&self) -> String {
        self.named
            .iter()
            .map(|(name, value)| format!("&{name}=\"{value}\""))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

struct Cursor {
    chars: Vec<char>,
    pos: usize,
}

impl Cursor {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    /// One argument: whitespace ends it outside quotes, `"` toggles quoting
    /// and `""` inside quotes is a literal quote
    fn gobble(&mut self) -> String {
        let mut value = String::new();
        let mut in_quotes = false;
        while let Some(c) = self.peek() {
            if c == '"' {
                self.pos += 1;
                if in_quotes && self.peek() == Some('"') {
                    self.pos += 1;
                    value.push('"');
                } else {
                    in_quotes = !in_quotes;
                }
                continue;
            }
            if !in_quotes && c.is_whitespace() {
                break;
            }
            value.push(c);
            self.pos += 1;
        }
        value
    }

    /// Argument name up to `=` or the next `&`, whitespace dropped
    fn name(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c == '=' || c == '&' {
                break;
            }
            if !c.is_whitespace() {
                name.push(c);
            }
            self.pos += 1;
        }
        name
    }
}
