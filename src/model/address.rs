//! Email address parsing (RFC 5322 §3.4).

/// A mailbox as it appears in `From`, `To`, `Cc`, `Bcc` or `Reply-To`.
///
/// # Examples
/// - `"Ana Pérez <ana@example.org>"` → `display_name = "Ana Pérez"`, `address = "ana@example.org"`
/// - `"ana@example.org"` → `display_name = ""`, `address = "ana@example.org"`
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct EmailAddress {
    /// Human-readable display name (may be empty).
    pub display_name: String,
    /// The bare address (`user@domain`), or the raw text when it could not be parsed.
    pub address: String,
}

impl EmailAddress {
    /// Build an address from its two parts.
    pub fn new(display_name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            address: address.into(),
        }
    }

    /// Parse a single address from a header value.
    ///
    /// Accepts `user@domain`, `<user@domain>`, `Name <user@domain>` and
    /// `"Quoted, Name" <user@domain>`. Anything else is kept verbatim as `address`.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::default();
        }

        if let (Some(open), Some(close)) = (trimmed.rfind('<'), trimmed.rfind('>')) {
            if close > open {
                return Self {
                    display_name: strip_quotes(&trimmed[..open]),
                    address: trimmed[open + 1..close].trim().to_string(),
                };
            }
        }

        Self {
            display_name: String::new(),
            address: trimmed.to_string(),
        }
    }

    /// Parse a comma-separated list, respecting quoted display names
    /// (`"Last, First" <a@b.com>, other@c.com`). Empty entries are dropped.
    pub fn parse_list(raw: &str) -> Vec<Self> {
        let mut results = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;
        let mut in_angle = false;

        for ch in raw.chars() {
            match ch {
                '"' => {
                    in_quotes = !in_quotes;
                    current.push(ch);
                }
                '<' if !in_quotes => {
                    in_angle = true;
                    current.push(ch);
                }
                '>' if !in_quotes => {
                    in_angle = false;
                    current.push(ch);
                }
                ',' | ';' if !in_quotes && !in_angle => {
                    let addr = Self::parse(&current);
                    if !addr.is_empty() {
                        results.push(addr);
                    }
                    current.clear();
                }
                _ => current.push(ch),
            }
        }

        let addr = Self::parse(&current);
        if !addr.is_empty() {
            results.push(addr);
        }
        results
    }

    /// `true` when neither part carries anything.
    pub fn is_empty(&self) -> bool {
        self.address.is_empty() && self.display_name.is_empty()
    }

    /// Format for display: `"Display Name <address>"` or just `"address"`.
    pub fn display(&self) -> String {
        if self.display_name.is_empty() {
            self.address.clone()
        } else if self.address.is_empty() {
            self.display_name.clone()
        } else {
            format!("{} <{}>", self.display_name, self.address)
        }
    }
}

fn strip_quotes(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display())
    }
}
