use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use time::OffsetDateTime;

use crate::domain::preferences::Language;

/// Language consulted when the requested one has no entry.
pub const FALLBACK_LANGUAGE: Language = Language::En;

const EMBEDDED: [(Language, &str); 3] = [
    (Language::En, include_str!("../../locales/en.json")),
    (Language::Fr, include_str!("../../locales/fr.json")),
    (Language::Ar, include_str!("../../locales/ar.json")),
];

const TIME_UNITS: [(&str, i64); 6] = [
    ("year", 31_536_000),
    ("month", 2_592_000),
    ("day", 86_400),
    ("hour", 3_600),
    ("minute", 60),
    ("second", 1),
];

/// CLDR cardinal plural categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluralCategory {
    Zero,
    One,
    Two,
    Few,
    Many,
    Other,
}

impl PluralCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zero => "zero",
            Self::One => "one",
            Self::Two => "two",
            Self::Few => "few",
            Self::Many => "many",
            Self::Other => "other",
        }
    }
}

/// Cardinal category of a whole number in `language`.
pub fn plural_category(language: Language, n: u64) -> PluralCategory {
    match language {
        Language::En => {
            if n == 1 {
                PluralCategory::One
            } else {
                PluralCategory::Other
            }
        }
        Language::Fr => match n {
            0 | 1 => PluralCategory::One,
            n if n % 1_000_000 == 0 => PluralCategory::Many,
            _ => PluralCategory::Other,
        },
        Language::Ar => match (n, n % 100) {
            (0, _) => PluralCategory::Zero,
            (1, _) => PluralCategory::One,
            (2, _) => PluralCategory::Two,
            (_, 3..=10) => PluralCategory::Few,
            (_, 11..=99) => PluralCategory::Many,
            _ => PluralCategory::Other,
        },
    }
}

/// Nested per-language string tables addressed by dotted keys.
pub struct Catalog {
    tables: HashMap<Language, Value>,
    fallback: Language,
}

impl Catalog {
    pub fn embedded() -> Result<Self> {
        let mut tables = HashMap::with_capacity(EMBEDDED.len());
        for (language, source) in EMBEDDED {
            let table: Value = serde_json::from_str(source)
                .with_context(|| format!("invalid locale table for {}", language.code()))?;
            tables.insert(language, table);
        }
        Ok(Self::from_tables(tables, FALLBACK_LANGUAGE))
    }

    pub fn from_tables(tables: HashMap<Language, Value>, fallback: Language) -> Self {
        Self { tables, fallback }
    }

    pub fn table(&self, language: Language) -> Option<&Value> {
        self.tables.get(&language)
    }

    pub fn t(&self, language: Language, key: &str) -> String {
        self.t_with(language, key, &[])
    }

    /// Resolve `key`, falling back to the default language then to the key
    /// itself, and substitute each `{name}` token.
    pub fn t_with(&self, language: Language, key: &str, args: &[(&str, &str)]) -> String {
        let text = self
            .lookup(language, key)
            .or_else(|| self.lookup(self.fallback, key))
            .unwrap_or(key);
        substitute(text, args)
    }

    /// Pluralised lookup of `{key}_{category}`; `{count}` is substituted too.
    pub fn t_count(
        &self,
        language: Language,
        key: &str,
        count: u64,
        args: &[(&str, &str)],
    ) -> String {
        let text = self
            .plural_lookup(language, key, count)
            .or_else(|| self.plural_lookup(self.fallback, key, count))
            .unwrap_or(key);

        let count = count.to_string();
        let mut all_args = Vec::with_capacity(args.len() + 1);
        all_args.push(("count", count.as_str()));
        all_args.extend_from_slice(args);
        substitute(text, &all_args)
    }

    /// Relative age such as "3 hours ago"; anything under 30 seconds is "just now".
    pub fn time_ago(&self, language: Language, then: OffsetDateTime, now: OffsetDateTime) -> String {
        let seconds = (now - then).whole_seconds();
        if seconds < 30 {
            return self.t(language, "timeAgo.justNow");
        }

        for (unit, unit_seconds) in TIME_UNITS {
            let count = seconds / unit_seconds;
            if count > 0 {
                return self.t_count(language, &format!("timeAgo.{}", unit), count as u64, &[]);
            }
        }
        self.t(language, "timeAgo.justNow")
    }

    fn plural_lookup(&self, language: Language, key: &str, count: u64) -> Option<&str> {
        let category = plural_category(language, count);
        self.lookup(language, &format!("{}_{}", key, category.as_str()))
            .or_else(|| self.lookup(language, &format!("{}_other", key)))
    }

    fn lookup(&self, language: Language, key: &str) -> Option<&str> {
        let mut node = self.tables.get(&language)?;
        for part in key.split('.') {
            node = node.as_object()?.get(part)?;
        }
        node.as_str()
    }
}

fn substitute(text: &str, args: &[(&str, &str)]) -> String {
    let mut out = text.to_string();
    for (name, value) in args {
        out = out.replace(&format!("{{{}}}", name), value);
    }
    out
}
