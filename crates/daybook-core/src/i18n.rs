use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

const STRINGS_TOML: &str = include_str!("../locales/strings.toml");

type Tables = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "EN")]
    En,
    #[serde(rename = "ZH-TW")]
    ZhTw,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::En, Language::ZhTw];

    pub fn code(self) -> &'static str {
        match self {
            Language::En => "EN",
            Language::ZhTw => "ZH-TW",
        }
    }

    pub fn native_name(self) -> &'static str {
        match self {
            Language::En => "English",
            Language::ZhTw => "繁體中文",
        }
    }

    /// Case-insensitive; stored codes were written in both cases.
    pub fn parse(raw: &str) -> Option<Self> {
        let code = raw.trim().to_ascii_uppercase().replace('_', "-");
        Self::ALL.into_iter().find(|lang| lang.code() == code)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

fn tables() -> &'static Tables {
    static TABLES: OnceLock<Tables> = OnceLock::new();
    TABLES.get_or_init(|| match toml::from_str::<Tables>(STRINGS_TOML) {
        Ok(tables) => {
            tracing::debug!(languages = tables.len(), "loaded translation tables");
            tables
        }
        Err(error) => {
            tracing::error!(%error, "failed to parse translation tables; keys will be shown raw");
            Tables::new()
        }
    })
}

/// Key to string lookup for the active language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Localizer {
    language: Language,
}

impl Localizer {
    pub fn new(language: Language) -> Self {
        Self { language }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Active table, then English, then the key itself.
    pub fn translate(&self, key: &str) -> String {
        let tables = tables();
        tables
            .get(self.language.code())
            .and_then(|table| table.get(key))
            .or_else(|| {
                tables
                    .get(Language::En.code())
                    .and_then(|table| table.get(key))
            })
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }

    /// Translates `key` and fills `{name}` placeholders.
    pub fn translate_with(&self, key: &str, args: &[(&str, &str)]) -> String {
        let mut text = self.translate(key);
        for (name, value) in args {
            text = text.replace(&format!("{{{name}}}"), value);
        }
        text
    }
}
