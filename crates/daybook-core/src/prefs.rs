use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::i18n::Language;
use crate::storage::{self, LANGUAGE_KEY, SETTINGS_KEY, SharedStorage, THEME_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "light" => Some(Theme::Light),
            "dark" => Some(Theme::Dark),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub notifications: bool,
    pub auto_sort: bool,
    pub show_completed: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            notifications: true,
            auto_sort: true,
            show_completed: true,
        }
    }
}

/// Language, theme and settings, each persisted under its own key.
pub struct Preferences {
    language: Language,
    theme: Theme,
    settings: Settings,
    storage: SharedStorage,
}

impl std::fmt::Debug for Preferences {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preferences")
            .field("language", &self.language)
            .field("theme", &self.theme)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Preferences {
    #[tracing::instrument(skip(storage))]
    pub fn load(storage: SharedStorage) -> Self {
        let language = load_language(&storage);
        let theme = storage::load::<String>(storage.as_ref(), THEME_KEY)
            .and_then(|raw| Theme::parse(&raw))
            .unwrap_or_default();
        let settings = storage::load_or(storage.as_ref(), SETTINGS_KEY, Settings::default());

        info!(%language, theme = theme.key(), ?settings, "loaded preferences");
        Self {
            language,
            theme,
            settings,
            storage,
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = language;
        storage::save_or_log(self.storage.as_ref(), LANGUAGE_KEY, language.code());
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
        storage::save_or_log(self.storage.as_ref(), THEME_KEY, theme.key());
    }

    pub fn toggle_theme(&mut self) -> Theme {
        let next = self.theme.toggled();
        self.set_theme(next);
        next
    }

    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
        storage::save_or_log(self.storage.as_ref(), SETTINGS_KEY, &settings);
    }
}

/// Accepts a JSON string or the bare code older builds wrote directly.
fn load_language(storage: &SharedStorage) -> Language {
    let raw = match storage.read(LANGUAGE_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Language::default(),
        Err(err) => {
            warn!(error = %err, "failed reading language; using default");
            return Language::default();
        }
    };

    let code = serde_json::from_str::<String>(&raw).unwrap_or(raw);
    Language::parse(&code).unwrap_or_else(|| {
        warn!(code = %code, "unknown language code; using default");
        Language::default()
    })
}
