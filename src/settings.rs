// src/settings.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;

/// キャッシュ名のデフォルト値
pub const LOCALIZE_CACHE_NAME: &str = "LOCALIZE_DEFAULT_LANGUAGE";

/// 翻訳キーの接頭辞のデフォルト値
pub const LOCALE_PREFIX: &str = "ROUTES.";

/// 最後に使った言語の保存先
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheMechanism {
    #[default]
    LocalStorage,
    Cookie,
}

/// デフォルト言語の決定ロジックを差し替える関数
/// 引数は (サポート言語, キャッシュ済みの言語, ブラウザの言語)
pub type DefaultLangFunction =
    Arc<dyn Fn(&[String], Option<&str>, Option<&str>) -> String + Send + Sync>;

/// ローカライズの設定
///
/// 構築後は変更しない。パーサーとサービスで `Arc` 越しに共有する。
#[derive(Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LocalizeSettings {
    pub use_cached_lang: bool,
    pub always_set_prefix: bool,
    pub cache_mechanism: CacheMechanism,
    pub cache_name: String,
    #[serde(skip)]
    pub default_lang_function: Option<DefaultLangFunction>,
    pub supported_locales: Vec<String>,
    pub locale_prefix: String,
    /// 言語切替後のナビゲーションをコマンド配列ではなく URL 文字列で行う
    pub use_url_navigation: bool,
}

impl Default for LocalizeSettings {
    fn default() -> Self {
        LocalizeSettings {
            use_cached_lang: true,
            always_set_prefix: true,
            cache_mechanism: CacheMechanism::LocalStorage,
            cache_name: LOCALIZE_CACHE_NAME.to_string(),
            default_lang_function: None,
            supported_locales: vec!["en".to_string()],
            locale_prefix: LOCALE_PREFIX.to_string(),
            use_url_navigation: false,
        }
    }
}

impl fmt::Debug for LocalizeSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalizeSettings")
            .field("use_cached_lang", &self.use_cached_lang)
            .field("always_set_prefix", &self.always_set_prefix)
            .field("cache_mechanism", &self.cache_mechanism)
            .field("cache_name", &self.cache_name)
            .field("default_lang_function", &self.default_lang_function.is_some())
            .field("supported_locales", &self.supported_locales)
            .field("locale_prefix", &self.locale_prefix)
            .field("use_url_navigation", &self.use_url_navigation)
            .finish()
    }
}

impl LocalizeSettings {
    /// JSON ファイルから設定を読み込む (未指定の項目はデフォルト値)
    pub fn from_file(path: &Path) -> Result<Self> {
        let src = std::fs::read_to_string(path)?;
        let settings = serde_json::from_str(&src)?;
        tracing::debug!(?path, "loaded localize settings");
        Ok(settings)
    }

    pub fn with_locales<I, S>(mut self, locales: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported_locales = locales.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.locale_prefix = prefix.into();
        self
    }

    pub fn with_always_set_prefix(mut self, always_set_prefix: bool) -> Self {
        self.always_set_prefix = always_set_prefix;
        self
    }

    pub fn with_cached_lang(mut self, use_cached_lang: bool) -> Self {
        self.use_cached_lang = use_cached_lang;
        self
    }

    pub fn with_cache(mut self, mechanism: CacheMechanism, name: impl Into<String>) -> Self {
        self.cache_mechanism = mechanism;
        self.cache_name = name.into();
        self
    }

    pub fn with_default_lang_function<F>(mut self, f: F) -> Self
    where
        F: Fn(&[String], Option<&str>, Option<&str>) -> String + Send + Sync + 'static,
    {
        self.default_lang_function = Some(Arc::new(f));
        self
    }

    pub fn with_url_navigation(mut self, use_url_navigation: bool) -> Self {
        self.use_url_navigation = use_url_navigation;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = LocalizeSettings::default();
        assert!(settings.use_cached_lang);
        assert!(settings.always_set_prefix);
        assert_eq!(settings.cache_mechanism, CacheMechanism::LocalStorage);
        assert_eq!(settings.cache_name, "LOCALIZE_DEFAULT_LANGUAGE");
        assert_eq!(settings.supported_locales, vec!["en".to_string()]);
        assert_eq!(settings.locale_prefix, "ROUTES.");
        assert!(settings.default_lang_function.is_none());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let settings: LocalizeSettings = serde_json::from_str(
            r#"{"alwaysSetPrefix": false, "cacheMechanism": "Cookie", "supportedLocales": ["de", "en"]}"#,
        )
        .unwrap();
        assert!(!settings.always_set_prefix);
        assert!(settings.use_cached_lang);
        assert_eq!(settings.cache_mechanism, CacheMechanism::Cookie);
        assert_eq!(settings.supported_locales, vec!["de", "en"]);
        assert_eq!(settings.locale_prefix, "ROUTES.");
    }
}
