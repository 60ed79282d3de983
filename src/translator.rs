// src/translator.rs
use async_trait::async_trait;
use path_absolutize::Absolutize;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{LocalizeError, Result};

/// アクティブなロケールのキー → 訳語のテーブル
///
/// `"ROUTES.home"` のようなフラットなキーと、
/// `{"ROUTES": {"home": ...}}` のようなネストしたオブジェクトの両方を引ける。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslationTable {
    root: Map<String, Value>,
}

impl TranslationTable {
    pub fn new(root: Map<String, Value>) -> Self {
        TranslationTable { root }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let root = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), Value::String(v.into())))
            .collect();
        TranslationTable { root }
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn lookup(&self, key: &str) -> Option<&str> {
        if let Some(Value::String(s)) = self.root.get(key) {
            return Some(s.as_str());
        }
        let mut parts = key.split('.');
        let mut node = self.root.get(parts.next()?)?;
        for part in parts {
            node = node.as_object()?.get(part)?;
        }
        node.as_str()
    }
}

/// 翻訳サービスとの境界
#[async_trait]
pub trait Translator: Send {
    /// ブラウザ (実行環境) が希望する言語
    fn browser_lang(&self) -> Option<String>;

    fn set_default_lang(&mut self, lang: &str);

    fn default_lang(&self) -> Option<String>;

    /// アクティブなロケールを切り替え、そのキーテーブルを返す
    async fn use_lang(&mut self, lang: &str) -> Result<TranslationTable>;
}

/// メモリ上のテーブルを返す翻訳アダプタ
#[derive(Debug, Clone, Default)]
pub struct MemoryTranslator {
    tables: HashMap<String, TranslationTable>,
    browser_lang: Option<String>,
    default_lang: Option<String>,
    current_lang: Option<String>,
}

impl MemoryTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, lang: &str, table: TranslationTable) -> Self {
        self.tables.insert(lang.to_string(), table);
        self
    }

    pub fn with_browser_lang(mut self, lang: &str) -> Self {
        self.browser_lang = Some(lang.to_string());
        self
    }

    pub fn current_lang(&self) -> Option<&str> {
        self.current_lang.as_deref()
    }
}

#[async_trait]
impl Translator for MemoryTranslator {
    fn browser_lang(&self) -> Option<String> {
        self.browser_lang.clone()
    }

    fn set_default_lang(&mut self, lang: &str) {
        self.default_lang = Some(lang.to_string());
    }

    fn default_lang(&self) -> Option<String> {
        self.default_lang.clone()
    }

    async fn use_lang(&mut self, lang: &str) -> Result<TranslationTable> {
        self.current_lang = Some(lang.to_string());
        Ok(self.tables.get(lang).cloned().unwrap_or_default())
    }
}

/// `<dir>/**/<lang>.json` のロケールファイルを読む翻訳アダプタ
#[derive(Debug, Clone)]
pub struct JsonTranslator {
    files: HashMap<String, PathBuf>,
    browser_lang: Option<String>,
    default_lang: Option<String>,
    cache: HashMap<String, TranslationTable>,
}

impl JsonTranslator {
    /// ロケールファイルを持たない (すべて未翻訳になる) アダプタ
    pub fn new() -> Self {
        JsonTranslator {
            files: HashMap::new(),
            browser_lang: env_lang(),
            default_lang: None,
            cache: HashMap::new(),
        }
    }

    /// `dir` を再帰的に探索して `<lang>.json` を集める
    pub fn discover(dir: &Path) -> Result<Self> {
        let dir = dir.absolutize()?.to_path_buf();
        // "en", "de", "pt-BR", "zh_CN" のような名前だけをロケールとみなす
        let language_code = Regex::new(r"^[a-z]{2,3}(?:[-_][A-Za-z0-9]{2,8})*$")
            .map_err(|e| LocalizeError::Translation(e.to_string()))?;
        let mut files = HashMap::new();
        for entry in WalkDir::new(&dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_type().is_file() && e.path().extension().is_some_and(|ext| ext == "json")
            })
        {
            let Some(lang) = entry.path().file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !language_code.is_match(lang) {
                tracing::debug!(path = ?entry.path(), "not a locale file, skipped");
                continue;
            }
            tracing::debug!(lang, path = ?entry.path(), "found locale file");
            files.entry(lang.to_string()).or_insert_with(|| entry.path().to_path_buf());
        }
        Ok(JsonTranslator { files, ..Self::new() })
    }

    pub fn with_browser_lang(mut self, lang: Option<String>) -> Self {
        self.browser_lang = lang;
        self
    }

    /// 見つかったロケール (ソート済み)
    pub fn available_locales(&self) -> Vec<String> {
        let mut locales: Vec<String> = self.files.keys().cloned().collect();
        locales.sort();
        locales
    }
}

/// `LC_ALL` / `LANG` (例: "de_DE.UTF-8") から言語コードを取り出す
fn env_lang() -> Option<String> {
    ["LC_ALL", "LANG"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|v| !v.is_empty() && v != "C" && v != "POSIX")
        .and_then(|v| parse_env_lang(&v))
}

fn parse_env_lang(value: &str) -> Option<String> {
    let lang = value.split(['_', '-', '.', '@']).next()?;
    (!lang.is_empty()).then(|| lang.to_lowercase())
}

#[async_trait]
impl Translator for JsonTranslator {
    fn browser_lang(&self) -> Option<String> {
        self.browser_lang.clone()
    }

    fn set_default_lang(&mut self, lang: &str) {
        self.default_lang = Some(lang.to_string());
    }

    fn default_lang(&self) -> Option<String> {
        self.default_lang.clone()
    }

    async fn use_lang(&mut self, lang: &str) -> Result<TranslationTable> {
        if let Some(table) = self.cache.get(lang) {
            return Ok(table.clone());
        }
        let Some(path) = self.files.get(lang) else {
            tracing::warn!(lang, "no locale file, routes stay untranslated");
            return Ok(TranslationTable::default());
        };
        let src = tokio::fs::read_to_string(path).await?;
        let root = match serde_json::from_str::<Value>(&src)? {
            Value::Object(map) => map,
            _ => {
                return Err(LocalizeError::Translation(format!(
                    "{} is not a JSON object",
                    path.display()
                )));
            }
        };
        let table = TranslationTable::new(root);
        self.cache.insert(lang.to_string(), table.clone());
        Ok(table)
    }
}
