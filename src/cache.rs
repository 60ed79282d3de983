// src/cache.rs
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{LocalizeError, Result};
use crate::settings::{CacheMechanism, LocalizeSettings};

/// Cookie の有効期限 (日)
pub const COOKIE_EXPIRY_DAYS: i64 = 30;

/// 名前をキーにした文字列の保存先
pub trait CacheStore: Send + Sync {
    fn get(&self, name: &str) -> Result<Option<String>>;
    fn set(&mut self, name: &str, value: &str) -> Result<()>;
}

/// 最後に使った言語を覚えておくキャッシュ
///
/// 保存先のエラーはすべて握りつぶし、キャッシュなしとして扱う。
pub struct LanguageCache {
    store: Option<Box<dyn CacheStore>>,
    name: String,
    enabled: bool,
}

impl LanguageCache {
    pub fn new(settings: &LocalizeSettings, store: Box<dyn CacheStore>) -> Self {
        LanguageCache {
            store: Some(store),
            name: settings.cache_name.clone(),
            enabled: settings.use_cached_lang,
        }
    }

    /// 設定の `cacheMechanism` に応じて `dir` 配下のファイルを使う
    pub fn for_mechanism(settings: &LocalizeSettings, dir: &Path) -> Self {
        let store: Box<dyn CacheStore> = match settings.cache_mechanism {
            CacheMechanism::LocalStorage => Box::new(LocalStorage::new(dir.join("local_storage.json"))),
            CacheMechanism::Cookie => Box::new(CookieJar::new(dir.join("cookies.txt"))),
        };
        Self::new(settings, store)
    }

    /// 保存先を持たないキャッシュ (常にキャッシュなし)
    pub fn unavailable(settings: &LocalizeSettings) -> Self {
        LanguageCache {
            store: None,
            name: settings.cache_name.clone(),
            enabled: settings.use_cached_lang,
        }
    }

    pub fn get(&self) -> Option<String> {
        if !self.enabled {
            return None;
        }
        let store = self.store.as_ref()?;
        match store.get(&self.name) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                tracing::debug!(error = %e, "language cache read failed");
                None
            }
        }
    }

    pub fn set(&mut self, value: &str) {
        if !self.enabled || value.is_empty() {
            return;
        }
        let Some(store) = self.store.as_mut() else {
            return;
        };
        if let Err(e) = store.set(&self.name, value) {
            tracing::debug!(error = %e, "language cache write failed");
        }
    }
}

/// プロセス内だけで保持する保存先
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    values: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, name: &str, value: &str) -> Self {
        self.values.insert(name.to_string(), value.to_string());
        self
    }
}

impl CacheStore for MemoryStorage {
    fn get(&self, name: &str) -> Result<Option<String>> {
        Ok(self.values.get(name).cloned())
    }

    fn set(&mut self, name: &str, value: &str) -> Result<()> {
        self.values.insert(name.to_string(), value.to_string());
        Ok(())
    }
}

/// JSON ファイルに保存する永続ストレージ (ブラウザの localStorage 相当)
#[derive(Debug, Clone)]
pub struct LocalStorage {
    file_path: PathBuf,
}

impl LocalStorage {
    pub fn new(file_path: PathBuf) -> Self {
        LocalStorage { file_path }
    }

    fn read_all(&self) -> Result<Map<String, Value>> {
        if !self.file_path.exists() {
            return Ok(Map::new());
        }
        let src = fs::read_to_string(&self.file_path)?;
        Ok(serde_json::from_str(&src)?)
    }
}

impl CacheStore for LocalStorage {
    fn get(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .read_all()?
            .get(name)
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    fn set(&mut self, name: &str, value: &str) -> Result<()> {
        let mut all = self.read_all()?;
        all.insert(name.to_string(), Value::from(value));
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.file_path, serde_json::to_string_pretty(&all)?)?;
        Ok(())
    }
}

/// `name=value;expires=...` 形式の行を保存する Cookie ジャー
///
/// 期限切れの Cookie は読み取り時に無視される。
#[derive(Debug, Clone)]
pub struct CookieJar {
    file_path: PathBuf,
}

impl CookieJar {
    pub fn new(file_path: PathBuf) -> Self {
        CookieJar { file_path }
    }

    fn lines(&self) -> Result<Vec<String>> {
        if !self.file_path.exists() {
            return Ok(Vec::new());
        }
        Ok(fs::read_to_string(&self.file_path)?
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    /// 有効期限内の Cookie を `document.cookie` と同じ形に連結する
    fn cookie_header(&self, now: DateTime<Utc>) -> Result<String> {
        let live: Vec<String> = self
            .lines()?
            .into_iter()
            .filter(|line| !is_expired(line, now))
            .filter_map(|line| line.split(';').next().map(|kv| kv.trim().to_string()))
            .collect();
        Ok(live.join("; "))
    }
}

fn is_expired(line: &str, now: DateTime<Utc>) -> bool {
    line.split(';')
        .skip(1)
        .filter_map(|attr| attr.trim().strip_prefix("expires="))
        .filter_map(|date| DateTime::parse_from_rfc2822(date).ok())
        .any(|expires| expires.with_timezone(&Utc) <= now)
}

impl CacheStore for CookieJar {
    fn get(&self, name: &str) -> Result<Option<String>> {
        let header = self.cookie_header(Utc::now())?;
        let name = regex::escape(&urlencoding::encode(name));
        let pattern = Regex::new(&format!(r"(?:^|;\s*){name}=([^;]*)"))
            .map_err(|e| LocalizeError::Cache(e.to_string()))?;
        let Some(captures) = pattern.captures(&header) else {
            return Ok(None);
        };
        let value = urlencoding::decode(&captures[1])
            .map_err(|e| LocalizeError::Cache(e.to_string()))?;
        Ok(Some(value.into_owned()))
    }

    fn set(&mut self, name: &str, value: &str) -> Result<()> {
        let name = urlencoding::encode(name).into_owned();
        let expires = Utc::now() + Duration::days(COOKIE_EXPIRY_DAYS);
        let cookie = format!(
            "{}={};expires={}",
            name,
            urlencoding::encode(value),
            expires.format("%a, %d %b %Y %H:%M:%S GMT")
        );

        let prefix = format!("{name}=");
        let mut lines: Vec<String> = self
            .lines()?
            .into_iter()
            .filter(|line| !line.starts_with(&prefix))
            .collect();
        lines.push(cookie);

        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.file_path, lines.join("\n"))?;
        Ok(())
    }
}
