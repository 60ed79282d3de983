// src/module.rs
use std::sync::Arc;

use crate::cache::LanguageCache;
use crate::error::{LocalizeError, Result};
use crate::model::Route;
use crate::parser::LocalizeParser;
use crate::router::{Location, Router};
use crate::service::LocalizeRouterService;
use crate::settings::LocalizeSettings;
use crate::translator::Translator;

/// アプリケーションへのローカライズの組み込み
///
/// ルートモジュールのルートは `for_root` で一度だけ、遅延モジュールのルートは
/// `for_child` で何度でも登録できる。
#[derive(Debug, Default)]
pub struct LocalizeRouterModule {
    settings: Arc<LocalizeSettings>,
    root: Option<Vec<Route>>,
    children: Vec<Vec<Route>>,
}

impl LocalizeRouterModule {
    pub fn new(settings: LocalizeSettings) -> Self {
        LocalizeRouterModule {
            settings: Arc::new(settings),
            root: None,
            children: Vec::new(),
        }
    }

    pub fn settings(&self) -> &Arc<LocalizeSettings> {
        &self.settings
    }

    pub fn for_root(&mut self, routes: Vec<Route>) -> Result<&mut Self> {
        if self.root.is_some() {
            return Err(LocalizeError::ForRootCalledTwice);
        }
        self.root = Some(routes);
        Ok(self)
    }

    pub fn for_child(&mut self, routes: Vec<Route>) -> &mut Self {
        self.children.push(routes);
        self
    }

    /// 登録順に連結したルート
    pub fn raw_routes(&self) -> Vec<Route> {
        self.root
            .iter()
            .chain(self.children.iter())
            .flatten()
            .cloned()
            .collect()
    }

    /// 設定のロケール一覧を使うパーサー
    pub fn manual_parser<T: Translator>(
        &self,
        translate: T,
        location: Box<dyn Location>,
        cache: LanguageCache,
    ) -> LocalizeParser<T> {
        LocalizeParser::manual(translate, location, cache, Arc::clone(&self.settings))
    }

    /// ロケール一覧を記述子 (ファイルまたは URL) から取るパーサー
    pub fn remote_parser<T: Translator>(
        &self,
        translate: T,
        location: Box<dyn Location>,
        cache: LanguageCache,
        path: impl Into<String>,
    ) -> LocalizeParser<T> {
        LocalizeParser::remote(translate, location, cache, Arc::clone(&self.settings), path)
    }

    /// 登録済みのルートでパーサーを初期化し、ルーターと結んだサービスを返す
    pub async fn initialize<T: Translator, R: Router>(
        &self,
        mut parser: LocalizeParser<T>,
        router: R,
    ) -> Result<LocalizeRouterService<T, R>> {
        parser.load(self.raw_routes()).await?;
        let mut service = LocalizeRouterService::new(parser, router);
        service.init();
        tracing::info!(
            locales = ?service.parser().locales(),
            lang = ?service.current_lang(),
            "localize router initialized"
        );
        Ok(service)
    }
}
