// src/pipe.rs
use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::error::Result;
use crate::model::RoutePath;
use crate::router::Router;
use crate::service::LocalizeRouterService;
use crate::translator::Translator;

/// テンプレートでルートを表示するためのバインディング
///
/// 直前の入力と言語の組が同じなら前回の結果をそのまま返す。
pub struct LocalizePipe {
    changes: broadcast::Receiver<String>,
    last_key: Option<RoutePath>,
    last_language: Option<String>,
    value: Option<RoutePath>,
}

impl LocalizePipe {
    pub fn new<T: Translator, R: Router>(service: &LocalizeRouterService<T, R>) -> Self {
        LocalizePipe {
            changes: service.subscribe(),
            last_key: None,
            last_language: None,
            value: None,
        }
    }

    /// 前回の呼び出し以降に言語が変わったか (再描画が必要か)
    pub fn refresh(&mut self) -> bool {
        let mut changed = false;
        loop {
            match self.changes.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => changed = true,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return changed,
            }
        }
    }

    pub fn transform<T: Translator, R: Router>(
        &mut self,
        service: &LocalizeRouterService<T, R>,
        query: Option<&RoutePath>,
    ) -> Result<Option<RoutePath>> {
        let is_empty = match query {
            None => true,
            Some(RoutePath::Url(url)) => url.is_empty(),
            Some(RoutePath::Commands(commands)) => commands.is_empty(),
        };
        let Some(language) = service.current_lang() else {
            return Ok(query.cloned());
        };
        if is_empty {
            return Ok(query.cloned());
        }

        if self.last_key.as_ref() == query && self.last_language.as_deref() == Some(language) {
            return Ok(self.value.clone());
        }

        let value = service.translate_route(query)?;
        self.last_key = query.cloned();
        self.last_language = Some(language.to_string());
        self.value = value.clone();
        Ok(value)
    }
}
