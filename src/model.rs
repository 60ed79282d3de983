// src/model.rs
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// どのルートにもマッチしなかった URL を受け止めるワイルドカードのパス
pub const WILDCARD_PATH: &str = "**";

/// 名前なし (メイン) のアウトレット名
pub const PRIMARY_OUTLET: &str = "primary";

/// ルーター設定の 1 ノード
///
/// Angular の `Route` と同じ形で JSON に (デ)シリアライズされる。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// ルートのパス (例: "home", "user/:id", "**", ""(空文字) など)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_match: Option<String>,

    /// 補助アウトレット名 (None ならメインのアウトレット)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outlet: Option<String>,

    /// 子ルート (children) があれば再帰的に格納
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Route>>,

    /// loadChildren で指定されたモジュールの参照
    /// 例: "./feature/feature.module"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_children: Option<String>,

    /// 遅延ロード済みのサブツリー
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loaded_routes: Option<Vec<Route>>,

    #[serde(default, skip_serializing_if = "RouteData::is_empty")]
    pub data: RouteData,

    /// このルート定義が書かれているソースファイル (解析時のみ)
    #[serde(skip)]
    pub source_file: Option<PathBuf>,
}

/// ルートの `data` バッグ
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteData {
    /// 翻訳前の値の記録 (最初の翻訳時に一度だけ書き込まれる)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub localize_router: Option<LocalizeOrigin>,

    /// true なら言語ラッパーの外に置かれ、翻訳もされない
    #[serde(default, skip_serializing_if = "is_false")]
    pub skip_route_localization: bool,

    /// それ以外のアプリケーション固有の値
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl RouteData {
    pub fn is_empty(&self) -> bool {
        self.localize_router.is_none() && !self.skip_route_localization && self.extra.is_empty()
    }
}

/// 翻訳対象のプロパティ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteProperty {
    Path,
    RedirectTo,
}

/// プロパティごとの翻訳前の値
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalizeOrigin {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
}

impl Route {
    pub fn new(path: impl Into<String>) -> Self {
        Route {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn redirect(path: impl Into<String>, redirect_to: impl Into<String>) -> Self {
        Route {
            path: Some(path.into()),
            redirect_to: Some(redirect_to.into()),
            ..Default::default()
        }
    }

    pub fn with_children(mut self, children: Vec<Route>) -> Self {
        self.children = Some(children);
        self
    }

    pub fn with_outlet(mut self, outlet: impl Into<String>) -> Self {
        self.outlet = Some(outlet.into());
        self
    }

    pub fn with_lazy(mut self, load_children: impl Into<String>, loaded: Option<Vec<Route>>) -> Self {
        self.load_children = Some(load_children.into());
        self.loaded_routes = loaded;
        self
    }

    pub fn skip_localization(mut self) -> Self {
        self.data.skip_route_localization = true;
        self
    }

    pub fn is_wildcard(&self) -> bool {
        self.path.as_deref() == Some(WILDCARD_PATH)
    }

    pub fn property(&self, property: RouteProperty) -> Option<&str> {
        match property {
            RouteProperty::Path => self.path.as_deref(),
            RouteProperty::RedirectTo => self.redirect_to.as_deref(),
        }
    }

    pub fn set_property(&mut self, property: RouteProperty, value: String) {
        match property {
            RouteProperty::Path => self.path = Some(value),
            RouteProperty::RedirectTo => self.redirect_to = Some(value),
        }
    }

    /// プロパティの翻訳前の値を返す
    ///
    /// まだ記録がなければ現在の値を `data.localizeRouter` に書き込む。
    /// 一度書かれた値は上書きされないので、何度翻訳し直しても元のテンプレートから始まる。
    pub fn origin_or_record(&mut self, property: RouteProperty) -> Option<String> {
        let current = self.property(property).map(str::to_string);
        let origin = self.data.localize_router.get_or_insert_with(Default::default);
        let slot = match property {
            RouteProperty::Path => &mut origin.path,
            RouteProperty::RedirectTo => &mut origin.redirect_to,
        };
        if slot.is_none() {
            *slot = current;
        }
        slot.clone()
    }

    /// 記録済みの翻訳前の値 (未記録なら None)
    pub fn origin(&self, property: RouteProperty) -> Option<&str> {
        let origin = self.data.localize_router.as_ref()?;
        match property {
            RouteProperty::Path => origin.path.as_deref(),
            RouteProperty::RedirectTo => origin.redirect_to.as_deref(),
        }
    }
}

/// ナビゲーション用のコマンド配列の 1 要素
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Command {
    Segment(String),
    Outlets(OutletCommand),
    Other(Value),
}

/// `{ outlets: { name: ... } }` 形式の補助アウトレットのブロック
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutletCommand {
    pub outlets: BTreeMap<String, Option<RoutePath>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// 文字列の URL かコマンド配列
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoutePath {
    Url(String),
    Commands(Vec<Command>),
}

impl From<&str> for RoutePath {
    fn from(url: &str) -> Self {
        RoutePath::Url(url.to_string())
    }
}

impl From<Vec<Command>> for RoutePath {
    fn from(commands: Vec<Command>) -> Self {
        RoutePath::Commands(commands)
    }
}

impl From<&str> for Command {
    fn from(segment: &str) -> Self {
        Command::Segment(segment.to_string())
    }
}

/// リモートから取得するロケール記述子
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocaleDescriptor {
    pub locales: Vec<String>,
    #[serde(default)]
    pub prefix: String,
}
