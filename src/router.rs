// src/router.rs
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::model::{Command, PRIMARY_OUTLET, Route};

/// ルーターが流すイベント
#[derive(Debug, Clone, PartialEq)]
pub enum RouterEvent {
    NavigationStart { id: u64, url: String },
    NavigationEnd { id: u64, url: String, url_after_redirects: String },
    NavigationCancel { id: u64, url: String },
    NavigationError { id: u64, url: String },
}

impl RouterEvent {
    /// NavigationStart なら遷移先 URL を返す
    pub fn navigation_start_url(&self) -> Option<&str> {
        match self {
            RouterEvent::NavigationStart { url, .. } => Some(url.as_str()),
            _ => None,
        }
    }
}

/// マッチ時に切り出された URL セグメント
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UrlSegment {
    pub path: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}

impl UrlSegment {
    pub fn new(path: impl Into<String>) -> Self {
        UrlSegment {
            path: path.into(),
            parameters: BTreeMap::new(),
        }
    }
}

/// 現在アクティブなルートのスナップショット (ツリー)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivatedRouteSnapshot {
    #[serde(default)]
    pub url: Vec<UrlSegment>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub query_params: BTreeMap<String, String>,
    #[serde(default)]
    pub fragment: Option<String>,
    #[serde(default = "primary_outlet")]
    pub outlet: String,
    /// マッチしたルート設定 (マッチ時点の値)
    #[serde(default)]
    pub route_config: Option<Route>,
    #[serde(default)]
    pub children: Vec<ActivatedRouteSnapshot>,
}

fn primary_outlet() -> String {
    PRIMARY_OUTLET.to_string()
}

impl Default for ActivatedRouteSnapshot {
    fn default() -> Self {
        ActivatedRouteSnapshot {
            url: Vec::new(),
            params: BTreeMap::new(),
            query_params: BTreeMap::new(),
            fragment: None,
            outlet: primary_outlet(),
            route_config: None,
            children: Vec::new(),
        }
    }
}

impl ActivatedRouteSnapshot {
    /// `route` に `segments` がマッチしたノード
    pub fn matched(route: Route, segments: &[&str]) -> Self {
        ActivatedRouteSnapshot {
            outlet: route.outlet.clone().unwrap_or_else(primary_outlet),
            url: segments.iter().map(|s| UrlSegment::new(*s)).collect(),
            route_config: Some(route),
            ..Default::default()
        }
    }

    pub fn with_children(mut self, children: Vec<ActivatedRouteSnapshot>) -> Self {
        self.children = children;
        self
    }

    /// プライマリアウトレットの子 (補助アウトレットが先に並んでいても飛ばす)
    pub fn primary_child(&self) -> Option<&ActivatedRouteSnapshot> {
        self.children.iter().find(|c| c.is_primary())
    }

    pub fn is_primary(&self) -> bool {
        self.outlet == PRIMARY_OUTLET
    }
}

/// ナビゲーション時の追加情報
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationExtras {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_params: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragment: Option<String>,
}

/// ホスト側ルーターとの境界
pub trait Router {
    /// ルート設定を丸ごと置き換える
    fn reset_config(&mut self, routes: Vec<Route>);

    /// ルーターが保持している設定 (その場で書き換えるため)
    fn config_mut(&mut self) -> &mut Vec<Route>;

    fn snapshot(&self) -> ActivatedRouteSnapshot;

    fn navigate(&mut self, commands: Vec<Command>, extras: NavigationExtras) -> Result<()>;

    fn navigate_by_url(&mut self, url: &str) -> Result<()>;
}

/// 現在の URL のパス部分を返す
pub trait Location: Send + Sync {
    fn path(&self) -> String;
}

/// 固定のパスを返す Location
#[derive(Debug, Clone, Default)]
pub struct StaticLocation(pub String);

impl Location for StaticLocation {
    fn path(&self) -> String {
        self.0.clone()
    }
}

/// 記録されたナビゲーション要求
#[derive(Debug, Clone, PartialEq)]
pub enum Navigation {
    Commands(Vec<Command>, NavigationExtras),
    Url(String),
}

/// ナビゲーション要求を記録するだけのルーター
#[derive(Debug, Default)]
pub struct MemoryRouter {
    pub config: Vec<Route>,
    pub snapshot: ActivatedRouteSnapshot,
    pub navigations: Vec<Navigation>,
    pub resets: usize,
}

impl MemoryRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(mut self, snapshot: ActivatedRouteSnapshot) -> Self {
        self.snapshot = snapshot;
        self
    }
}

impl Router for MemoryRouter {
    fn reset_config(&mut self, routes: Vec<Route>) {
        self.resets += 1;
        self.config = routes;
    }

    fn config_mut(&mut self) -> &mut Vec<Route> {
        &mut self.config
    }

    fn snapshot(&self) -> ActivatedRouteSnapshot {
        self.snapshot.clone()
    }

    fn navigate(&mut self, commands: Vec<Command>, extras: NavigationExtras) -> Result<()> {
        tracing::debug!(?commands, "navigate");
        self.navigations.push(Navigation::Commands(commands, extras));
        Ok(())
    }

    fn navigate_by_url(&mut self, url: &str) -> Result<()> {
        tracing::debug!(url, "navigate by url");
        self.navigations.push(Navigation::Url(url.to_string()));
        Ok(())
    }
}
