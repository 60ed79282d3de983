// src/service.rs
use futures::{Stream, StreamExt};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::model::{Command, OutletCommand, Route, RouteProperty, RoutePath};
use crate::parser::LocalizeParser;
use crate::router::{ActivatedRouteSnapshot, NavigationExtras, Router, RouterEvent};
use crate::settings::LocalizeSettings;
use crate::translator::Translator;

/// 言語変更通知のバッファ
const ROUTE_CHANGE_CAPACITY: usize = 16;

/// パーサーとホストのルーターをつなぐサービス
///
/// ルーターのイベントに反応して言語を切り替え、アプリケーションからの
/// 言語変更要求を現在の画面を保ったまま別言語の URL へのナビゲーションに変換する。
pub struct LocalizeRouterService<T: Translator, R: Router> {
    parser: LocalizeParser<T>,
    router: R,
    settings: Arc<LocalizeSettings>,
    route_change: broadcast::Sender<String>,
    last_navigation_start: Option<String>,
}

impl<T: Translator, R: Router> LocalizeRouterService<T, R> {
    pub fn new(parser: LocalizeParser<T>, router: R) -> Self {
        let settings = Arc::clone(parser.settings());
        let (route_change, _) = broadcast::channel(ROUTE_CHANGE_CAPACITY);
        LocalizeRouterService {
            parser,
            router,
            settings,
            route_change,
            last_navigation_start: None,
        }
    }

    /// ルーターの設定をパーサーのツリーで置き換える
    pub fn init(&mut self) {
        self.router.reset_config(self.parser.routes().to_vec());
    }

    /// 言語が変わるたびに新しい言語コードを受け取る
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.route_change.subscribe()
    }

    pub fn parser(&self) -> &LocalizeParser<T> {
        &self.parser
    }

    pub fn router(&self) -> &R {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut R {
        &mut self.router
    }

    pub fn current_lang(&self) -> Option<&str> {
        self.parser.current_lang()
    }

    /// ルーターのイベントを最後まで処理する
    pub async fn run<S>(&mut self, mut events: S)
    where
        S: Stream<Item = RouterEvent> + Unpin,
    {
        while let Some(event) = events.next().await {
            if let Err(e) = self.handle_router_event(&event).await {
                tracing::warn!(error = %e, ?event, "router event failed");
            }
        }
    }

    /// 連続する NavigationStart の組ごとに URL の言語を比べ、変わっていれば切り替える
    pub async fn handle_router_event(&mut self, event: &RouterEvent) -> Result<()> {
        let Some(url) = event.navigation_start_url() else {
            return Ok(());
        };
        let Some(previous_url) = self.last_navigation_start.replace(url.to_string()) else {
            return Ok(());
        };

        let default_lang = self.parser.default_lang().map(str::to_string);
        let current = self.parser.get_location_lang(Some(&previous_url)).or_else(|| default_lang.clone());
        let next = self.parser.get_location_lang(Some(url)).or(default_lang);
        let (Some(current), Some(next)) = (current, next) else {
            return Ok(());
        };
        if current == next || self.parser.current_lang() == Some(next.as_str()) {
            return Ok(());
        }

        tracing::debug!(from = %current, to = %next, url, "language changed by navigation");
        let previous = self.parser.current_lang().unwrap_or(current.as_str()).to_string();
        self.parser
            .mutate_router_root_route(&next, &previous, self.router.config_mut());
        self.parser.translate_routes(&next).await?;
        self.router.reset_config(self.parser.routes().to_vec());
        self.notify(&next);
        Ok(())
    }

    /// 現在の画面を保ったまま言語を切り替える
    pub async fn change_language(&mut self, lang: &str) -> Result<()> {
        if self.parser.current_lang() == Some(lang) {
            return Ok(());
        }

        let snapshot = self.router.snapshot();
        self.parser.translate_routes(lang).await?;
        self.router.reset_config(self.parser.routes().to_vec());

        let commands = self.snapshot_commands(&snapshot, lang);
        let extras = NavigationExtras {
            query_params: (!snapshot.query_params.is_empty()).then(|| snapshot.query_params.clone()),
            fragment: snapshot.fragment.clone(),
        };

        if self.settings.use_url_navigation {
            let url = serialize_url(&commands, &extras);
            tracing::info!(lang, %url, "navigating to localized url");
            self.router.navigate_by_url(&url)?;
        } else {
            tracing::info!(lang, ?commands, "navigating to localized commands");
            self.router.navigate(commands, extras)?;
        }
        self.notify(lang);
        Ok(())
    }

    /// パスまたはコマンド配列を現在の言語に翻訳する
    pub fn translate_route(&self, path: Option<&RoutePath>) -> Result<Option<RoutePath>> {
        match path {
            None => Ok(None),
            Some(RoutePath::Url(url)) => Ok(Some(RoutePath::Url(self.translate_url(url)?))),
            Some(RoutePath::Commands(commands)) => {
                Ok(Some(RoutePath::Commands(self.translate_commands(commands)?)))
            }
        }
    }

    /// 遅延ロードされたルートを翻訳してツリーに組み込み、ルーターに反映する
    pub fn load_child_routes(&mut self, load_children: &str, routes: Vec<Route>) -> bool {
        let attached = self.parser.attach_lazy_routes(load_children, routes);
        if attached {
            self.router.reset_config(self.parser.routes().to_vec());
        }
        attached
    }

    fn translate_url(&self, url: &str) -> Result<String> {
        let translated = self.parser.translate_route(url)?;
        Ok(if url.starts_with('/') {
            self.parser.prefixed_url(&translated)
        } else {
            translated
        })
    }

    fn translate_commands(&self, commands: &[Command]) -> Result<Vec<Command>> {
        commands
            .iter()
            .enumerate()
            .map(|(index, command)| -> Result<Command> {
                Ok(match command {
                    Command::Segment(segment) if index == 0 => Command::Segment(self.translate_url(segment)?),
                    Command::Segment(segment) => Command::Segment(self.parser.translate_route(segment)?),
                    Command::Outlets(block) => Command::Outlets(OutletCommand {
                        outlets: block
                            .outlets
                            .iter()
                            .map(|(name, path)| -> Result<(String, Option<RoutePath>)> {
                                Ok((name.clone(), self.translate_route(path.as_ref())?))
                            })
                            .collect::<Result<_>>()?,
                        extra: block.extra.clone(),
                    }),
                    other => other.clone(),
                })
            })
            .collect()
    }

    fn notify(&self, lang: &str) {
        if let Err(e) = self.route_change.send(lang.to_string()) {
            tracing::debug!(error = %e, "no language change subscribers");
        }
    }

    /// スナップショットから新しい言語での遷移先コマンドを組み立てる
    fn snapshot_commands(&self, root: &ActivatedRouteSnapshot, lang: &str) -> Vec<Command> {
        let mut commands = Vec::new();
        match root.primary_child() {
            None => {}
            Some(child) if self.is_language_wrapper(child) => self.collect_children(child, &mut commands),
            Some(_) => self.collect_children(root, &mut commands),
        }

        let enforced = self.settings.always_set_prefix || self.parser.default_lang() != Some(lang);
        if enforced {
            commands.insert(0, Command::Segment(format!("/{lang}")));
        } else {
            match commands.first_mut() {
                Some(Command::Segment(first)) => *first = format!("/{first}"),
                _ => commands.insert(0, Command::Segment("/".to_string())),
            }
        }
        commands
    }

    fn collect(&self, node: &ActivatedRouteSnapshot, out: &mut Vec<Command>) {
        let segment = self.segment_value(node);
        if !segment.is_empty() {
            out.push(Command::Segment(segment));
        }
        if let Some(matrix) = node.url.last().filter(|s| !s.parameters.is_empty()) {
            let params: Map<String, Value> = matrix
                .parameters
                .iter()
                .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
                .collect();
            out.push(Command::Other(Value::Object(params)));
        }
        self.collect_children(node, out);
    }

    fn collect_children(&self, node: &ActivatedRouteSnapshot, out: &mut Vec<Command>) {
        let mut outlets = BTreeMap::new();
        for child in node.children.iter().filter(|c| !c.is_primary()) {
            let mut commands = Vec::new();
            self.collect(child, &mut commands);
            let path = match commands.as_slice() {
                [] => continue,
                [Command::Segment(single)] => RoutePath::Url(single.clone()),
                _ => RoutePath::Commands(commands),
            };
            outlets.insert(child.outlet.clone(), Some(path));
        }
        if !outlets.is_empty() {
            out.push(Command::Outlets(OutletCommand {
                outlets,
                extra: Map::new(),
            }));
        }
        if let Some(primary) = node.primary_child() {
            self.collect(primary, out);
        }
    }

    /// 翻訳前のテンプレートを新しい言語で翻訳し、`:param` を実際の値で埋める
    fn segment_value(&self, node: &ActivatedRouteSnapshot) -> String {
        let Some(config) = &node.route_config else {
            return String::new();
        };
        if config.is_wildcard() {
            return node
                .url
                .iter()
                .map(|s| s.path.as_str())
                .filter(|p| !p.is_empty())
                .collect::<Vec<_>>()
                .join("/");
        }

        let template = match config.origin(RouteProperty::Path) {
            Some(origin) => self
                .parser
                .translate_route(origin)
                .unwrap_or_else(|_| origin.to_string()),
            None => config.path.clone().unwrap_or_default(),
        };
        template
            .split('/')
            .enumerate()
            .map(|(i, part)| match (part.starts_with(':'), node.url.get(i)) {
                (true, Some(segment)) => segment.path.as_str(),
                _ => part,
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    /// 言語ラッパーとして合成されたノードか
    ///
    /// たまたまロケール名と同じパスを持つ通常のルートは、翻訳元の記録や
    /// data を持つので区別できる。
    fn is_language_wrapper(&self, node: &ActivatedRouteSnapshot) -> bool {
        let Some(config) = &node.route_config else {
            return false;
        };
        config
            .path
            .as_ref()
            .is_some_and(|path| self.parser.locales().contains(path))
            && config.children.is_some()
            && config.redirect_to.is_none()
            && config.data.is_empty()
    }
}

/// コマンド配列と追加情報を URL 文字列にする
pub fn serialize_url(commands: &[Command], extras: &NavigationExtras) -> String {
    let mut url = join_commands(commands);
    if let Some(query) = extras.query_params.as_ref().filter(|q| !q.is_empty()) {
        let query = query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        url.push('?');
        url.push_str(&query);
    }
    if let Some(fragment) = &extras.fragment {
        url.push('#');
        url.push_str(&urlencoding::encode(fragment));
    }
    url
}

fn join_commands(commands: &[Command]) -> String {
    let mut url = String::new();
    for command in commands {
        match command {
            Command::Segment(segment) => {
                if !url.is_empty() && !url.ends_with('/') && !segment.starts_with('/') {
                    url.push('/');
                }
                url.push_str(segment);
            }
            Command::Outlets(block) => {
                let outlets = block
                    .outlets
                    .iter()
                    .filter_map(|(name, path)| {
                        let path = match path.as_ref()? {
                            RoutePath::Url(u) => u.trim_start_matches('/').to_string(),
                            RoutePath::Commands(c) => join_commands(c).trim_start_matches('/').to_string(),
                        };
                        Some(format!("{name}:{path}"))
                    })
                    .collect::<Vec<_>>();
                if !outlets.is_empty() {
                    url.push('(');
                    url.push_str(&outlets.join("//"));
                    url.push(')');
                }
            }
            Command::Other(Value::Object(params)) => {
                for (k, v) in params {
                    let v = v.as_str().map_or_else(|| v.to_string(), str::to_string);
                    url.push_str(&format!(";{}={}", urlencoding::encode(k), urlencoding::encode(&v)));
                }
            }
            Command::Other(_) => {}
        }
    }
    url
}
