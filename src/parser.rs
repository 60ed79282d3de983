// src/parser.rs
use path_absolutize::Absolutize;
use std::path::Path;
use std::sync::Arc;

use crate::cache::LanguageCache;
use crate::error::{LocalizeError, Result};
use crate::model::{LocaleDescriptor, Route, RouteProperty, WILDCARD_PATH};
use crate::router::Location;
use crate::settings::LocalizeSettings;
use crate::translator::{TranslationTable, Translator};

/// ロケール一覧と翻訳キーの接頭辞の取得元
#[derive(Debug, Clone)]
enum LocaleSource {
    /// 設定値をそのまま使う
    Manual,
    /// 最初の load 時に `{ locales, prefix }` の記述子を取得する
    Remote { path: String, loaded: bool },
}

/// ルート直下のリストにおける合成ノードの位置
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RootLayout {
    wrapper: Option<usize>,
    wildcard: Option<usize>,
}

/// ルートツリーに言語セグメントを差し込み、パスを翻訳するパーサー
///
/// ルートツリーを書き換えられるのはこのパーサーだけで、ルーターには
/// `routes()` のコピーが渡される。書き換えはすべて `&mut self` を通る。
pub struct LocalizeParser<T: Translator> {
    translate: T,
    location: Box<dyn Location>,
    cache: LanguageCache,
    settings: Arc<LocalizeSettings>,
    source: LocaleSource,
    locales: Vec<String>,
    prefix: String,
    current_lang: Option<String>,
    default_lang: Option<String>,
    routes: Vec<Route>,
    layout: RootLayout,
    translations: TranslationTable,
}

impl<T: Translator> LocalizeParser<T> {
    /// ロケール一覧と接頭辞を設定 (`supportedLocales` / `localePrefix`) から取る
    pub fn manual(
        translate: T,
        location: Box<dyn Location>,
        cache: LanguageCache,
        settings: Arc<LocalizeSettings>,
    ) -> Self {
        let locales = settings.supported_locales.clone();
        let prefix = settings.locale_prefix.clone();
        Self::with_source(translate, location, cache, settings, LocaleSource::Manual, locales, prefix)
    }

    /// ロケール一覧と接頭辞を `path` (ファイルまたは http(s) URL) の記述子から取る
    pub fn remote(
        translate: T,
        location: Box<dyn Location>,
        cache: LanguageCache,
        settings: Arc<LocalizeSettings>,
        path: impl Into<String>,
    ) -> Self {
        let source = LocaleSource::Remote {
            path: path.into(),
            loaded: false,
        };
        Self::with_source(translate, location, cache, settings, source, Vec::new(), String::new())
    }

    fn with_source(
        translate: T,
        location: Box<dyn Location>,
        cache: LanguageCache,
        settings: Arc<LocalizeSettings>,
        source: LocaleSource,
        locales: Vec<String>,
        prefix: String,
    ) -> Self {
        LocalizeParser {
            translate,
            location,
            cache,
            settings,
            source,
            locales,
            prefix,
            current_lang: None,
            default_lang: None,
            routes: Vec::new(),
            layout: RootLayout::default(),
            translations: TranslationTable::default(),
        }
    }

    pub fn locales(&self) -> &[String] {
        &self.locales
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn current_lang(&self) -> Option<&str> {
        self.current_lang.as_deref()
    }

    pub fn default_lang(&self) -> Option<&str> {
        self.default_lang.as_deref()
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn settings(&self) -> &Arc<LocalizeSettings> {
        &self.settings
    }

    pub fn translator(&self) -> &T {
        &self.translate
    }

    /// 言語ラッパーのルート直下での位置
    pub fn wrapper_index(&self) -> Option<usize> {
        self.layout.wrapper
    }

    /// ルートを読み込み、必要なら先にロケール記述子を取得する
    pub async fn load(&mut self, routes: Vec<Route>) -> Result<()> {
        if let LocaleSource::Remote { path, loaded } = &mut self.source {
            if !*loaded {
                let descriptor = fetch_descriptor(path).await?;
                tracing::info!(locales = ?descriptor.locales, prefix = %descriptor.prefix, "locale descriptor loaded");
                self.locales = descriptor.locales;
                self.prefix = descriptor.prefix;
                *loaded = true;
            }
        }
        self.init(routes).await
    }

    /// 言語を決定してツリーを組み替え、選択した言語に翻訳する
    pub async fn init(&mut self, routes: Vec<Route>) -> Result<()> {
        self.routes = routes;
        self.layout = RootLayout::default();

        if self.locales.is_empty() {
            tracing::debug!("no locales configured, routes left untouched");
            return Ok(());
        }

        let location_lang = self.get_location_lang(None);
        let cached_lang = self.cached_lang();
        let browser_lang = self.browser_lang();
        let default_lang = match &self.settings.default_lang_function {
            Some(f) => f(&self.locales, cached_lang.as_deref(), browser_lang.as_deref()),
            None => cached_lang
                .or(browser_lang)
                .unwrap_or_else(|| self.locales[0].clone()),
        };
        self.translate.set_default_lang(&default_lang);
        self.default_lang = Some(default_lang.clone());
        let selected = location_lang.unwrap_or_else(|| default_lang.clone());
        tracing::debug!(default = %default_lang, selected = %selected, "language detected");

        self.build_layout(&default_lang, &selected);
        self.translate_routes(&selected).await
    }

    fn build_layout(&mut self, default_lang: &str, selected: &str) {
        let enforced = self.settings.always_set_prefix;

        let wildcard_index = self.routes.iter().position(Route::is_wildcard);
        let wildcard = wildcard_index.map(|i| self.routes.remove(i));

        let children = if enforced {
            let base = Route {
                path: Some(String::new()),
                redirect_to: Some(default_lang.to_string()),
                path_match: Some("full".to_string()),
                ..Default::default()
            };
            std::mem::replace(&mut self.routes, vec![base])
        } else {
            self.routes.clone()
        };

        let (skipped, children): (Vec<Route>, Vec<Route>) = children
            .into_iter()
            .partition(|route| route.data.skip_route_localization);
        if enforced {
            self.routes.extend(skipped);
        }

        if self.locales.len() > 1 || enforced {
            let wrapper = Route {
                path: Some(selected.to_string()),
                children: Some(children),
                ..Default::default()
            };
            let index = if enforced { 1 } else { 0 };
            self.routes.insert(index, wrapper);
            self.layout.wrapper = Some(index);
        }

        if let Some(wildcard) = wildcard {
            if enforced {
                self.routes.push(wildcard);
                self.layout.wildcard = Some(self.routes.len() - 1);
            } else {
                let shift = usize::from(self.layout.wrapper.is_some());
                let index = wildcard_index.unwrap_or_default() + shift;
                let index = index.min(self.routes.len());
                self.routes.insert(index, wildcard);
                self.layout.wildcard = Some(index);
            }
        }
    }

    /// ツリー全体を `language` に翻訳し直す
    pub async fn translate_routes(&mut self, language: &str) -> Result<()> {
        // 翻訳表の取得に失敗したら状態は一切変えない
        self.translations = self.translate.use_lang(language).await?;
        self.cache.set(language);
        if let Some(index) = self.layout.wrapper {
            self.routes[index].path = Some(language.to_string());
        }
        self.current_lang = Some(language.to_string());

        let mut routes = std::mem::take(&mut self.routes);
        for (index, route) in routes.iter_mut().enumerate() {
            if Some(index) == self.layout.wrapper {
                if let Some(children) = route.children.as_mut() {
                    self.translate_tree(children);
                }
            } else if Some(index) == self.layout.wildcard {
                if route.redirect_to.is_some() {
                    self.translate_property(route, RouteProperty::RedirectTo, true);
                }
            } else if !self.settings.always_set_prefix && !route.data.skip_route_localization {
                self.translate_node(route);
            }
        }
        self.routes = routes;

        tracing::info!(language, "routes translated");
        Ok(())
    }

    fn translate_tree(&self, routes: &mut [Route]) {
        for route in routes {
            self.translate_node(route);
        }
    }

    fn translate_node(&self, route: &mut Route) {
        if route.path.as_deref().is_some_and(|p| p != WILDCARD_PATH) {
            self.translate_property(route, RouteProperty::Path, false);
        }
        if route.redirect_to.is_some() {
            self.translate_property(route, RouteProperty::RedirectTo, false);
        }
        if let Some(children) = route.children.as_mut() {
            self.translate_tree(children);
        }
        if let Some(loaded) = route.loaded_routes.as_mut() {
            self.translate_tree(loaded);
        }
    }

    fn translate_property(&self, route: &mut Route, property: RouteProperty, force_prefix: bool) {
        let Some(origin) = route.origin_or_record(property) else {
            return;
        };
        let translated = match self.translate_route(&origin) {
            Ok(translated) => translated,
            Err(e) => {
                tracing::warn!(error = %e, "route left untranslated");
                return;
            }
        };
        let absolute = property == RouteProperty::RedirectTo && origin.starts_with('/');
        let value = if force_prefix || absolute {
            self.prefixed_url(&translated)
        } else {
            translated
        };
        route.set_property(property, value);
    }

    /// パスをセグメントごとに翻訳する (クエリブロックはそのまま)
    pub fn translate_route(&self, path: &str) -> Result<String> {
        let mut blocks = path.split('?');
        let base = blocks.next().unwrap_or_default();
        let query = blocks.next();
        if blocks.next().is_some() {
            return Err(LocalizeError::MultipleQueryBlocks(path.to_string()));
        }

        let translated = base
            .split('/')
            .map(|segment| {
                if segment.is_empty() {
                    String::new()
                } else {
                    self.translate_text(segment)
                }
            })
            .collect::<Vec<_>>()
            .join("/");

        Ok(match query {
            Some(query) => format!("{translated}?{query}"),
            None => translated,
        })
    }

    fn translate_text(&self, segment: &str) -> String {
        let key = format!("{}{}", self.prefix, segment);
        match self.translations.lookup(&key) {
            Some(translated) if translated != key => translated.to_string(),
            _ => segment.to_string(),
        }
    }

    /// URL (省略時は現在の Location) の先頭セグメントがロケールならそれを返す
    pub fn get_location_lang(&self, url: Option<&str>) -> Option<String> {
        let url = match url {
            Some(url) => url.to_string(),
            None => self.location.path(),
        };
        let path = url.split(['?', ';', '#', '(']).next().unwrap_or_default();
        // 先頭スラッシュの有無どちらでも拾えるよう 2 番目、1 番目の順に見る
        let slices: Vec<&str> = path.split('/').collect();
        [slices.get(1), slices.first()]
            .into_iter()
            .flatten()
            .find_map(|slice| self.locales.iter().find(|locale| locale == slice))
            .cloned()
    }

    /// URL に差し込む言語 (デフォルト言語で接頭辞を省く場合は空文字)
    pub fn url_prefix(&self) -> &str {
        match &self.current_lang {
            Some(current)
                if self.settings.always_set_prefix || Some(current) != self.default_lang.as_ref() =>
            {
                current.as_str()
            }
            _ => "",
        }
    }

    /// 翻訳済みの絶対パスの先頭に言語を付ける
    pub fn prefixed_url(&self, translated: &str) -> String {
        let prefix = self.url_prefix();
        if prefix.is_empty() {
            if translated.starts_with('/') {
                translated.to_string()
            } else {
                format!("/{translated}")
            }
        } else {
            format!("/{}/{}", prefix, translated.trim_start_matches('/'))
        }
    }

    /// 後から読み込まれた遅延ルートを現在の言語で翻訳する
    pub fn init_child_routes(&self, mut routes: Vec<Route>) -> Vec<Route> {
        if self.current_lang.is_some() {
            self.translate_tree(&mut routes);
        }
        routes
    }

    /// `loadChildren` が `load_children` のノードに遅延ルートを翻訳して格納する
    pub fn attach_lazy_routes(&mut self, load_children: &str, routes: Vec<Route>) -> bool {
        let routes = self.init_child_routes(routes);
        match find_lazy_route(&mut self.routes, load_children) {
            Some(route) => {
                route.loaded_routes = Some(routes);
                true
            }
            None => {
                tracing::warn!(load_children, "no route with matching loadChildren");
                false
            }
        }
    }

    /// ルーターが持つ言語ラッパーのパスをその場で書き換える
    pub fn mutate_router_root_route(&self, current: &str, previous: &str, config: &mut [Route]) {
        let Some(index) = self.layout.wrapper else {
            return;
        };
        if let Some(route) = config
            .get_mut(index)
            .filter(|route| route.path.as_deref() == Some(previous))
        {
            route.path = Some(current.to_string());
        }
    }

    fn cached_lang(&self) -> Option<String> {
        self.cache.get().and_then(|lang| self.return_if_in_locales(lang))
    }

    fn browser_lang(&self) -> Option<String> {
        self.translate
            .browser_lang()
            .and_then(|lang| self.return_if_in_locales(lang))
    }

    fn return_if_in_locales(&self, lang: String) -> Option<String> {
        self.locales.contains(&lang).then_some(lang)
    }
}

fn find_lazy_route<'a>(routes: &'a mut [Route], load_children: &str) -> Option<&'a mut Route> {
    for route in routes {
        if route.load_children.as_deref() == Some(load_children) {
            return Some(route);
        }
        if let Some(children) = route.children.as_deref_mut() {
            if let Some(found) = find_lazy_route(children, load_children) {
                return Some(found);
            }
        }
        if let Some(loaded) = route.loaded_routes.as_deref_mut() {
            if let Some(found) = find_lazy_route(loaded, load_children) {
                return Some(found);
            }
        }
    }
    None
}

async fn fetch_descriptor(path: &str) -> Result<LocaleDescriptor> {
    let descriptor: LocaleDescriptor = if path.starts_with("http://") || path.starts_with("https://") {
        reqwest::get(path).await?.error_for_status()?.json().await?
    } else {
        let file = Path::new(path).absolutize()?.to_path_buf();
        let src = tokio::fs::read_to_string(&file).await?;
        serde_json::from_str(&src)?
    };
    if descriptor.locales.is_empty() {
        return Err(LocalizeError::Descriptor(format!("{path} lists no locales")));
    }
    Ok(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStorage;
    use crate::router::StaticLocation;
    use crate::translator::MemoryTranslator;

    const PREFIX: &str = "PREFIX.";

    fn translator(locales: &[&str]) -> MemoryTranslator {
        let keys = ["home", "about", "contact", "info"];
        locales.iter().fold(MemoryTranslator::new(), |t, lang| {
            let table = TranslationTable::from_pairs(
                keys.iter()
                    .map(|k| (format!("{PREFIX}{k}"), format!("{k}_{lang}"))),
            );
            t.with_table(lang, table)
        })
    }

    fn parser_with(
        settings: LocalizeSettings,
        translate: MemoryTranslator,
        cached: Option<&str>,
        location: &str,
    ) -> LocalizeParser<MemoryTranslator> {
        let mut store = MemoryStorage::new();
        if let Some(lang) = cached {
            store = store.with_value(&settings.cache_name, lang);
        }
        let cache = LanguageCache::new(&settings, Box::new(store));
        LocalizeParser::manual(
            translate,
            Box::new(StaticLocation(location.to_string())),
            cache,
            Arc::new(settings),
        )
    }

    fn parser(cached: Option<&str>) -> LocalizeParser<MemoryTranslator> {
        let settings = LocalizeSettings::default()
            .with_locales(["en", "de", "fr"])
            .with_prefix(PREFIX);
        parser_with(settings, translator(&["en", "de", "fr"]), cached, "")
    }

    fn wrapper_children(parser: &LocalizeParser<MemoryTranslator>) -> &[Route] {
        parser.routes()[1].children.as_deref().unwrap()
    }

    #[test]
    fn uses_settings_locales() {
        let parser = parser(None);
        assert_eq!(parser.locales(), ["en", "de", "fr"]);
        assert_eq!(parser.prefix(), PREFIX);
    }

    #[test]
    fn location_lang_detection() {
        let parser = parser(None);
        for url in ["/en/x", "en/x", "en", "en/", "/en", "en?q=1", "/en;a=b", "/en(aux:x)"] {
            assert_eq!(parser.get_location_lang(Some(url)).as_deref(), Some("en"), "{url}");
        }
        assert_eq!(parser.get_location_lang(Some("de/some/path/after")).as_deref(), Some("de"));
        assert_eq!(parser.get_location_lang(Some("foo/de")).as_deref(), Some("de"));
        assert_eq!(parser.get_location_lang(Some("en/de/x")).as_deref(), Some("de"));
        for url in ["/xx/some/path", "rs/some/path", "", "/", "/home/en"] {
            assert_eq!(parser.get_location_lang(Some(url)), None, "{url}");
        }
    }

    #[tokio::test]
    async fn no_locales_leaves_routes_untouched() {
        let settings = LocalizeSettings::default().with_locales(Vec::<String>::new());
        let mut parser = parser_with(settings, translator(&[]), None, "");
        let routes = vec![Route::redirect("", "some/path"), Route::new("some/path")];
        parser.load(routes.clone()).await.unwrap();
        assert_eq!(parser.routes(), routes.as_slice());
        assert_eq!(parser.current_lang(), None);
    }

    #[tokio::test]
    async fn browser_language_is_default() {
        let settings = LocalizeSettings::default()
            .with_locales(["en", "de", "fr"])
            .with_prefix(PREFIX);
        let mut parser = parser_with(settings, translator(&["en", "de"]).with_browser_lang("de"), None, "");
        parser.load(Vec::new()).await.unwrap();

        let mut base = Route::redirect("", "de");
        base.path_match = Some("full".into());
        assert_eq!(parser.routes()[0], base);
        assert_eq!(parser.routes()[1], Route::new("de").with_children(Vec::new()));
        assert_eq!(parser.current_lang(), Some("de"));
        assert_eq!(parser.translator().current_lang(), Some("de"));
        assert_eq!(parser.translator().default_lang().as_deref(), Some("de"));
    }

    #[tokio::test]
    async fn cached_language_wins_over_browser() {
        let settings = LocalizeSettings::default()
            .with_locales(["en", "de", "fr"])
            .with_prefix(PREFIX);
        let mut parser = parser_with(settings, translator(&["en"]).with_browser_lang("de"), Some("fr"), "");
        parser.load(Vec::new()).await.unwrap();
        assert_eq!(parser.routes()[0].redirect_to.as_deref(), Some("fr"));
        assert_eq!(parser.current_lang(), Some("fr"));
    }

    #[tokio::test]
    async fn unknown_browser_language_falls_back_to_first_locale() {
        let settings = LocalizeSettings::default().with_locales(["en", "de"]);
        let mut parser = parser_with(settings, translator(&[]).with_browser_lang("se"), Some("xx"), "");
        parser.load(Vec::new()).await.unwrap();
        assert_eq!(parser.default_lang(), Some("en"));
        assert_eq!(parser.routes()[0].redirect_to.as_deref(), Some("en"));
    }

    #[tokio::test]
    async fn default_lang_function_overrides_detection() {
        let settings = LocalizeSettings::default()
            .with_locales(["en", "de", "fr"])
            .with_default_lang_function(|locales, cached, browser| {
                assert_eq!(cached, Some("de"));
                assert_eq!(browser, None);
                locales[2].clone()
            });
        let mut parser = parser_with(settings, translator(&[]), Some("de"), "");
        parser.load(Vec::new()).await.unwrap();
        assert_eq!(parser.default_lang(), Some("fr"));
        assert_eq!(parser.current_lang(), Some("fr"));
    }

    #[tokio::test]
    async fn location_language_selects_but_keeps_default() {
        let settings = LocalizeSettings::default()
            .with_locales(["en", "de"])
            .with_prefix(PREFIX);
        let mut parser = parser_with(settings, translator(&["en", "de"]), None, "/de/home_de");
        parser.load(vec![Route::new("home")]).await.unwrap();
        assert_eq!(parser.default_lang(), Some("en"));
        assert_eq!(parser.current_lang(), Some("de"));
        assert_eq!(parser.routes()[1].path.as_deref(), Some("de"));
        assert_eq!(wrapper_children(&parser)[0].path.as_deref(), Some("home_de"));
    }

    #[tokio::test]
    async fn translates_path_and_moves_wildcard_last() {
        let mut parser = parser(Some("en"));
        parser
            .load(vec![Route::new("home"), Route::new(WILDCARD_PATH)])
            .await
            .unwrap();
        assert_eq!(parser.routes().len(), 3);
        assert_eq!(wrapper_children(&parser)[0].path.as_deref(), Some("home_en"));
        assert!(parser.routes()[2].is_wildcard());
        assert_eq!(parser.routes()[2].path.as_deref(), Some(WILDCARD_PATH));
    }

    #[tokio::test]
    async fn retranslates_from_origin() {
        let mut parser = parser(Some("en"));
        parser.load(vec![Route::new("home")]).await.unwrap();
        assert_eq!(wrapper_children(&parser)[0].path.as_deref(), Some("home_en"));

        parser.translate_routes("de").await.unwrap();
        assert_eq!(parser.routes()[1].path.as_deref(), Some("de"));
        assert_eq!(wrapper_children(&parser)[0].path.as_deref(), Some("home_de"));

        parser.translate_routes("fr").await.unwrap();
        parser.translate_routes("en").await.unwrap();
        let home = &wrapper_children(&parser)[0];
        assert_eq!(home.path.as_deref(), Some("home_en"));
        assert_eq!(home.origin(RouteProperty::Path), Some("home"));
    }

    #[tokio::test]
    async fn translation_is_idempotent() {
        let mut parser = parser(Some("en"));
        parser
            .load(vec![
                Route::new("home").with_children(vec![Route::redirect("", "/about")]),
                Route::redirect(WILDCARD_PATH, "/home"),
            ])
            .await
            .unwrap();
        parser.translate_routes("de").await.unwrap();
        let first = parser.routes().to_vec();
        parser.translate_routes("de").await.unwrap();
        assert_eq!(parser.routes(), first.as_slice());
    }

    #[tokio::test]
    async fn missing_translation_keeps_segment() {
        let mut parser = parser(Some("en"));
        parser.load(vec![Route::new("abc")]).await.unwrap();
        assert_eq!(wrapper_children(&parser)[0].path.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn prefix_mismatch_keeps_segment() {
        let settings = LocalizeSettings::default().with_locales(["en", "de", "fr"]);
        let mut parser = parser_with(settings, translator(&["en"]), Some("en"), "");
        parser.load(vec![Route::new("home")]).await.unwrap();
        assert_eq!(wrapper_children(&parser)[0].path.as_deref(), Some("home"));

        let settings = LocalizeSettings::default()
            .with_locales(["en", "de", "fr"])
            .with_prefix("");
        let mut parser = parser_with(settings, translator(&["en"]), Some("en"), "");
        parser.load(vec![Route::new("home")]).await.unwrap();
        assert_eq!(wrapper_children(&parser)[0].path.as_deref(), Some("home"));
    }

    #[tokio::test]
    async fn translates_redirects() {
        let mut parser = parser(Some("en"));
        let mut relative = Route::default();
        relative.redirect_to = Some("home".into());
        parser
            .load(vec![relative, Route::redirect("old", "/about")])
            .await
            .unwrap();
        assert_eq!(wrapper_children(&parser)[0].redirect_to.as_deref(), Some("home_en"));
        assert_eq!(wrapper_children(&parser)[1].redirect_to.as_deref(), Some("/en/about_en"));
        assert_eq!(
            wrapper_children(&parser)[1].origin(RouteProperty::RedirectTo),
            Some("/about")
        );
    }

    #[tokio::test]
    async fn wildcard_redirect_gets_language_prefix() {
        let mut parser = parser(Some("en"));
        parser
            .load(vec![Route::new("home"), Route::redirect(WILDCARD_PATH, "/home")])
            .await
            .unwrap();
        assert_eq!(parser.routes()[2].redirect_to.as_deref(), Some("/en/home_en"));

        parser.translate_routes("de").await.unwrap();
        assert_eq!(parser.routes()[2].redirect_to.as_deref(), Some("/de/home_de"));
    }

    #[tokio::test]
    async fn translates_complex_and_nested_paths() {
        let mut parser = parser(Some("en"));
        parser
            .load(vec![
                Route::new("/home/about"),
                Route::new("home").with_children(vec![Route::new("about")]),
                Route::new("contact").with_children(vec![Route::new("info/:id")]),
            ])
            .await
            .unwrap();
        let children = wrapper_children(&parser);
        assert_eq!(children[0].path.as_deref(), Some("/home_en/about_en"));
        assert_eq!(children[1].path.as_deref(), Some("home_en"));
        assert_eq!(children[1].children.as_ref().unwrap()[0].path.as_deref(), Some("about_en"));
        assert_eq!(
            children[2].children.as_ref().unwrap()[0].path.as_deref(),
            Some("info_en/:id")
        );
    }

    #[tokio::test]
    async fn translates_loaded_lazy_routes() {
        let mut parser = parser(Some("en"));
        parser
            .load(vec![
                Route::new("home").with_children(vec![Route::new("about")]),
                Route::new("contact").with_lazy("#pathToSomeModule", Some(vec![Route::new("info")])),
            ])
            .await
            .unwrap();
        let contact = &wrapper_children(&parser)[1];
        assert_eq!(contact.path.as_deref(), Some("contact_en"));
        assert_eq!(contact.loaded_routes.as_ref().unwrap()[0].path.as_deref(), Some("info_en"));
    }

    #[tokio::test]
    async fn child_routes_are_translated_on_arrival() {
        let mut parser = parser(Some("en"));
        parser
            .load(vec![Route::new("contact").with_lazy("./contact/contact.module", None)])
            .await
            .unwrap();

        let lazy = parser.init_child_routes(vec![Route::new("info")]);
        assert_eq!(lazy[0].path.as_deref(), Some("info_en"));

        assert!(parser.attach_lazy_routes("./contact/contact.module", vec![Route::new("about")]));
        assert!(!parser.attach_lazy_routes("./missing", Vec::new()));
        parser.translate_routes("de").await.unwrap();
        let contact = &wrapper_children(&parser)[0];
        assert_eq!(contact.loaded_routes.as_ref().unwrap()[0].path.as_deref(), Some("about_de"));
    }

    #[tokio::test]
    async fn skipped_routes_stay_unprefixed() {
        let mut parser = parser(Some("en"));
        parser
            .load(vec![
                Route::new("home"),
                Route::new("login").skip_localization(),
                Route::new("about"),
                Route::new(WILDCARD_PATH),
            ])
            .await
            .unwrap();
        let routes = parser.routes();
        assert_eq!(routes.len(), 4);
        assert_eq!(routes[0].redirect_to.as_deref(), Some("en"));
        assert_eq!(routes[1].path.as_deref(), Some("en"));
        assert_eq!(routes[2].path.as_deref(), Some("login"));
        assert!(routes[2].data.localize_router.is_none());
        assert!(routes[3].is_wildcard());

        let children = wrapper_children(&parser);
        assert_eq!(children.len(), 2);
        assert_eq!(children[1].path.as_deref(), Some("about_en"));
    }

    #[tokio::test]
    async fn single_locale_without_enforced_prefix_has_no_language_segment() {
        let settings = LocalizeSettings::default()
            .with_locales(["de"])
            .with_prefix(PREFIX)
            .with_always_set_prefix(false);
        let mut parser = parser_with(settings, translator(&["de"]), None, "");
        parser
            .load(vec![Route::new("home"), Route::redirect(WILDCARD_PATH, "/home")])
            .await
            .unwrap();

        let routes = parser.routes();
        assert_eq!(parser.wrapper_index(), None);
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].path.as_deref(), Some("home_de"));
        assert_eq!(routes[1].redirect_to.as_deref(), Some("/home_de"));
        assert_eq!(parser.url_prefix(), "");
    }

    #[tokio::test]
    async fn two_locales_without_enforced_prefix_get_wrapper() {
        let settings = LocalizeSettings::default()
            .with_locales(["de", "en"])
            .with_prefix(PREFIX)
            .with_always_set_prefix(false);
        let mut parser = parser_with(settings, translator(&["de", "en"]), None, "");
        parser
            .load(vec![
                Route::new("home"),
                Route::redirect(WILDCARD_PATH, "/home"),
                Route::new("login").skip_localization(),
            ])
            .await
            .unwrap();

        let routes = parser.routes();
        assert_eq!(parser.wrapper_index(), Some(0));
        assert_eq!(routes[0].path.as_deref(), Some("de"));
        assert_eq!(routes[0].children.as_ref().unwrap().len(), 1);
        assert_eq!(routes[0].children.as_ref().unwrap()[0].path.as_deref(), Some("home_de"));
        assert_eq!(routes[1].path.as_deref(), Some("home_de"));
        assert!(routes[2].is_wildcard());
        assert_eq!(routes[2].redirect_to.as_deref(), Some("/home_de"));
        assert_eq!(routes[3].path.as_deref(), Some("login"));
        assert_eq!(parser.url_prefix(), "");

        parser.translate_routes("en").await.unwrap();
        assert_eq!(parser.url_prefix(), "en");
        assert_eq!(parser.routes()[0].path.as_deref(), Some("en"));
        assert_eq!(parser.routes()[2].redirect_to.as_deref(), Some("/en/home_en"));
    }

    #[tokio::test]
    async fn relative_wildcard_redirect_gets_prefix_without_enforced_prefix() {
        let settings = LocalizeSettings::default()
            .with_locales(["de", "en"])
            .with_prefix(PREFIX)
            .with_always_set_prefix(false);
        let mut parser = parser_with(settings, translator(&["de", "en"]), None, "/en");
        parser
            .load(vec![Route::new("home"), Route::redirect(WILDCARD_PATH, "home")])
            .await
            .unwrap();

        let routes = parser.routes();
        assert_eq!(parser.current_lang(), Some("en"));
        assert_eq!(routes[1].path.as_deref(), Some("home_en"));
        assert!(routes[2].is_wildcard());
        assert_eq!(routes[2].redirect_to.as_deref(), Some("/en/home_en"));
    }

    /// 指定した言語だけ取得に失敗する翻訳アダプタ
    struct FailingTranslator {
        inner: MemoryTranslator,
        failing: &'static str,
    }

    #[async_trait::async_trait]
    impl Translator for FailingTranslator {
        fn browser_lang(&self) -> Option<String> {
            self.inner.browser_lang()
        }

        fn set_default_lang(&mut self, lang: &str) {
            self.inner.set_default_lang(lang);
        }

        fn default_lang(&self) -> Option<String> {
            self.inner.default_lang()
        }

        async fn use_lang(&mut self, lang: &str) -> Result<TranslationTable> {
            if lang == self.failing {
                return Err(LocalizeError::Translation(format!("{lang} unavailable")));
            }
            self.inner.use_lang(lang).await
        }
    }

    #[tokio::test]
    async fn failed_translation_keeps_previous_language() {
        let settings = LocalizeSettings::default()
            .with_locales(["en", "de"])
            .with_prefix(PREFIX);
        let store = MemoryStorage::new().with_value(&settings.cache_name, "en");
        let cache = LanguageCache::new(&settings, Box::new(store));
        let translate = FailingTranslator { inner: translator(&["en", "de"]), failing: "de" };
        let mut parser = LocalizeParser::manual(
            translate,
            Box::new(StaticLocation(String::new())),
            cache,
            Arc::new(settings),
        );
        parser.load(vec![Route::new("home")]).await.unwrap();

        let err = parser.translate_routes("de").await.unwrap_err();
        assert!(matches!(err, LocalizeError::Translation(_)));
        assert_eq!(parser.current_lang(), Some("en"));
        assert_eq!(parser.cached_lang().as_deref(), Some("en"));
        assert_eq!(parser.routes()[1].path.as_deref(), Some("en"));
        assert_eq!(parser.routes()[1].children.as_ref().unwrap()[0].path.as_deref(), Some("home_en"));
        assert_eq!(parser.url_prefix(), "en");

        parser.translate_routes("en").await.unwrap();
        assert_eq!(parser.routes()[1].path.as_deref(), Some("en"));
        assert_eq!(parser.routes()[1].children.as_ref().unwrap()[0].path.as_deref(), Some("home_en"));
    }

    #[tokio::test]
    async fn translate_route_keeps_query_block() {
        let mut parser = parser(Some("en"));
        parser.load(Vec::new()).await.unwrap();
        assert_eq!(
            parser.translate_route("home/whatever?test=123").unwrap(),
            "home_en/whatever?test=123"
        );
        assert_eq!(parser.translate_route("/home/").unwrap(), "/home_en/");
        assert!(matches!(
            parser.translate_route("home?test=123?test=123"),
            Err(LocalizeError::MultipleQueryBlocks(_))
        ));
    }

    #[tokio::test]
    async fn selected_language_is_cached() {
        let settings = LocalizeSettings::default().with_locales(["en", "de"]);
        let mut parser = parser_with(settings, translator(&[]), None, "");
        parser.load(Vec::new()).await.unwrap();
        parser.translate_routes("de").await.unwrap();
        assert_eq!(parser.cached_lang().as_deref(), Some("de"));
    }

    #[tokio::test]
    async fn mutates_router_language_route() {
        let mut parser = parser(Some("en"));
        parser.load(vec![Route::new("home")]).await.unwrap();

        let mut config = parser.routes().to_vec();
        parser.mutate_router_root_route("de", "fr", &mut config);
        assert_eq!(config[1].path.as_deref(), Some("en"));
        parser.mutate_router_root_route("de", "en", &mut config);
        assert_eq!(config[1].path.as_deref(), Some("de"));
    }

    #[tokio::test]
    async fn remote_descriptor_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("locales.json");
        std::fs::write(&file, r#"{"locales": ["de", "en"], "prefix": "PREFIX."}"#).unwrap();

        let settings = Arc::new(LocalizeSettings::default());
        let cache = LanguageCache::unavailable(&settings);
        let mut parser = LocalizeParser::remote(
            translator(&["de", "en"]),
            Box::new(StaticLocation::default()),
            cache,
            settings,
            file.to_string_lossy(),
        );
        parser.load(vec![Route::new("home")]).await.unwrap();
        assert_eq!(parser.locales(), ["de", "en"]);
        assert_eq!(parser.prefix(), PREFIX);
        assert_eq!(wrapper_children(&parser)[0].path.as_deref(), Some("home_de"));
    }
}
