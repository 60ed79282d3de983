// src/extract.rs
use serde_json::{Map, Number, Value};
use swc_common::{sync::Lrc, FileName, SourceMap};
use swc_ecma_ast::*;
use swc_ecma_parser::{lexer::Lexer, Parser as SwcParser, StringInput, Syntax, TsConfig};
use swc_ecma_visit::{Visit, VisitWith};
use std::collections::{HashMap, HashSet};
use walkdir::WalkDir;

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{LocalizeError, Result};
use crate::model::{Route, RouteData};
use crate::resolver::resolve_load_children_paths;

/// ルート配列を受け取る呼び出し (`RouterModule.forRoot(...)` など)
const ROUTER_MODULES: [&str; 2] = ["RouterModule", "LocalizeRouterModule"];
const ROUTER_METHODS: [&str; 2] = ["forRoot", "forChild"];
const PROVIDE_ROUTER: &str = "provideRouter";

/// AST をトラバースしてルート定義を抽出するための Visitor
struct RouteVisitor {
    source_file: PathBuf,
    pub routes: Vec<Route>,
    /// 変数名とその配列リテラルのマッピング
    route_variables: HashMap<String, ArrayLit>,
    /// ルーターへの登録呼び出しが見つかったか
    registered: bool,
}

impl RouteVisitor {
    fn new(source_file: PathBuf) -> Self {
        RouteVisitor {
            source_file,
            routes: Vec::new(),
            route_variables: HashMap::new(),
            registered: false,
        }
    }

    /// `{ path: "home", loadChildren: () => import("…") }` を Route に変換する
    fn parse_route_object(&self, obj_lit: &ObjectLit) -> Route {
        let mut route = Route {
            source_file: Some(self.source_file.clone()),
            ..Default::default()
        };

        for (key, value) in key_values(obj_lit) {
            match key.as_str() {
                "path" => route.path = string_value(value),
                "redirectTo" => route.redirect_to = string_value(value),
                "pathMatch" => route.path_match = string_value(value),
                "outlet" => route.outlet = string_value(value),
                "children" => route.children = self.routes_from_expr(value),
                "loadChildren" => {
                    route.load_children = load_children_specifier(value);
                    if route.load_children.is_none() {
                        tracing::debug!(file = ?self.source_file, "loadChildren without import specifier");
                    }
                }
                "data" => {
                    if let Value::Object(map) = to_json(value) {
                        route.data = serde_json::from_value(Value::Object(map)).unwrap_or_else(|e| {
                            tracing::warn!(error = %e, file = ?self.source_file, "route data ignored");
                            RouteData::default()
                        });
                    }
                }
                _ => {}
            }
        }
        route
    }

    /// 配列リテラルか、ルート配列を持つ変数への参照からルートを取り出す
    fn routes_from_expr(&self, expr: &Expr) -> Option<Vec<Route>> {
        match unwrap_expr(expr) {
            Expr::Array(arr_lit) => Some(self.extract_routes_from_array(arr_lit)),
            Expr::Ident(ident) => {
                let name = ident.sym.to_string();
                match self.route_variables.get(&name) {
                    Some(arr_lit) => Some(self.extract_routes_from_array(arr_lit)),
                    None => {
                        tracing::debug!(%name, "route variable not found");
                        None
                    }
                }
            }
            other => {
                tracing::debug!(?other, "routes are neither an array nor a variable");
                None
            }
        }
    }

    fn extract_routes_from_array(&self, arr_lit: &ArrayLit) -> Vec<Route> {
        arr_lit
            .elems
            .iter()
            .flatten()
            .filter_map(|elem| match unwrap_expr(&elem.expr) {
                Expr::Object(obj_lit) => Some(self.parse_route_object(obj_lit)),
                _ => None,
            })
            .collect()
    }

    fn register(&mut self, args: &[ExprOrSpread]) {
        let Some(first) = args.first() else {
            return;
        };
        if let Some(routes) = self.routes_from_expr(&first.expr) {
            tracing::debug!(count = routes.len(), "routes registered");
            self.routes.extend(routes);
            self.registered = true;
        }
    }
}

fn is_router_call(callee: &Callee) -> bool {
    let Callee::Expr(expr) = callee else {
        return false;
    };
    match &**expr {
        Expr::Member(MemberExpr { obj, prop, .. }) => {
            let (Expr::Ident(obj_ident), MemberProp::Ident(prop_ident)) = (&**obj, prop) else {
                return false;
            };
            ROUTER_MODULES.contains(&&*obj_ident.sym) && ROUTER_METHODS.contains(&&*prop_ident.sym)
        }
        Expr::Ident(ident) => &*ident.sym == PROVIDE_ROUTER,
        _ => false,
    }
}

impl Visit for RouteVisitor {
    /// ルート配列を代入している変数を記録する
    fn visit_var_decl(&mut self, var_decl: &VarDecl) {
        for declarator in &var_decl.decls {
            let (Pat::Ident(BindingIdent { id, .. }), Some(init)) = (&declarator.name, &declarator.init)
            else {
                continue;
            };
            let var_name = id.sym.to_string();
            if !var_name.to_lowercase().contains("route") {
                continue;
            }
            if let Expr::Array(arr_lit) = unwrap_expr(init) {
                tracing::debug!(%var_name, elems = arr_lit.elems.len(), "route variable");
                self.route_variables.insert(var_name, arr_lit.clone());
            }
        }
        var_decl.visit_children_with(self);
    }

    fn visit_call_expr(&mut self, call: &CallExpr) {
        if is_router_call(&call.callee) {
            self.register(&call.args);
        }
        call.visit_children_with(self);
    }
}

/// `loadChildren` の式の中から `import("...")` の指定子を探す
#[derive(Default)]
struct ImportFinder {
    specifier: Option<String>,
}

impl Visit for ImportFinder {
    fn visit_call_expr(&mut self, call: &CallExpr) {
        if self.specifier.is_none() && matches!(call.callee, Callee::Import(_)) {
            self.specifier = call.args.first().and_then(|arg| string_value(&arg.expr));
        }
        call.visit_children_with(self);
    }
}

fn load_children_specifier(expr: &Expr) -> Option<String> {
    if let Some(s) = string_value(expr) {
        return Some(s);
    }
    let mut finder = ImportFinder::default();
    expr.visit_with(&mut finder);
    finder.specifier
}

/// `as const` / `as Routes` / 括弧を剥がす
fn unwrap_expr(expr: &Expr) -> &Expr {
    match expr {
        Expr::TsAs(TsAsExpr { expr, .. })
        | Expr::TsConstAssertion(TsConstAssertion { expr, .. })
        | Expr::TsSatisfies(TsSatisfiesExpr { expr, .. })
        | Expr::Paren(ParenExpr { expr, .. }) => unwrap_expr(expr),
        other => other,
    }
}

fn key_values(obj_lit: &ObjectLit) -> impl Iterator<Item = (String, &Expr)> {
    obj_lit.props.iter().filter_map(|prop| {
        let PropOrSpread::Prop(boxed_prop) = prop else {
            return None;
        };
        let Prop::KeyValue(KeyValueProp { key, value }) = &**boxed_prop else {
            return None;
        };
        let key = match key {
            PropName::Ident(ident) => ident.sym.to_string(),
            PropName::Str(s) => s.value.to_string(),
            _ => return None,
        };
        Some((key, &**value))
    })
}

fn string_value(expr: &Expr) -> Option<String> {
    match unwrap_expr(expr) {
        Expr::Lit(Lit::Str(Str { value, .. })) => Some(value.to_string()),
        Expr::Tpl(tpl) if tpl.exprs.is_empty() => tpl
            .quasis
            .first()
            .map(|q| q.cooked.as_ref().unwrap_or(&q.raw).to_string()),
        _ => None,
    }
}

/// リテラルだけで書かれた式を JSON に変換する (それ以外は null)
fn to_json(expr: &Expr) -> Value {
    match unwrap_expr(expr) {
        Expr::Lit(Lit::Bool(b)) => Value::Bool(b.value),
        Expr::Lit(Lit::Null(_)) => Value::Null,
        Expr::Lit(Lit::Num(n)) => Number::from_f64(n.value).map_or(Value::Null, Value::Number),
        Expr::Array(arr_lit) => Value::Array(
            arr_lit
                .elems
                .iter()
                .map(|elem| elem.as_ref().map_or(Value::Null, |e| to_json(&e.expr)))
                .collect(),
        ),
        Expr::Object(obj_lit) => Value::Object(
            key_values(obj_lit)
                .map(|(k, v)| (k, to_json(v)))
                .collect::<Map<String, Value>>(),
        ),
        other => string_value(other).map_or(Value::Null, Value::String),
    }
}

/// TypeScript のルーティングファイルを解析してルート定義を取り出す
///
/// `RouterModule.forRoot/forChild`、`LocalizeRouterModule.forRoot/forChild`、
/// `provideRouter` に渡された配列を拾う。どれも見つからなければ
/// 名前に "routes" を含む変数の配列を使う。
pub fn parse_routes_in_file(file_path: &Path) -> Result<Vec<Route>> {
    tracing::debug!(?file_path, "parsing routing file");
    let src = fs::read_to_string(file_path)?;

    let cm: Lrc<SourceMap> = Default::default();
    let fm = cm.new_source_file(FileName::Real(file_path.to_path_buf()), src);

    let syntax = Syntax::Typescript(TsConfig {
        tsx: false,
        decorators: true,
        dts: false,
        no_early_errors: true,
        disallow_ambiguous_jsx_like: true,
    });
    let lexer = Lexer::new(syntax, Default::default(), StringInput::from(&*fm), None);
    let mut parser = SwcParser::new_from(lexer);

    let module = parser.parse_module().map_err(|e| {
        LocalizeError::Parse(file_path.display().to_string(), format!("{:?}", e.kind()))
    })?;

    let mut visitor = RouteVisitor::new(file_path.to_path_buf());
    visitor.visit_module(&module);

    if !visitor.registered {
        let mut names: Vec<&String> = visitor
            .route_variables
            .keys()
            .filter(|name| name.to_lowercase().contains("routes"))
            .collect();
        names.sort();
        if let Some(arr_lit) = names.first().and_then(|name| visitor.route_variables.get(*name)) {
            let routes = visitor.extract_routes_from_array(arr_lit);
            visitor.routes = routes;
        }
    }

    tracing::debug!(
        ?file_path,
        variables = visitor.route_variables.len(),
        routes = visitor.routes.len(),
        "routing file parsed"
    );
    Ok(visitor.routes)
}

/// アプリケーションのルートを定義しているファイル名
const APP_ROUTING_FILES: [&str; 3] = ["app-routing.module.ts", "app.routes.ts", "app-routing.ts"];

/// プロジェクト配下のアプリケーションのルーティングファイルを探し、
/// `loadChildren` の先も `loaded_routes` としてたどったルートツリーを返す
pub fn collect_project_routes(project_root: &Path) -> Result<Vec<Route>> {
    let mut routing_paths: Vec<PathBuf> = WalkDir::new(project_root)
        .into_iter()
        .filter_entry(|e| e.file_name() != "node_modules")
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_type().is_file()
                && e.file_name()
                    .to_str()
                    .is_some_and(|name| APP_ROUTING_FILES.contains(&name))
        })
        .map(|e| e.into_path())
        .collect();
    routing_paths.sort();
    routing_paths.dedup();

    let mut all_routes = Vec::new();
    for routing_path in routing_paths {
        tracing::info!(?routing_path, "analyzing routing file");
        let mut visited = HashSet::from([routing_path.clone()]);
        let mut routes = parse_routes_in_file(&routing_path)?;
        resolve_lazy_routes(&mut routes, &mut visited)?;
        all_routes.extend(routes);
    }
    Ok(all_routes)
}

/// `loadChildren` の参照先を解析して `loaded_routes` に格納する
fn resolve_lazy_routes(routes: &mut [Route], visited: &mut HashSet<PathBuf>) -> Result<()> {
    for route in routes {
        if let Some(children) = route.children.as_mut() {
            resolve_lazy_routes(children, visited)?;
        }
        let (Some(load_children), Some(source_file)) = (&route.load_children, &route.source_file) else {
            continue;
        };
        for candidate in resolve_load_children_paths(load_children, source_file)? {
            if !visited.insert(candidate.clone()) {
                continue;
            }
            let mut lazy = parse_routes_in_file(&candidate)?;
            if lazy.is_empty() {
                continue;
            }
            resolve_lazy_routes(&mut lazy, visited)?;
            route.loaded_routes = Some(lazy);
            break;
        }
    }
    Ok(())
}
