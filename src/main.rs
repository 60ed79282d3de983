// src/main.rs

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use angular_route_localizer::cache::LanguageCache;
use angular_route_localizer::extract::collect_project_routes;
use angular_route_localizer::model::{Route, RoutePath};
use angular_route_localizer::router::{MemoryRouter, StaticLocation};
use angular_route_localizer::translator::JsonTranslator;
use angular_route_localizer::{LocalizeRouterModule, LocalizeRouterService, LocalizeSettings};

/// CLI 引数定義
#[derive(Parser, Debug)]
#[command(
    name = "angular-route-localizer",
    version,
    about = "Angular のルーティング設計に言語セグメントを差し込み、言語ごとに翻訳した結果を JSON 出力する CLI ツール"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// ログレベル (RUST_LOG が優先)
    #[arg(long = "log-level", global = true, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// ローカライズ済みのルートツリーを出力する
    Routes {
        #[command(flatten)]
        args: LocalizeArgs,
    },
    /// パス (または JSON のコマンド配列) を翻訳する
    Translate {
        #[command(flatten)]
        args: LocalizeArgs,

        /// 例: `/home/about?tab=1` や `["/home", {"outlets": {"aux": "chat"}}]`
        path: String,
    },
}

#[derive(Args, Debug)]
struct LocalizeArgs {
    /// 解析対象の Angular プロジェクトルート
    #[arg(short = 'r', long = "project-root", value_name = "DIR", conflicts_with = "routes_json")]
    project_root: Option<PathBuf>,

    /// Angular の Route 形式で書かれた JSON ファイル
    #[arg(short = 'j', long = "routes-json", value_name = "FILE")]
    routes_json: Option<PathBuf>,

    /// `<lang>.json` の翻訳ファイルを置いたディレクトリ
    #[arg(short = 'i', long = "locales-dir", value_name = "DIR")]
    locales_dir: Option<PathBuf>,

    /// LocalizeSettings の JSON ファイル
    #[arg(short = 's', long, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// サポートする言語 (カンマ区切り)
    #[arg(short = 'l', long, value_delimiter = ',')]
    locales: Vec<String>,

    /// 翻訳キーの接頭辞
    #[arg(long)]
    prefix: Option<String>,

    /// `{ locales, prefix }` の記述子 (ファイルまたは http(s) URL)
    #[arg(long, value_name = "PATH_OR_URL", conflicts_with = "locales")]
    descriptor: Option<String>,

    /// 現在の URL (言語の判定に使う)
    #[arg(long, default_value = "")]
    url: String,

    /// 初期化後に切り替える言語
    #[arg(long)]
    lang: Option<String>,

    /// デフォルト言語では URL に言語を付けない
    #[arg(long)]
    no_prefix: bool,

    /// 最後に使った言語を保存するディレクトリ
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,
}

fn init_logging(log_level: Option<String>) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(log_level.unwrap_or_else(|| "info".into()))),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level);

    match cli.command {
        Commands::Routes { args } => {
            let service = build_service(&args).await?;
            let json = serde_json::to_string_pretty(&service.router().config)?;
            println!("{}", json);
        }
        Commands::Translate { args, path } => {
            let service = build_service(&args).await?;
            let path = if path.trim_start().starts_with('[') {
                serde_json::from_str(&path).context("invalid command array")?
            } else {
                RoutePath::Url(path)
            };
            match service.translate_route(Some(&path))? {
                Some(RoutePath::Url(url)) => println!("{}", url),
                Some(commands) => println!("{}", serde_json::to_string(&commands)?),
                None => {}
            }
        }
    }

    Ok(())
}

async fn build_service(
    args: &LocalizeArgs,
) -> anyhow::Result<LocalizeRouterService<JsonTranslator, MemoryRouter>> {
    let mut settings = match &args.settings {
        Some(path) => LocalizeSettings::from_file(path)
            .with_context(|| format!("failed to read settings {}", path.display()))?,
        None => LocalizeSettings::default(),
    };

    let translator = match &args.locales_dir {
        Some(dir) => JsonTranslator::discover(dir)
            .with_context(|| format!("failed to scan locales {}", dir.display()))?,
        None => JsonTranslator::new(),
    };

    if !args.locales.is_empty() {
        settings = settings.with_locales(args.locales.clone());
    } else if args.settings.is_none() && !translator.available_locales().is_empty() {
        settings = settings.with_locales(translator.available_locales());
    }
    if let Some(prefix) = &args.prefix {
        settings = settings.with_prefix(prefix.clone());
    }
    if args.no_prefix {
        settings = settings.with_always_set_prefix(false);
    }

    let routes = load_routes(args)?;
    let cache = match &args.cache_dir {
        Some(dir) => LanguageCache::for_mechanism(&settings, dir),
        None => LanguageCache::unavailable(&settings),
    };
    let location = Box::new(StaticLocation(args.url.clone()));

    let mut module = LocalizeRouterModule::new(settings);
    module.for_root(routes)?;
    let parser = match &args.descriptor {
        Some(descriptor) => module.remote_parser(translator, location, cache, descriptor.clone()),
        None => module.manual_parser(translator, location, cache),
    };

    let mut service = module.initialize(parser, MemoryRouter::new()).await?;
    if let Some(lang) = &args.lang {
        service.change_language(lang).await?;
    }
    Ok(service)
}

fn load_routes(args: &LocalizeArgs) -> anyhow::Result<Vec<Route>> {
    if let Some(path) = &args.routes_json {
        let src = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        return serde_json::from_str(&src).with_context(|| format!("invalid routes in {}", path.display()));
    }
    let Some(project_root) = &args.project_root else {
        bail!("either --project-root or --routes-json is required");
    };
    let project_dir = project_root.canonicalize()?;
    let routes = collect_project_routes(&project_dir)?;
    if routes.is_empty() {
        bail!("no routing file found under {}", project_dir.display());
    }
    Ok(routes)
}
