// src/lib.rs
//! Angular のルート設定に言語セグメントを差し込み、パスを言語ごとに翻訳する。

pub mod cache;
pub mod error;
pub mod extract;
pub mod model;
pub mod module;
pub mod parser;
pub mod pipe;
pub mod resolver;
pub mod router;
pub mod service;
pub mod settings;
pub mod translator;

pub use error::{LocalizeError, Result};
pub use model::{Command, Route, RoutePath};
pub use module::LocalizeRouterModule;
pub use parser::LocalizeParser;
pub use pipe::LocalizePipe;
pub use service::LocalizeRouterService;
pub use settings::LocalizeSettings;
