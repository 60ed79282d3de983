// src/error.rs
use std::io;

/// ルーティングのローカライズ処理で発生するエラー
#[derive(thiserror::Error, Debug)]
pub enum LocalizeError {
    /// `?` で始まるクエリブロックが 2 つ以上含まれるパス
    #[error("there should be only one query parameter block in the URL: {0}")]
    MultipleQueryBlocks(String),

    #[error("LocalizeRouterModule::for_root() called twice; lazy loaded routes should use for_child() instead")]
    ForRootCalledTwice,

    #[error("language cache error: {0}")]
    Cache(String),

    #[error("translation error: {0}")]
    Translation(String),

    #[error("navigation error: {0}")]
    Navigation(String),

    #[error("locale descriptor error: {0}")]
    Descriptor(String),

    #[error("parse error in {0}: {1}")]
    Parse(String, String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, LocalizeError>;
