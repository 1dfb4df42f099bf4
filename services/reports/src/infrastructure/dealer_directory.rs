/// ディーラーディレクトリ
///
/// ディーラー識別子から、そのディーラーDBへの接続情報を引く。
/// 実装はインデックスDB（`IndexDbDealerDirectory`）とディーラーAPI（`UnotifiApiDirectory`）の2種類。
use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::domain::{DealerConnectionInfo, DealerId};

/// 資格情報検索のエラー型
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DirectoryError {
    /// 検索元への接続に失敗
    #[error("ディーラーディレクトリへの接続に失敗: {0}")]
    Connection(String),

    /// 検索クエリ・リクエストの失敗
    #[error("ディーラー情報の取得に失敗: {0}")]
    Lookup(String),

    /// レスポンスの形式が不正
    #[error("ディーラー情報のデシリアライズに失敗: {0}")]
    Deserialization(String),
}

/// ディーラー接続情報の検索
#[async_trait]
pub trait DealerDirectory: Send + Sync {
    /// 識別子ごとの接続情報を要求順で返す
    ///
    /// 見つからなかった識別子は結果に含まれない。
    async fn resolve(&self, dealer_ids: &[DealerId]) -> Result<Vec<DealerConnectionInfo>, DirectoryError>;
}

/// 検索結果を要求順に並べ替え、見つからなかった識別子をwarnログに残す
///
/// `key`は結果1件から要求識別子と突き合わせる値を取り出す。
/// 同じ識別子の結果が複数あれば最初の1件を使う。
pub(crate) fn order_by_request<F>(
    requested: &[DealerId],
    found: Vec<DealerConnectionInfo>,
    key: F,
) -> Vec<DealerConnectionInfo>
where
    F: Fn(&DealerConnectionInfo) -> String,
{
    let mut by_key: HashMap<String, DealerConnectionInfo> = HashMap::new();
    for info in found {
        by_key.entry(key(&info)).or_insert(info);
    }

    requested
        .iter()
        .filter_map(|dealer_id| match by_key.remove(dealer_id.as_str()) {
            Some(info) => Some(info),
            None => {
                warn!(dealer_id = %dealer_id, "ディーラー情報が見つからないためスキップ");
                None
            }
        })
        .collect()
}
