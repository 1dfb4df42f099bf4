/// ディーラーAPIによるディーラーディレクトリ
///
/// `GET {base}api/dealers?token=...`で全ディーラーを取得し、
/// 要求されたintegralinkコードのディーラーだけを接続情報に変換する。
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, info, warn};
use url::Url;

use super::config::DirectoryApiSettings;
use super::dealer_directory::{order_by_request, DealerDirectory, DirectoryError};
use crate::domain::{DealerConnectionInfo, DealerId};

/// ディーラー一覧のエンドポイント（ベースURLからの相対パス）
const DEALERS_ENDPOINT: &str = "api/dealers";

/// リクエスト全体のタイムアウト（秒）
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// 接続タイムアウト（秒）
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// `GET api/dealers`のレスポンス
#[derive(Debug, Deserialize)]
struct DealersResponse {
    #[serde(default)]
    data: Vec<ApiDealer>,
}

/// integralinkコード（APIによって文字列または数値で返る）
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum IntegralinkCode {
    Text(String),
    Number(i64),
}

impl IntegralinkCode {
    fn into_string(self) -> String {
        match self {
            Self::Text(code) => code,
            Self::Number(code) => code.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiDealer {
    integralink_code: Option<IntegralinkCode>,
    instance: Option<ApiInstance>,
}

#[derive(Debug, Deserialize)]
struct ApiInstance {
    database: Option<ApiDatabase>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiDatabase {
    name: Option<String>,
    user: Option<String>,
    password: Option<String>,
    database_server: Option<ApiDatabaseServer>,
}

impl std::fmt::Debug for ApiDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiDatabase")
            .field("name", &self.name)
            .field("user", &self.user)
            .field("database_server", &self.database_server)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ApiDatabaseServer {
    #[serde(rename = "IP")]
    ip: Option<String>,
}

impl ApiDealer {
    /// 接続情報に変換（DB情報が欠けていればNone）
    fn into_connection_info(self) -> Option<DealerConnectionInfo> {
        let code = self.integralink_code?.into_string();
        let dealer_id = DealerId::parse(&code).ok()?;
        let database = self.instance?.database?;
        let host = database.database_server.and_then(|server| server.ip)?;

        Some(DealerConnectionInfo {
            dealer_id,
            dealer_name: format!("Dealership {}", code),
            internal_code: code,
            host,
            database: database.name.unwrap_or_default(),
            user: database.user.unwrap_or_default(),
            password: database.password.unwrap_or_default(),
        })
    }
}

/// 要求されたコードのディーラーだけを要求順で取り出す
fn select_dealers(requested: &[DealerId], response: DealersResponse) -> Vec<DealerConnectionInfo> {
    let found: Vec<DealerConnectionInfo> = response
        .data
        .into_iter()
        .filter(|dealer| {
            dealer.integralink_code.as_ref().is_some_and(|code| {
                let code = code.clone().into_string();
                requested.iter().any(|id| id.as_str() == code)
            })
        })
        .filter_map(|dealer| {
            let converted = dealer.into_connection_info();
            if converted.is_none() {
                warn!("DB接続情報が欠けているディーラーをスキップ");
            }
            converted
        })
        .collect();

    order_by_request(requested, found, |info| info.internal_code.clone())
}

/// ディーラーAPIを使うDealerDirectory実装
#[derive(Clone)]
pub struct UnotifiApiDirectory {
    client: Client,
    dealers_url: Url,
    token: String,
}

impl std::fmt::Debug for UnotifiApiDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnotifiApiDirectory")
            .field("dealers_url", &self.dealers_url.as_str())
            .finish_non_exhaustive()
    }
}

impl UnotifiApiDirectory {
    /// 設定からクライアントを作成
    pub fn new(settings: &DirectoryApiSettings) -> Result<Self, DirectoryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| DirectoryError::Connection(format!("HTTPクライアントの構築に失敗: {}", e)))?;

        Self::with_client(settings, client)
    }

    /// カスタムHTTPクライアントを指定して作成
    pub fn with_client(settings: &DirectoryApiSettings, client: Client) -> Result<Self, DirectoryError> {
        let dealers_url = dealers_url(&settings.base_url)?;

        info!(dealers_url = %dealers_url, "UnotifiApiDirectoryを初期化");

        Ok(Self {
            client,
            dealers_url,
            token: settings.token.clone(),
        })
    }

    async fn fetch_dealers(&self) -> Result<DealersResponse, DirectoryError> {
        debug!(url = %self.dealers_url, "ディーラー一覧を取得");

        let response = self
            .client
            .get(self.dealers_url.clone())
            .header("Content-Type", "application/json")
            .query(&[("token", self.token.as_str())])
            .send()
            .await
            .map_err(|e| {
                // URLにはトークンが含まれる
                let e = e.without_url();
                error!(error = %e, "ディーラーAPIへのリクエストに失敗");
                if e.is_connect() || e.is_timeout() {
                    DirectoryError::Connection(e.to_string())
                } else {
                    DirectoryError::Lookup(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "ディーラーAPIがエラーを返却");
            return Err(DirectoryError::Lookup(format!("ステータス {}: {}", status, body)));
        }

        response.json::<DealersResponse>().await.map_err(|e| {
            let e = e.without_url();
            error!(error = %e, "ディーラー一覧のデシリアライズに失敗");
            DirectoryError::Deserialization(e.to_string())
        })
    }
}

/// ベースURLに`api/dealers`を連結する（ベースURLの末尾`/`は省略可）
fn dealers_url(base_url: &str) -> Result<Url, DirectoryError> {
    let normalized = if base_url.ends_with('/') {
        base_url.to_string()
    } else {
        format!("{}/", base_url)
    };

    Url::parse(&normalized)
        .and_then(|base| base.join(DEALERS_ENDPOINT))
        .map_err(|e| DirectoryError::Lookup(format!("不正なベースURL {}: {}", base_url, e)))
}

#[async_trait]
impl DealerDirectory for UnotifiApiDirectory {
    async fn resolve(&self, dealer_ids: &[DealerId]) -> Result<Vec<DealerConnectionInfo>, DirectoryError> {
        if dealer_ids.is_empty() {
            return Ok(Vec::new());
        }

        let response = self.fetch_dealers().await?;
        let total = response.data.len();
        let resolved = select_dealers(dealer_ids, response);

        info!(
            total_dealers = total,
            requested = dealer_ids.len(),
            resolved = resolved.len(),
            "ディーラー情報を取得"
        );

        Ok(resolved)
    }
}
