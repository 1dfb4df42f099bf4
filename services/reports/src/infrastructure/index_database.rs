/// インデックスDBによるディーラーディレクトリ
///
/// `unotifi_com_index`のdealer → instance → database → databaseserverを結合し、
/// ディーラーIDごとのDB接続情報を取得する。
use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use tracing::{debug, info, warn};

use super::config::IndexDbSettings;
use super::dealer_database::in_placeholders;
use super::dealer_directory::{order_by_request, DealerDirectory, DirectoryError};
use crate::domain::{DealerConnectionInfo, DealerId};

/// インデックスDBの結合クエリ（末尾に`IN (...)`のプレースホルダーを付ける）
const DEALER_LOOKUP_SQL: &str = "SELECT \
    CAST(dealer.iddealer AS CHAR) AS dealer_id, \
    CAST(dealer.internal_code AS CHAR) AS internal_code, \
    dealer.name AS dealer_name, \
    `database`.name AS database_name, \
    `database`.user AS database_user, \
    `database`.password AS database_password, \
    databaseserver.IP AS server_ip \
    FROM dealer \
    INNER JOIN instance ON instance.idinstance = dealer.instance_idinstance \
    INNER JOIN `database` ON `database`.iddatabase = instance.database_iddatabase \
    INNER JOIN databaseserver ON databaseserver.iddatabaseserver = `database`.databaseServer_iddatabaseServer \
    WHERE dealer.iddealer IN";

/// 結合クエリの1行
#[derive(sqlx::FromRow)]
struct IndexDealerRow {
    dealer_id: String,
    internal_code: Option<String>,
    dealer_name: Option<String>,
    database_name: Option<String>,
    database_user: Option<String>,
    database_password: Option<String>,
    server_ip: Option<String>,
}

impl std::fmt::Debug for IndexDealerRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexDealerRow")
            .field("dealer_id", &self.dealer_id)
            .field("internal_code", &self.internal_code)
            .field("server_ip", &self.server_ip)
            .finish_non_exhaustive()
    }
}

impl IndexDealerRow {
    /// 接続情報に変換（NULLは空文字列、internal_codeがなければディーラーID）
    fn into_connection_info(self) -> Result<DealerConnectionInfo, DirectoryError> {
        let dealer_id = DealerId::parse(&self.dealer_id)
            .map_err(|e| DirectoryError::Deserialization(e.to_string()))?;

        let internal_code = self
            .internal_code
            .filter(|code| !code.is_empty())
            .unwrap_or_else(|| dealer_id.as_str().to_string());

        Ok(DealerConnectionInfo {
            dealer_id,
            internal_code,
            dealer_name: self.dealer_name.unwrap_or_default(),
            host: self.server_ip.unwrap_or_default(),
            database: self.database_name.unwrap_or_default(),
            user: self.database_user.unwrap_or_default(),
            password: self.database_password.unwrap_or_default(),
        })
    }
}

/// `IN`句付きの検索SQLを組み立てる
fn dealer_lookup_sql(count: usize) -> String {
    format!("{} ({})", DEALER_LOOKUP_SQL, in_placeholders(count))
}

/// インデックスDBを検索するDealerDirectory実装
///
/// 検索のたびに接続し、結果にかかわらず接続を閉じる。
#[derive(Clone)]
pub struct IndexDbDealerDirectory {
    settings: IndexDbSettings,
    connect_timeout: Duration,
}

impl std::fmt::Debug for IndexDbDealerDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexDbDealerDirectory")
            .field("settings", &self.settings)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl IndexDbDealerDirectory {
    pub fn new(settings: IndexDbSettings, connect_timeout: Duration) -> Self {
        Self {
            settings,
            connect_timeout,
        }
    }
}

#[async_trait]
impl DealerDirectory for IndexDbDealerDirectory {
    async fn resolve(&self, dealer_ids: &[DealerId]) -> Result<Vec<DealerConnectionInfo>, DirectoryError> {
        if dealer_ids.is_empty() {
            return Ok(Vec::new());
        }

        let options = MySqlConnectOptions::new()
            .host(&self.settings.host)
            .username(&self.settings.user)
            .password(&self.settings.password)
            .database(&self.settings.database);

        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(self.connect_timeout)
            .connect_with(options)
            .await
            .map_err(|e| DirectoryError::Connection(e.to_string()))?;

        debug!(
            host = %self.settings.host,
            dealer_count = dealer_ids.len(),
            "インデックスDBでディーラー情報を検索"
        );

        let sql = dealer_lookup_sql(dealer_ids.len());
        let mut query = sqlx::query_as::<_, IndexDealerRow>(&sql);
        for dealer_id in dealer_ids {
            query = query.bind(dealer_id.as_str());
        }

        let result = query.fetch_all(&pool).await;
        pool.close().await;

        let rows = result.map_err(|e| DirectoryError::Lookup(e.to_string()))?;

        let mut found = Vec::with_capacity(rows.len());
        for row in rows {
            match row.into_connection_info() {
                Ok(info) => found.push(info),
                Err(e) => warn!(error = %e, "不正なディーラー行をスキップ"),
            }
        }

        let resolved = order_by_request(dealer_ids, found, |info| {
            info.dealer_id.as_str().to_string()
        });

        info!(
            requested = dealer_ids.len(),
            resolved = resolved.len(),
            "ディーラー情報を取得"
        );

        Ok(resolved)
    }
}
