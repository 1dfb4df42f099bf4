/// ディーラーDBアクセス
///
/// ディーラーごとのMySQLデータベースに1本の接続を張り、集計クエリを実行して
/// `QueryRow` / `MessageEvent` に変換する。
///
/// # 接続の扱い
/// - 接続確立には上限時間（デフォルト60秒）を設ける。クエリ自体には上限を設けない
/// - 1ディーラーにつき1接続。並行に発行されたクエリは接続上で直列化される
/// - `with_dealer_source`を通して使い、成功・失敗にかかわらず必ず1回closeする
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::mysql::{MySql, MySqlArguments, MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, ConnectOptions, Connection, Row, TypeInfo, ValueRef};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::report_period::SQL_DATETIME_FORMAT;
use crate::domain::{DealerConnectionInfo, Direction, MessageEvent, QueryRow, Scalar};

/// メッセージイベントクエリの列名: グループキー（RO IDまたは受信者ID）
pub const EVENT_GROUP_KEY: &str = "groupKey";
/// メッセージイベントクエリの列名: 送信日時
pub const EVENT_SENT_DATE: &str = "sentDate";
/// メッセージイベントクエリの列名: 生成元
pub const EVENT_GENERATED_FROM: &str = "generatedFrom";
/// メッセージイベントクエリの列名: 種別
pub const EVENT_TYPE: &str = "eventType";
/// メッセージイベントクエリの列名: 添付の有無（0/1）
pub const EVENT_HAS_ATTACHMENT: &str = "hasAttachment";

/// ディーラーDBアクセスのエラー型
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    /// 接続確立に失敗（タイムアウトを含む）
    #[error("ディーラーDBへの接続に失敗: {0}")]
    Connect(String),

    /// クエリ実行に失敗
    #[error("クエリ実行エラー: query={query}, message={message}")]
    Execute { query: String, message: String },

    /// 結果行の変換に失敗
    #[error("結果変換エラー: query={query}, message={message}")]
    Decode { query: String, message: String },

    /// close済みの接続へのアクセス
    #[error("接続は既にクローズされています")]
    Closed,
}

/// クエリにバインドするパラメータ
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    Text(String),
    DateTime(NaiveDateTime),
}

/// 名前付きの集計クエリ
///
/// SQL本文は固定文字列で、外部から来る値はすべて`?`プレースホルダーにバインドする。
#[derive(Debug, Clone, PartialEq)]
pub struct ReportQuery {
    name: &'static str,
    sql: String,
    params: Vec<QueryParam>,
}

impl ReportQuery {
    pub fn new(name: &'static str, sql: impl Into<String>) -> Self {
        Self {
            name,
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn bind_text(mut self, value: impl Into<String>) -> Self {
        self.params.push(QueryParam::Text(value.into()));
        self
    }

    pub fn bind_datetime(mut self, value: NaiveDateTime) -> Self {
        self.params.push(QueryParam::DateTime(value));
        self
    }

    pub fn bind_texts<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params
            .extend(values.into_iter().map(|value| QueryParam::Text(value.into())));
        self
    }

    /// ログ・エラー用のクエリ名
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[QueryParam] {
        &self.params
    }
}

/// `IN (...)`句用のプレースホルダー列（例: `?, ?, ?`）
pub fn in_placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// 1ディーラーDBに対するクエリ実行の抽象
///
/// 実際のMySQL接続とテスト用モックを差し替えられるようにする。
#[async_trait]
pub trait QueryRowSource: Send + Sync {
    /// 集計クエリを実行し、行をそのまま返す
    async fn fetch_rows(&self, query: &ReportQuery) -> Result<Vec<QueryRow>, QueryError>;

    /// メッセージイベントを返すクエリを実行する
    ///
    /// 列は`groupKey`, `sentDate`, `generatedFrom`, `eventType`, `hasAttachment`。
    /// 並び順はクエリの`ORDER BY`で保証すること。
    async fn fetch_events(&self, query: &ReportQuery) -> Result<Vec<MessageEvent>, QueryError>;

    /// 接続を解放する（2回目以降は何もしない）
    async fn close(&self) -> Result<(), QueryError>;
}

/// ディーラーDBへの接続を開く抽象
#[async_trait]
pub trait DealerConnector: Send + Sync {
    async fn open(&self, dealer: &DealerConnectionInfo) -> Result<Arc<dyn QueryRowSource>, QueryError>;
}

/// 接続を開いて`f`を実行し、結果にかかわらず接続をcloseする
///
/// closeの失敗はログに残すだけで、`f`の結果を上書きしない。
pub async fn with_dealer_source<C, T, F, Fut>(
    connector: &C,
    dealer: &DealerConnectionInfo,
    f: F,
) -> Result<T, QueryError>
where
    C: DealerConnector + ?Sized,
    F: FnOnce(Arc<dyn QueryRowSource>) -> Fut,
    Fut: Future<Output = Result<T, QueryError>>,
{
    let source = connector.open(dealer).await?;

    let result = f(Arc::clone(&source)).await;

    if let Err(error) = source.close().await {
        warn!(
            dealer_code = %dealer.internal_code,
            error = %error,
            "ディーラーDB接続のクローズに失敗"
        );
    }

    result
}

/// MySQLのディーラーDBコネクタ
#[derive(Debug, Clone)]
pub struct MySqlDealerConnector {
    /// 接続確立のタイムアウト
    connect_timeout: Duration,
}

impl MySqlDealerConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl DealerConnector for MySqlDealerConnector {
    async fn open(&self, dealer: &DealerConnectionInfo) -> Result<Arc<dyn QueryRowSource>, QueryError> {
        let options = MySqlConnectOptions::new()
            .host(&dealer.host)
            .username(&dealer.user)
            .password(&dealer.password)
            .database(&dealer.database)
            .disable_statement_logging();

        let connection = tokio::time::timeout(self.connect_timeout, options.connect())
            .await
            .map_err(|_| {
                QueryError::Connect(format!(
                    "timed out after {}s connecting to {}",
                    self.connect_timeout.as_secs(),
                    dealer.host
                ))
            })?
            .map_err(|e| QueryError::Connect(e.to_string()))?;

        info!(
            dealer_code = %dealer.internal_code,
            host = %dealer.host,
            database = %dealer.database,
            "ディーラーDBに接続"
        );

        Ok(Arc::new(MySqlQueryRowSource {
            connection: Mutex::new(Some(connection)),
            dealer_code: dealer.internal_code.clone(),
        }))
    }
}

/// 1本のMySQL接続を包むQueryRowSource実装
pub struct MySqlQueryRowSource {
    /// close後はNone
    connection: Mutex<Option<MySqlConnection>>,
    dealer_code: String,
}

impl std::fmt::Debug for MySqlQueryRowSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlQueryRowSource")
            .field("dealer_code", &self.dealer_code)
            .finish_non_exhaustive()
    }
}

impl MySqlQueryRowSource {
    /// パラメータをバインドしたsqlxクエリを組み立てる
    fn build(query: &ReportQuery) -> Query<'_, MySql, MySqlArguments> {
        let mut statement = sqlx::query(query.sql());
        for param in query.params() {
            statement = match param {
                QueryParam::Text(value) => statement.bind(value.as_str()),
                QueryParam::DateTime(value) => statement.bind(*value),
            };
        }
        statement
    }

    async fn fetch_raw(&self, query: &ReportQuery) -> Result<Vec<MySqlRow>, QueryError> {
        let mut guard = self.connection.lock().await;
        let connection = guard.as_mut().ok_or(QueryError::Closed)?;

        let rows = Self::build(query)
            .fetch_all(&mut *connection)
            .await
            .map_err(|e| QueryError::Execute {
                query: query.name().to_string(),
                message: e.to_string(),
            })?;

        debug!(
            dealer_code = %self.dealer_code,
            query = query.name(),
            row_count = rows.len(),
            "クエリ完了"
        );

        Ok(rows)
    }
}

#[async_trait]
impl QueryRowSource for MySqlQueryRowSource {
    async fn fetch_rows(&self, query: &ReportQuery) -> Result<Vec<QueryRow>, QueryError> {
        let rows = self.fetch_raw(query).await?;

        rows.iter()
            .map(|row| {
                decode_row(row).map_err(|e| QueryError::Decode {
                    query: query.name().to_string(),
                    message: e.to_string(),
                })
            })
            .collect()
    }

    async fn fetch_events(&self, query: &ReportQuery) -> Result<Vec<MessageEvent>, QueryError> {
        let rows = self.fetch_raw(query).await?;

        rows.iter()
            .map(|row| {
                decode_event(row).map_err(|e| QueryError::Decode {
                    query: query.name().to_string(),
                    message: e.to_string(),
                })
            })
            .collect()
    }

    async fn close(&self) -> Result<(), QueryError> {
        let connection = self.connection.lock().await.take();

        match connection {
            Some(connection) => {
                connection
                    .close()
                    .await
                    .map_err(|e| QueryError::Connect(e.to_string()))?;
                debug!(dealer_code = %self.dealer_code, "ディーラーDB接続をクローズ");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

/// MySQLの1行を列型に応じて`QueryRow`に変換する
fn decode_row(row: &MySqlRow) -> Result<QueryRow, sqlx::Error> {
    let mut decoded = QueryRow::new();
    for column in row.columns() {
        let value = decode_scalar(row, column.ordinal(), column.type_info().name())?;
        decoded.insert(column.name(), value);
    }
    Ok(decoded)
}

/// 列型ごとの変換規則
///
/// - 整数型 → `Int`（i64に収まらないUNSIGNEDは`Float`）
/// - DECIMAL / FLOAT / DOUBLE → `Float`
/// - 日付・時刻型 → `Text`（`%Y-%m-%d %H:%M:%S`など）
/// - それ以外 → `Text`
/// - NULL → `Null`
fn decode_scalar(row: &MySqlRow, index: usize, type_name: &str) -> Result<Scalar, sqlx::Error> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(Scalar::Null);
    }

    let scalar = match type_name {
        "BOOLEAN" | "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            Scalar::Int(row.try_get_unchecked::<i64, _>(index)?)
        }
        name if name.ends_with("UNSIGNED") => {
            let value = row.try_get_unchecked::<u64, _>(index)?;
            i64::try_from(value)
                .map(Scalar::Int)
                .unwrap_or(Scalar::Float(value as f64))
        }
        // DECIMALは文字列で届くのでf64に解釈する
        "DECIMAL" => {
            let raw = row.try_get_unchecked::<String, _>(index)?;
            match raw.parse::<f64>() {
                Ok(value) => Scalar::Float(value),
                Err(_) => Scalar::Text(raw),
            }
        }
        "FLOAT" => Scalar::Float(f64::from(row.try_get_unchecked::<f32, _>(index)?)),
        "DOUBLE" => Scalar::Float(row.try_get_unchecked::<f64, _>(index)?),
        "DATETIME" | "TIMESTAMP" => Scalar::Text(
            row.try_get_unchecked::<NaiveDateTime, _>(index)?
                .format(SQL_DATETIME_FORMAT)
                .to_string(),
        ),
        "DATE" => Scalar::Text(
            row.try_get_unchecked::<NaiveDate, _>(index)?
                .format("%Y-%m-%d")
                .to_string(),
        ),
        "TIME" => Scalar::Text(
            row.try_get_unchecked::<NaiveTime, _>(index)?
                .format("%H:%M:%S")
                .to_string(),
        ),
        _ => {
            let bytes = row.try_get_unchecked::<Vec<u8>, _>(index)?;
            Scalar::Text(String::from_utf8_lossy(&bytes).into_owned())
        }
    };

    Ok(scalar)
}

/// 列名で1列を`Scalar`として取り出す
fn named_scalar(row: &MySqlRow, name: &str) -> Result<Scalar, sqlx::Error> {
    let column = row.try_column(name)?;
    decode_scalar(row, column.ordinal(), column.type_info().name())
}

/// メッセージイベントクエリの1行を`MessageEvent`に変換する
fn decode_event(row: &MySqlRow) -> Result<MessageEvent, sqlx::Error> {
    let group_key = named_scalar(row, EVENT_GROUP_KEY)?.to_string();
    let sent_date = row.try_get_unchecked::<NaiveDateTime, _>(EVENT_SENT_DATE)?;
    let generated_from = named_scalar(row, EVENT_GENERATED_FROM)?.to_string();
    let event_type = named_scalar(row, EVENT_TYPE)?.to_string();
    let has_attachment = named_scalar(row, EVENT_HAS_ATTACHMENT)?
        .as_f64()
        .is_some_and(|value| value != 0.0);

    Ok(MessageEvent::new(
        group_key,
        sent_date,
        Direction::classify(&generated_from, &event_type),
        has_attachment,
    ))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    /// テスト用のQueryRowSource
    ///
    /// クエリ名ごとに返す行・イベント・エラーを設定できる。
    /// 未設定のクエリは空の結果を返す。
    #[derive(Debug, Clone, Default)]
    pub struct MockQueryRowSource {
        rows: Arc<StdMutex<HashMap<&'static str, Result<Vec<QueryRow>, QueryError>>>>,
        events: Arc<StdMutex<HashMap<&'static str, Vec<MessageEvent>>>>,
        executed: Arc<StdMutex<Vec<ReportQuery>>>,
        close_count: Arc<StdMutex<usize>>,
    }

    impl MockQueryRowSource {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_rows(self, query: &'static str, rows: Vec<QueryRow>) -> Self {
            self.rows.lock().unwrap().insert(query, Ok(rows));
            self
        }

        pub fn with_error(self, query: &'static str, error: QueryError) -> Self {
            self.rows.lock().unwrap().insert(query, Err(error));
            self
        }

        pub fn with_events(self, query: &'static str, events: Vec<MessageEvent>) -> Self {
            self.events.lock().unwrap().insert(query, events);
            self
        }

        /// 実行されたクエリ（実行順）
        pub fn executed(&self) -> Vec<ReportQuery> {
            self.executed.lock().unwrap().clone()
        }

        pub fn executed_names(&self) -> Vec<&'static str> {
            self.executed().iter().map(ReportQuery::name).collect()
        }

        pub fn close_count(&self) -> usize {
            *self.close_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl QueryRowSource for MockQueryRowSource {
        async fn fetch_rows(&self, query: &ReportQuery) -> Result<Vec<QueryRow>, QueryError> {
            self.executed.lock().unwrap().push(query.clone());
            self.rows
                .lock()
                .unwrap()
                .get(query.name())
                .cloned()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn fetch_events(&self, query: &ReportQuery) -> Result<Vec<MessageEvent>, QueryError> {
            self.executed.lock().unwrap().push(query.clone());
            if let Some(Err(error)) = self.rows.lock().unwrap().get(query.name()) {
                return Err(error.clone());
            }
            Ok(self
                .events
                .lock()
                .unwrap()
                .get(query.name())
                .cloned()
                .unwrap_or_default())
        }

        async fn close(&self) -> Result<(), QueryError> {
            *self.close_count.lock().unwrap() += 1;
            Ok(())
        }
    }

    /// テスト用のDealerConnector（internal_codeごとにソースを割り当てる）
    #[derive(Debug, Clone, Default)]
    pub struct MockDealerConnector {
        sources: Arc<StdMutex<HashMap<String, MockQueryRowSource>>>,
        open_errors: Arc<StdMutex<HashMap<String, QueryError>>>,
        opened: Arc<StdMutex<Vec<String>>>,
    }

    impl MockDealerConnector {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_source(self, dealer_code: &str, source: MockQueryRowSource) -> Self {
            self.sources
                .lock()
                .unwrap()
                .insert(dealer_code.to_string(), source);
            self
        }

        pub fn with_open_error(self, dealer_code: &str, error: QueryError) -> Self {
            self.open_errors
                .lock()
                .unwrap()
                .insert(dealer_code.to_string(), error);
            self
        }

        pub fn source(&self, dealer_code: &str) -> Option<MockQueryRowSource> {
            self.sources.lock().unwrap().get(dealer_code).cloned()
        }

        pub fn opened(&self) -> Vec<String> {
            self.opened.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DealerConnector for MockDealerConnector {
        async fn open(
            &self,
            dealer: &DealerConnectionInfo,
        ) -> Result<Arc<dyn QueryRowSource>, QueryError> {
            if let Some(error) = self.open_errors.lock().unwrap().get(&dealer.internal_code) {
                return Err(error.clone());
            }
            self.opened.lock().unwrap().push(dealer.internal_code.clone());

            let source = self
                .sources
                .lock()
                .unwrap()
                .entry(dealer.internal_code.clone())
                .or_default()
                .clone();
            Ok(Arc::new(source))
        }
    }

    fn dealer() -> DealerConnectionInfo {
        crate::domain::dealer::tests::sample_info()
    }

    #[test]
    fn test_report_query_binds_in_order() {
        let start = NaiveDate::from_ymd_opt(2021, 5, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();

        let query = ReportQuery::new("q", "SELECT 1 WHERE a = ? AND b >= ? AND c IN (?, ?)")
            .bind_text("12345")
            .bind_datetime(start)
            .bind_texts(["x", "y"]);

        assert_eq!(query.name(), "q");
        assert_eq!(
            query.params(),
            &[
                QueryParam::Text("12345".to_string()),
                QueryParam::DateTime(start),
                QueryParam::Text("x".to_string()),
                QueryParam::Text("y".to_string()),
            ]
        );
    }

    #[test]
    fn test_in_placeholders() {
        assert_eq!(in_placeholders(1), "?");
        assert_eq!(in_placeholders(3), "?, ?, ?");
        assert_eq!(in_placeholders(0), "");
    }

    #[test]
    fn test_query_error_display() {
        let error = QueryError::Execute {
            query: "bdc_appointments".to_string(),
            message: "Lock wait timeout".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "クエリ実行エラー: query=bdc_appointments, message=Lock wait timeout"
        );
    }

    #[tokio::test]
    async fn test_with_dealer_source_closes_on_success() {
        let source = MockQueryRowSource::new().with_rows("q", vec![QueryRow::from_pairs([("a", 1_i64)])]);
        let connector = MockDealerConnector::new().with_source("12345", source.clone());

        let rows = with_dealer_source(&connector, &dealer(), |source| async move {
            source.fetch_rows(&ReportQuery::new("q", "SELECT 1")).await
        })
        .await
        .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(source.close_count(), 1);
    }

    #[tokio::test]
    async fn test_with_dealer_source_closes_on_error() {
        let source = MockQueryRowSource::new().with_error("q", QueryError::Closed);
        let connector = MockDealerConnector::new().with_source("12345", source.clone());

        let result = with_dealer_source(&connector, &dealer(), |source| async move {
            source.fetch_rows(&ReportQuery::new("q", "SELECT 1")).await
        })
        .await;

        assert_eq!(result, Err(QueryError::Closed));
        assert_eq!(source.close_count(), 1);
    }

    #[tokio::test]
    async fn test_with_dealer_source_open_failure_skips_body() {
        let connector = MockDealerConnector::new()
            .with_open_error("12345", QueryError::Connect("refused".to_string()));

        let result: Result<(), QueryError> =
            with_dealer_source(&connector, &dealer(), |_source| async move {
                panic!("body must not run when open fails")
            })
            .await;

        assert_eq!(result, Err(QueryError::Connect("refused".to_string())));
        assert!(connector.opened().is_empty());
    }
}
