/// レポートLambda設定
///
/// 環境変数を一度に読み込み、欠落している変数をすべて列挙してから失敗する。
/// 各Lambdaは必要な設定グループ（インデックスDB、ディーラーAPI、バケット、メール）だけを要求する。
use std::time::Duration;

use thiserror::Error;

use crate::domain::DealerFailurePolicy;

/// インデックスDBホスト
pub const ENV_INDEX_DB_HOST: &str = "UNOTIFI_COM_INDEX_DB_HOST";
/// インデックスDBユーザー
pub const ENV_INDEX_DB_USER: &str = "UNOTIFI_COM_INDEX_DB_USER";
/// インデックスDBパスワード
pub const ENV_INDEX_DB_PASS: &str = "UNOTIFI_COM_INDEX_DB_PASS";
/// インデックスDB名（任意）
pub const ENV_INDEX_DB_NAME: &str = "UNOTIFI_COM_INDEX_DB_NAME";
/// ディーラーAPIのベースURL
pub const ENV_API_BASE_URL: &str = "UNOTIFI_API_CLIENT_BASE_URL";
/// ディーラーAPIのトークン
pub const ENV_API_TOKEN: &str = "UNOTIFI_API_TOKEN";
/// レポート保存先バケット
pub const ENV_REPORTS_BUCKET: &str = "UNOTIFI_REPORTS_BUCKET";
/// SendGrid APIキー
pub const ENV_SENDGRID_API_KEY: &str = "SENDGRID_API_KEY";
/// メール送信元アドレス（任意）
pub const ENV_EMAIL_FROM: &str = "REPORTS_EMAIL_FROM";
/// ディーラー失敗時のポリシー（任意）
pub const ENV_FAILURE_POLICY: &str = "REPORT_DEALER_FAILURE_POLICY";
/// ディーラーDB接続タイムアウト秒（任意）
pub const ENV_CONNECT_TIMEOUT_SECS: &str = "DEALER_DB_CONNECT_TIMEOUT_SECS";
/// ダウンロードリンクの有効期限秒（任意）
pub const ENV_LINK_EXPIRY_SECS: &str = "REPORT_LINK_EXPIRY_SECS";

/// インデックスDB名のデフォルト値
pub const DEFAULT_INDEX_DB_NAME: &str = "unotifi_com_index";
/// メール送信元のデフォルト値
pub const DEFAULT_EMAIL_FROM: &str = "reports@unotifi.com";
/// ディーラーDB接続タイムアウトのデフォルト値（60秒）
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 60;
/// ダウンロードリンク有効期限のデフォルト値（7日）
pub const DEFAULT_LINK_EXPIRY_SECS: u64 = 604_800;

/// 設定のエラー型
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// 必須の環境変数が欠落（要求順にすべて列挙）
    #[error("Missing environment variables: {}", .0.join(", "))]
    MissingEnvVars(Vec<String>),

    /// 値の形式が不正
    #[error("Invalid value for {name}: {message}")]
    InvalidValue { name: &'static str, message: String },

    /// 要求されていない設定グループへのアクセス
    #[error("{0} is not configured for this report")]
    NotConfigured(&'static str),
}

/// Lambdaごとに必要な設定グループ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigRequirements {
    pub index_db: bool,
    pub directory_api: bool,
    pub bucket: bool,
    pub email: bool,
}

impl ConfigRequirements {
    /// インデックスDBで資格情報を引き、結果をメールで送るレポート
    pub const INDEX_DB_WITH_EMAIL: Self = Self {
        index_db: true,
        directory_api: false,
        bucket: true,
        email: true,
    };

    /// ディーラーAPIで資格情報を引き、結果をWebhookで通知するレポート
    pub const DIRECTORY_API_WITH_CALLBACK: Self = Self {
        index_db: false,
        directory_api: true,
        bucket: true,
        email: false,
    };
}

/// インデックスDBの接続情報
#[derive(Clone, PartialEq)]
pub struct IndexDbSettings {
    pub host: String,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl std::fmt::Debug for IndexDbSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexDbSettings")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

/// ディーラーAPIの接続情報
#[derive(Clone, PartialEq)]
pub struct DirectoryApiSettings {
    pub base_url: String,
    pub token: String,
}

impl std::fmt::Debug for DirectoryApiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryApiSettings")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// メール送信設定
#[derive(Clone, PartialEq)]
pub struct EmailSettings {
    pub api_key: String,
    pub from: String,
}

impl std::fmt::Debug for EmailSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailSettings")
            .field("from", &self.from)
            .finish_non_exhaustive()
    }
}

/// レポートLambdaの設定
#[derive(Debug, Clone, PartialEq)]
pub struct ReportConfig {
    index_db: Option<IndexDbSettings>,
    directory_api: Option<DirectoryApiSettings>,
    bucket: Option<String>,
    email: Option<EmailSettings>,
    failure_policy: DealerFailurePolicy,
    dealer_connect_timeout: Duration,
    link_expiry: Duration,
}

impl ReportConfig {
    /// 環境変数から設定を読み込む
    ///
    /// I/Oの前に呼び出し、欠落している変数をまとめて報告する。
    pub fn from_env(requirements: ConfigRequirements) -> Result<Self, ConfigError> {
        Self::from_source(requirements, |name| std::env::var(name).ok())
    }

    /// 任意の取得関数から設定を読み込む（空文字列は未設定として扱う）
    pub fn from_source<F>(requirements: ConfigRequirements, source: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| {
            source(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut missing: Vec<String> = Vec::new();
        let mut require = |name: &'static str| -> String {
            match lookup(name) {
                Some(value) => value,
                None => {
                    missing.push(name.to_string());
                    String::new()
                }
            }
        };

        let index_db = requirements.index_db.then(|| IndexDbSettings {
            host: require(ENV_INDEX_DB_HOST),
            user: require(ENV_INDEX_DB_USER),
            password: require(ENV_INDEX_DB_PASS),
            database: String::new(),
        });

        let directory_api = requirements.directory_api.then(|| DirectoryApiSettings {
            base_url: require(ENV_API_BASE_URL),
            token: require(ENV_API_TOKEN),
        });

        let bucket = requirements.bucket.then(|| require(ENV_REPORTS_BUCKET));

        let email = requirements.email.then(|| EmailSettings {
            api_key: require(ENV_SENDGRID_API_KEY),
            from: String::new(),
        });

        if !missing.is_empty() {
            return Err(ConfigError::MissingEnvVars(missing));
        }

        let index_db = index_db.map(|settings| IndexDbSettings {
            database: lookup(ENV_INDEX_DB_NAME).unwrap_or_else(|| DEFAULT_INDEX_DB_NAME.to_string()),
            ..settings
        });

        let email = email.map(|settings| EmailSettings {
            from: lookup(ENV_EMAIL_FROM).unwrap_or_else(|| DEFAULT_EMAIL_FROM.to_string()),
            ..settings
        });

        let failure_policy = match lookup(ENV_FAILURE_POLICY) {
            Some(value) => value
                .parse::<DealerFailurePolicy>()
                .map_err(|e| ConfigError::InvalidValue {
                    name: ENV_FAILURE_POLICY,
                    message: e.to_string(),
                })?,
            None => DealerFailurePolicy::default(),
        };

        let dealer_connect_timeout = Duration::from_secs(parse_seconds(
            ENV_CONNECT_TIMEOUT_SECS,
            lookup(ENV_CONNECT_TIMEOUT_SECS),
            DEFAULT_CONNECT_TIMEOUT_SECS,
        )?);

        let link_expiry = Duration::from_secs(parse_seconds(
            ENV_LINK_EXPIRY_SECS,
            lookup(ENV_LINK_EXPIRY_SECS),
            DEFAULT_LINK_EXPIRY_SECS,
        )?);

        Ok(Self {
            index_db,
            directory_api,
            bucket,
            email,
            failure_policy,
            dealer_connect_timeout,
            link_expiry,
        })
    }

    /// 明示的な値で設定を作成（テスト用）
    pub fn new(
        index_db: Option<IndexDbSettings>,
        directory_api: Option<DirectoryApiSettings>,
        bucket: Option<String>,
        email: Option<EmailSettings>,
        failure_policy: DealerFailurePolicy,
    ) -> Self {
        Self {
            index_db,
            directory_api,
            bucket,
            email,
            failure_policy,
            dealer_connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            link_expiry: Duration::from_secs(DEFAULT_LINK_EXPIRY_SECS),
        }
    }

    /// インデックスDB設定を取得
    pub fn index_db(&self) -> Result<&IndexDbSettings, ConfigError> {
        self.index_db
            .as_ref()
            .ok_or(ConfigError::NotConfigured("index database"))
    }

    /// ディーラーAPI設定を取得
    pub fn directory_api(&self) -> Result<&DirectoryApiSettings, ConfigError> {
        self.directory_api
            .as_ref()
            .ok_or(ConfigError::NotConfigured("dealer directory API"))
    }

    /// レポート保存先バケット名を取得
    pub fn bucket(&self) -> Result<&str, ConfigError> {
        self.bucket
            .as_deref()
            .ok_or(ConfigError::NotConfigured("reports bucket"))
    }

    /// メール設定を取得（要求されていなければNone）
    pub fn email(&self) -> Option<&EmailSettings> {
        self.email.as_ref()
    }

    /// ディーラー失敗時のポリシーを取得
    pub fn failure_policy(&self) -> DealerFailurePolicy {
        self.failure_policy
    }

    /// ディーラーDB接続タイムアウトを取得
    pub fn dealer_connect_timeout(&self) -> Duration {
        self.dealer_connect_timeout
    }

    /// ダウンロードリンクの有効期限を取得
    pub fn link_expiry(&self) -> Duration {
        self.link_expiry
    }
}

fn parse_seconds(name: &'static str, value: Option<String>, default: u64) -> Result<u64, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => match raw.parse::<u64>() {
            Ok(seconds) if seconds > 0 => Ok(seconds),
            _ => Err(ConfigError::InvalidValue {
                name,
                message: format!("expected a positive number of seconds, got {}", raw),
            }),
        },
    }
}
